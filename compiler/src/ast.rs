// AST node types for tally source units.
//
// Every expression, statement, block, parameter, and match case carries a
// `NodeId` allocated at parse time; later phases attach their results in
// side tables keyed by that ID instead of mutating the tree. Every node also
// carries a `SimpleSpan` for error reporting.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use std::rc::Rc;

use chumsky::span::SimpleSpan;
use rust_decimal::Decimal;

use crate::id::NodeId;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

/// Span covering `a` through `b`.
pub fn join(a: Span, b: Span) -> Span {
    (a.start..b.end).into()
}

// ── Root ──

/// A complete unit: a sequence of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

// ── Statements ──

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Import(Ident),
    Def(Rc<FunctionDecl>),
    Record(Rc<RecordDecl>),
    Object(ObjectDecl),
    Sum(Rc<SumDecl>),
    Val(ValStmt),
    Assign(AssignStmt),
    Expr(Expr),
}

impl StmtKind {
    /// True for the definition forms that may only appear at top level.
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            StmtKind::Def(_) | StmtKind::Record(_) | StmtKind::Object(_) | StmtKind::Sum(_)
        )
    }
}

/// `val x: T = e` or `mutable x: T = e`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValStmt {
    pub name: Ident,
    pub mutable: bool,
    pub ty: Option<TypeExpr>,
    pub value: Expr,
}

/// `target = value` where target is a reference or a field access.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignStmt {
    pub target: Expr,
    pub value: Expr,
}

// ── Definitions ──

/// `T` or `#N` in a definition's type parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeParamDecl {
    pub name: Ident,
    pub fin: bool,
}

/// A formal parameter of a function, lambda, or plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub id: NodeId,
    pub name: Ident,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParamDecl>,
    pub params: Vec<ParamDecl>,
    pub ret: Option<TypeExpr>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: Ident,
    pub mutable: bool,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParamDecl>,
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDecl {
    pub name: Ident,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SumMember {
    Record(RecordDecl),
    Object(ObjectDecl),
}

impl SumMember {
    pub fn name(&self) -> &Ident {
        match self {
            SumMember::Record(r) => &r.name,
            SumMember::Object(o) => &o.name,
        }
    }
}

/// `sum Name<T> { record A(x: T) object B }`. Members share the sum's type
/// parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SumDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParamDecl>,
    pub members: Vec<SumMember>,
    pub span: Span,
}

/// `plugin name<#N>(x: T): R cost C`: a host-bodied function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParamDecl>,
    pub params: Vec<ParamDecl>,
    pub ret: TypeExpr,
    pub cost: TypeExpr,
    pub span: Span,
}

// ── Type expressions ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinOp {
    Sum,
    Mul,
    Max,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// `Int`, `T`, `List<Int, 3>`, or a Fin parameter name in argument position.
    Named {
        name: Ident,
        args: Vec<TypeExpr>,
        span: Span,
    },
    /// `(A, B) -> R`
    Function {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
        span: Span,
    },
    /// Literal Fin bound in argument position.
    FinLit(u64, Span),
    /// `Sum(..)`, `Mul(..)`, `Max(..)` in argument position.
    FinOp {
        op: FinOp,
        args: Vec<TypeExpr>,
        span: Span,
    },
}

impl TypeExpr {
    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Named { span, .. }
            | TypeExpr::Function { span, .. }
            | TypeExpr::FinOp { span, .. } => *span,
            TypeExpr::FinLit(_, span) => *span,
        }
    }
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: NodeId,
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    /// Value plus printed digit count.
    Decimal(Decimal, u32),
    Char(char),
    String(String),
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    pub id: NodeId,
    pub member: Ident,
    /// `case Some(v) { .. }` binds the narrowed scrutinee to `v`.
    pub binder: Option<Ident>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Ref(Ident),
    Block(Block),
    /// `f(args)` or `f<T, 3>(args)`.
    Call {
        callee: Ident,
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    /// `x.field` (no parentheses).
    DotAccess {
        receiver: Box<Expr>,
        member: Ident,
    },
    /// `x.member(args)`.
    DotCall {
        receiver: Box<Expr>,
        member: Ident,
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then: Block,
        otherwise: Option<Box<Expr>>,
    },
    For {
        binder: Ident,
        source: Box<Expr>,
        body: Block,
    },
    Match {
        scrutinee: Box<Expr>,
        cases: Vec<MatchCase>,
    },
    Lambda {
        params: Vec<ParamDecl>,
        body: Box<Expr>,
    },
}

// ── Identifier ──

/// An identifier with its source text and span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

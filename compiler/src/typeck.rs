// typeck.rs — Type propagation (the Propagate phase)
//
// Computes a type for every expression and local declaration, resolves
// every call to a `CallTarget` carrying its instantiation, and every dot
// expression to a field index or built-in member. Generic call sites are
// instantiated through `constraint`.
//
// Functions are typed first, in source order; a function without a declared
// return type is typed on demand when a caller needs its return type. Then
// the unit's top-level statements are typed.
//
// Preconditions: SymbolScan filled the unit's table; `ann.bindings` holds
//   the Bind results.
// Postconditions: `ann.types` has an entry for every expression typed;
//   every `FunctionInfo::ret` is `Some`.
// Failure modes: the E02xx family, plus E0301 when a function without a
//   declared return type is reached recursively.
// Side effects: fills in inferred return types in the unit's table.

use std::collections::BTreeSet;
use std::rc::Rc;

use crate::annot::{Annotations, Binding, CallTarget, DotTarget};
use crate::ast::*;
use crate::builtins::{BuiltinKind, Platform};
use crate::constraint::{self, ConstraintError};
use crate::cost::CostExpr;
use crate::diag::{codes, DiagCode, Diagnostic};
use crate::id::DefId;
use crate::subst::Instantiation;
use crate::symbols::{DefKind, Definition, SymbolTable, SymbolView};
use crate::typexpr::{resolve_arg, resolve_type};
use crate::types::{BasicType, FunctionType, TerminusKind, Type, TypeArg, TypeParam};

pub struct PropagateContext<'a> {
    pub platform: &'a Platform,
    pub imports: &'a [Rc<SymbolTable>],
}

pub fn propagate(
    program: &Program,
    table: &mut SymbolTable,
    ann: &mut Annotations,
    ctx: &PropagateContext<'_>,
) -> Vec<Diagnostic> {
    let functions: Vec<DefId> = table
        .iter()
        .filter(|d| matches!(d.kind, DefKind::Function(_)))
        .map(|d| d.id)
        .collect();
    let mut typer = Typer {
        platform: ctx.platform,
        imports: ctx.imports,
        table,
        ann,
        params: Vec::new(),
        in_progress: BTreeSet::new(),
        typed: BTreeSet::new(),
        diagnostics: Vec::new(),
    };
    for def in functions {
        typer.function(def);
    }
    for stmt in &program.statements {
        typer.stmt(stmt);
    }
    typer.diagnostics
}

// ── Typer ───────────────────────────────────────────────────────────────────

struct Typer<'a> {
    platform: &'a Platform,
    imports: &'a [Rc<SymbolTable>],
    table: &'a mut SymbolTable,
    ann: &'a mut Annotations,
    /// Type parameters of the function being typed.
    params: Vec<TypeParam>,
    in_progress: BTreeSet<DefId>,
    typed: BTreeSet<DefId>,
    diagnostics: Vec<Diagnostic>,
}

/// How a generic definition is being instantiated at one call site.
struct CallSite<'e> {
    name: &'e str,
    type_args: &'e [TypeExpr],
    args: &'e [Expr],
    arg_types: &'e [Type],
    span: Span,
}

impl<'a> Typer<'a> {
    fn view(&self) -> SymbolView<'_> {
        SymbolView {
            local: &*self.table,
            imports: self.imports,
            platform: &self.platform.table,
        }
    }

    fn def(&self, id: DefId) -> Option<Definition> {
        self.view().def(id).cloned()
    }

    fn error(&mut self, code: DiagCode, span: Span, message: String) -> Type {
        self.diagnostics.push(Diagnostic::error(code, span, message));
        Type::Error
    }

    fn record(&mut self, node: crate::id::NodeId, ty: Type) -> Type {
        self.ann.types.insert(node, ty.clone());
        ty
    }

    // ── Functions ───────────────────────────────────────────────────────

    fn function(&mut self, def: DefId) {
        if self.typed.contains(&def) || self.in_progress.contains(&def) {
            return;
        }
        let Some(d) = self.table.def(def).cloned() else {
            return;
        };
        let Some(info) = d.as_function() else {
            return;
        };
        self.in_progress.insert(def);
        let saved = std::mem::replace(&mut self.params, d.params.clone());
        for (p, ty) in info.decl.params.iter().zip(&info.params) {
            self.ann.local_types.insert(p.id, ty.clone());
        }
        let body = self.block(&info.decl.body);
        if info.ret.is_none() {
            if let Some(DefKind::Function(f)) = self.table.def_mut(def).map(|d| &mut d.kind) {
                f.ret = Some(body);
            }
        }
        self.params = saved;
        self.in_progress.remove(&def);
        self.typed.insert(def);
    }

    /// The return type of `def`, typing its body first when none was declared.
    fn return_type(&mut self, def: &Definition, span: Span) -> Option<Type> {
        let info = def.as_function()?;
        if let Some(ret) = &info.ret {
            return Some(ret.clone());
        }
        if def.id.unit != self.table.unit {
            return Some(Type::Error);
        }
        if self.in_progress.contains(&def.id) {
            self.diagnostics.push(
                Diagnostic::error(
                    codes::E0301,
                    span,
                    format!("recursive function detected: {}", def.name),
                )
                .with_hint("declare a return type to see the full recursion report"),
            );
            return None;
        }
        self.function(def.id);
        self.table
            .def(def.id)
            .and_then(|d| d.as_function())
            .and_then(|f| f.ret.clone())
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Import(_)
            | StmtKind::Def(_)
            | StmtKind::Record(_)
            | StmtKind::Object(_)
            | StmtKind::Sum(_) => {}
            StmtKind::Val(v) => {
                let value = self.expr(&v.value);
                let ty = match &v.ty {
                    Some(written) => match resolve_type(written, &self.params, self.view()) {
                        Ok(t) => t,
                        Err(d) => {
                            self.diagnostics.push(d);
                            Type::Error
                        }
                    },
                    None => value,
                };
                self.ann.local_types.insert(stmt.id, ty);
            }
            StmtKind::Assign(a) => {
                self.expr(&a.target);
                self.expr(&a.value);
            }
            StmtKind::Expr(e) => {
                self.expr(e);
            }
        }
    }

    fn block(&mut self, block: &Block) -> Type {
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        let ty = match block.stmts.last().map(|s| &s.kind) {
            Some(StmtKind::Expr(e)) => self.ann.type_of(e.id).clone(),
            _ => Type::UNIT,
        };
        self.record(block.id, ty)
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn expr(&mut self, expr: &Expr) -> Type {
        let ty = match &expr.kind {
            ExprKind::Literal(lit) => self.literal(lit),
            ExprKind::Ref(name) => self.reference(expr, name),
            ExprKind::Block(b) => self.block(b),
            ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.call(expr, callee, type_args, args),
            ExprKind::DotAccess { receiver, member } => self.dot_access(expr, receiver, member),
            ExprKind::DotCall {
                receiver,
                member,
                type_args,
                args,
            } => self.dot_call(expr, receiver, member, type_args, args),
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.expr(lhs);
                let r = self.expr(rhs);
                self.binary(*op, l, r, expr.span)
            }
            ExprKind::Unary { op, operand } => {
                let t = self.expr(operand);
                self.unary(*op, t, expr.span)
            }
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond);
                let t = self.block(then);
                match otherwise {
                    Some(e) => {
                        let o = self.expr(e);
                        self.join(t, o, expr.span, "if branches")
                    }
                    None => Type::UNIT,
                }
            }
            ExprKind::For { source, body, .. } => {
                let source_ty = self.expr(source);
                let binder = self.element_type(&source_ty, source.span);
                self.ann.local_types.insert(expr.id, binder);
                self.block(body);
                Type::UNIT
            }
            ExprKind::Match { scrutinee, cases } => self.matching(scrutinee, cases),
            ExprKind::Lambda { params, body } => {
                let mut param_types = Vec::with_capacity(params.len());
                for p in params {
                    let t = match resolve_type(&p.ty, &self.params, self.view()) {
                        Ok(t) => t,
                        Err(d) => {
                            self.diagnostics.push(d);
                            Type::Error
                        }
                    };
                    self.ann.local_types.insert(p.id, t.clone());
                    param_types.push(t);
                }
                let ret = self.expr(body);
                Type::function(param_types, ret)
            }
        };
        self.record(expr.id, ty)
    }

    fn literal(&self, lit: &Literal) -> Type {
        match lit {
            Literal::Int(_) => Type::INT,
            Literal::Boolean(_) => Type::BOOLEAN,
            Literal::Char(_) => Type::CHAR,
            Literal::String(s) => self.platform.string(CostExpr::Fin(s.chars().count() as u64)),
            Literal::Decimal(_, digits) => self.platform.decimal(CostExpr::Fin(u64::from(*digits))),
        }
    }

    fn reference(&mut self, expr: &Expr, name: &Ident) -> Type {
        match self.ann.bindings.get(&expr.id).copied() {
            None => Type::Error,
            Some(Binding::Local { decl, .. }) => self.ann.local_type(decl).clone(),
            Some(Binding::Global(id)) => {
                let Some(def) = self.def(id) else {
                    return Type::Error;
                };
                match &def.kind {
                    DefKind::Object { .. } => def.object_type().unwrap_or(Type::Error),
                    DefKind::Function(info) => {
                        let params = info.params.clone();
                        match self.return_type(&def, name.span) {
                            Some(ret) => Type::function(params, ret),
                            None => Type::Error,
                        }
                    }
                    DefKind::Plugin(info) => Type::Function(Rc::new(info.signature.clone())),
                    DefKind::Record(_) | DefKind::Sum(_) | DefKind::Builtin(_) => self.error(
                        codes::E0200,
                        name.span,
                        format!("'{}' is a {} and not a value", def.name, def.kind_name()),
                    ),
                }
            }
        }
    }

    // ── Calls ───────────────────────────────────────────────────────────

    fn call(&mut self, expr: &Expr, callee: &Ident, type_args: &[TypeExpr], args: &[Expr]) -> Type {
        let arg_types: Vec<Type> = args.iter().map(|a| self.expr(a)).collect();
        let site = CallSite {
            name: &callee.name,
            type_args,
            args,
            arg_types: &arg_types,
            span: expr.span,
        };
        match self.ann.bindings.get(&expr.id).copied() {
            None => Type::Error,
            Some(Binding::Local { decl, .. }) => match self.ann.local_type(decl).clone() {
                Type::Function(f) => {
                    if !self.check_arity(&site, f.params.len()) {
                        return Type::Error;
                    }
                    self.ann.calls.insert(expr.id, CallTarget::FormalParam { decl });
                    self.ann.signatures.insert(expr.id, (*f).clone());
                    f.ret.clone()
                }
                Type::Error => Type::Error,
                other => self.error(
                    codes::E0211,
                    callee.span,
                    format!("'{}' of type {} is not callable", callee.name, other),
                ),
            },
            Some(Binding::Global(id)) => {
                let Some(def) = self.def(id) else {
                    return Type::Error;
                };
                self.global_call(expr, &def, &site)
            }
        }
    }

    fn global_call(&mut self, expr: &Expr, def: &Definition, site: &CallSite<'_>) -> Type {
        let Some(terminus) = def.terminus() else {
            return self.error(
                codes::E0211,
                site.span,
                format!("'{}' is an object and cannot be called", def.name),
            );
        };
        let (declared, ret) = match &def.kind {
            DefKind::Function(info) => {
                let Some(ret) = self.return_type(def, site.span) else {
                    return Type::Error;
                };
                (info.params.clone(), ret)
            }
            DefKind::Plugin(info) => (info.signature.params.clone(), info.signature.ret.clone()),
            DefKind::Record(r) => (r.fields.iter().map(|f| f.ty.clone()).collect(), Type::Error),
            DefKind::Builtin(kind) => return self.builtin_call(expr, *kind, site),
            DefKind::Sum(_) | DefKind::Object { .. } => {
                return self.error(
                    codes::E0211,
                    site.span,
                    format!("'{}' is a {} and cannot be called", def.name, def.kind_name()),
                )
            }
        };
        if !self.check_arity(site, declared.len()) {
            return Type::Error;
        }
        let Some(inst) = self.instantiate(terminus, &declared, site) else {
            return Type::Error;
        };
        let (ret, target) = match def.kind {
            DefKind::Function(_) => (
                inst.replay_type(&ret),
                CallTarget::Function {
                    def: def.id,
                    inst: inst.clone(),
                },
            ),
            DefKind::Plugin(_) => (
                inst.replay_type(&ret),
                CallTarget::Plugin {
                    def: def.id,
                    inst: inst.clone(),
                },
            ),
            _ => (Type::Instance(inst.clone()), CallTarget::Record { inst: inst.clone() }),
        };
        let signature = FunctionType {
            params: declared.iter().map(|t| inst.replay_type(t)).collect(),
            ret: ret.clone(),
        };
        tracing::trace!(callee = site.name, instance = %inst, "instantiated call");
        self.ann.signatures.insert(expr.id, signature);
        self.ann.calls.insert(expr.id, target);
        ret
    }

    fn check_arity(&mut self, site: &CallSite<'_>, expected: usize) -> bool {
        if site.args.len() == expected {
            return true;
        }
        self.error(
            codes::E0201,
            site.span,
            format!(
                "'{}' expects {} argument(s), got {}",
                site.name,
                expected,
                site.args.len()
            ),
        );
        false
    }

    fn explicit_args(&mut self, terminus: &crate::types::Terminus, site: &CallSite<'_>) -> Option<Vec<TypeArg>> {
        if site.type_args.len() != terminus.params.len() {
            self.error(
                codes::E0202,
                site.span,
                format!(
                    "'{}' expects {} type argument(s), got {}",
                    site.name,
                    terminus.params.len(),
                    site.type_args.len()
                ),
            );
            return None;
        }
        let mut out = Vec::with_capacity(site.type_args.len());
        for (expr, p) in site.type_args.iter().zip(&terminus.params) {
            match resolve_arg(expr, p.kind, &self.params, self.view()) {
                Ok(a) => out.push(a),
                Err(d) => {
                    self.diagnostics.push(d);
                    return None;
                }
            }
        }
        Some(out)
    }

    /// Explicit type arguments, or constraint resolution over the arguments.
    fn instantiate(
        &mut self,
        terminus: Rc<crate::types::Terminus>,
        declared: &[Type],
        site: &CallSite<'_>,
    ) -> Option<Instantiation> {
        if !site.type_args.is_empty() {
            let args = self.explicit_args(&terminus, site)?;
            return self.settle(Instantiation::apply(terminus, args).map_err(Into::into), site.span);
        }
        if terminus.params.is_empty() {
            return self.settle(Instantiation::apply(terminus, Vec::new()).map_err(Into::into), site.span);
        }
        if site.arg_types.iter().any(Type::is_error) {
            return None;
        }
        let mut constraints = Vec::new();
        for ((d, a), arg) in declared.iter().zip(site.arg_types).zip(site.args) {
            if let Err(e) = constraint::collect(d, a, &terminus.params, &mut constraints) {
                self.diagnostics.push(e.at(arg.span));
                return None;
            }
        }
        let resolved = constraint::resolve(self.view(), site.name, &terminus.params, constraints)
            .and_then(|subst| {
                Instantiation::from_substitution(terminus, &subst).map_err(ConstraintError::from)
            });
        self.settle(resolved, site.span)
    }

    fn settle<T>(&mut self, result: Result<T, ConstraintError>, span: Span) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.diagnostics.push(e.at(span));
                None
            }
        }
    }

    fn builtin_call(&mut self, expr: &Expr, kind: BuiltinKind, site: &CallSite<'_>) -> Type {
        if !kind.is_collection() {
            return self.error(
                codes::E0211,
                site.span,
                format!("'{}' values come from literals, not calls", kind.name()),
            );
        }
        let terminus = self.platform.builtin_terminus(kind);
        let explicit = if site.type_args.is_empty() {
            None
        } else {
            match self.explicit_args(&terminus, site) {
                Some(a) => Some(a),
                None => return Type::Error,
            }
        };
        let result = constraint::builtin_instance(
            self.platform,
            self.view(),
            kind,
            explicit,
            site.arg_types,
        );
        let Some(inst) = self.settle(result, site.span) else {
            return Type::Error;
        };
        let element = if kind.is_dictionary() {
            self.pair_of(inst.arg(0), inst.arg(1))
        } else {
            inst.arg(0).and_then(|a| a.as_type().cloned()).unwrap_or(Type::Error)
        };
        let ret = Type::Instance(inst.clone());
        self.ann.signatures.insert(
            expr.id,
            FunctionType {
                params: vec![element; site.args.len()],
                ret: ret.clone(),
            },
        );
        self.ann.calls.insert(expr.id, CallTarget::Builtin { kind, inst });
        ret
    }

    fn pair_of(&self, first: Option<TypeArg>, second: Option<TypeArg>) -> Type {
        let pair = self
            .platform
            .table
            .def(self.platform.pair)
            .and_then(Definition::terminus);
        match (pair, first, second) {
            (Some(t), Some(a), Some(b)) => Instantiation::apply(t, vec![a, b])
                .map(Type::Instance)
                .unwrap_or(Type::Error),
            _ => Type::Error,
        }
    }

    // ── Dot expressions ─────────────────────────────────────────────────

    fn dot_access(&mut self, expr: &Expr, receiver: &Expr, member: &Ident) -> Type {
        let rt = self.expr(receiver);
        if rt.is_error() {
            return Type::Error;
        }
        let field = rt.as_instance().and_then(|inst| {
            let def = self.view().def(inst.def())?;
            let (index, field) = def.as_record()?.field(&member.name)?;
            Some((index, inst.replay_type(&field.ty)))
        });
        match field {
            Some((index, ty)) => {
                self.ann.dots.insert(expr.id, DotTarget::Field { index });
                ty
            }
            None => self.error(
                codes::E0207,
                member.span,
                format!("{} has no field '{}'", rt, member.name),
            ),
        }
    }

    fn dot_call(
        &mut self,
        expr: &Expr,
        receiver: &Expr,
        member: &Ident,
        type_args: &[TypeExpr],
        args: &[Expr],
    ) -> Type {
        let rt = self.expr(receiver);
        for a in args {
            self.expr(a);
        }
        if rt.is_error() {
            return Type::Error;
        }
        let Some(sig) = self.platform.member(&rt, &member.name) else {
            return self.error(
                codes::E0207,
                member.span,
                format!("{} has no member '{}'", rt, member.name),
            );
        };
        if !type_args.is_empty() {
            return self.error(
                codes::E0202,
                member.span,
                format!("member '{}' takes no type arguments", member.name),
            );
        }
        if sig.signature.params.len() != args.len() {
            return self.error(
                codes::E0201,
                expr.span,
                format!(
                    "'{}' expects {} argument(s), got {}",
                    member.name,
                    sig.signature.params.len(),
                    args.len()
                ),
            );
        }
        let ret = sig.signature.ret.clone();
        self.ann.signatures.insert(expr.id, sig.signature.clone());
        self.ann.dots.insert(expr.id, DotTarget::Member(sig));
        ret
    }

    // ── Operators ───────────────────────────────────────────────────────

    fn binary(&mut self, op: BinaryOp, l: Type, r: Type, span: Span) -> Type {
        if l.is_error() || r.is_error() {
            return Type::Error;
        }
        let lk = l.builtin();
        let rk = r.builtin();
        let bounds = || {
            Platform::fin_bound(&l)
                .zip(Platform::fin_bound(&r))
                .unwrap_or((CostExpr::ZERO, CostExpr::ZERO))
        };
        let int = |t: &Type| matches!(t, Type::Basic(BasicType::Int));
        let decimals = lk == Some(BuiltinKind::Decimal) && rk == Some(BuiltinKind::Decimal);
        let result = match op {
            BinaryOp::And | BinaryOp::Or => {
                (l == Type::BOOLEAN && r == Type::BOOLEAN).then_some(Type::BOOLEAN)
            }
            BinaryOp::Add if lk == Some(BuiltinKind::String) && rk == Some(BuiltinKind::String) => {
                let (a, b) = bounds();
                Some(self.platform.string(CostExpr::sum([a, b])))
            }
            BinaryOp::Add | BinaryOp::Sub if decimals => {
                let (a, b) = bounds();
                Some(self.platform.decimal(CostExpr::max([a, b])))
            }
            BinaryOp::Mul | BinaryOp::Div if decimals => {
                let (a, b) = bounds();
                Some(self.platform.decimal(CostExpr::sum([a, b])))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                (int(&l) && int(&r)).then_some(Type::INT)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordered = (int(&l) && int(&r))
                    || (l == Type::CHAR && r == Type::CHAR)
                    || decimals;
                ordered.then_some(Type::BOOLEAN)
            }
            BinaryOp::Eq | BinaryOp::NotEq => {
                let comparable = !l.is_function()
                    && !r.is_function()
                    && constraint::join_types(self.view(), &l, &r).is_some();
                comparable.then_some(Type::BOOLEAN)
            }
        };
        match result {
            Some(t) => t,
            None => self.error(
                codes::E0210,
                span,
                format!("operator '{}' is not defined for {} and {}", op.symbol(), l, r),
            ),
        }
    }

    fn unary(&mut self, op: UnaryOp, t: Type, span: Span) -> Type {
        if t.is_error() {
            return Type::Error;
        }
        let ok = match op {
            UnaryOp::Not => t == Type::BOOLEAN,
            UnaryOp::Neg => t == Type::INT || t.builtin() == Some(BuiltinKind::Decimal),
        };
        if ok {
            return t;
        }
        let symbol = match op {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
        };
        self.error(
            codes::E0210,
            span,
            format!("operator '{}' is not defined for {}", symbol, t),
        )
    }

    fn join(&mut self, a: Type, b: Type, span: Span, what: &str) -> Type {
        if a.is_error() || b.is_error() {
            return Type::Error;
        }
        match constraint::join_types(self.view(), &a, &b) {
            Some(t) => t,
            None => self.error(
                codes::E0200,
                span,
                format!("{} have incompatible types {} and {}", what, a, b),
            ),
        }
    }

    // ── Loops and matches ───────────────────────────────────────────────

    fn element_type(&mut self, source: &Type, span: Span) -> Type {
        if source.is_error() {
            return Type::Error;
        }
        match (source.builtin(), source.as_instance()) {
            (Some(kind), Some(inst)) if kind.is_collection() => {
                if kind.is_dictionary() {
                    self.pair_of(inst.arg(0), inst.arg(1))
                } else {
                    inst.arg(0).and_then(|a| a.as_type().cloned()).unwrap_or(Type::Error)
                }
            }
            _ => self.error(
                codes::E0211,
                span,
                format!("{} is not iterable", source),
            ),
        }
    }

    /// The scrutinee viewed as an instance of its sum.
    fn sum_instance(&self, ty: &Type) -> Option<Instantiation> {
        let inst = ty.as_instance()?;
        match inst.terminus().kind {
            TerminusKind::Sum => Some(inst.clone()),
            TerminusKind::Record { sum: Some(sum) } => {
                let terminus = self.view().def(sum)?.terminus()?;
                Instantiation::apply(terminus, inst.args()).ok()
            }
            _ => None,
        }
    }

    fn matching(&mut self, scrutinee: &Expr, cases: &[MatchCase]) -> Type {
        let st = self.expr(scrutinee);
        let sum = self.sum_instance(&st);
        if sum.is_none() && !st.is_error() {
            self.error(
                codes::E0209,
                scrutinee.span,
                format!("match requires a sum value, found {}", st),
            );
        }

        let mut result: Option<Type> = None;
        for case in cases {
            let binder = match &sum {
                Some(inst) => self.case_binder(inst, case),
                None => Type::Error,
            };
            if case.binder.is_some() {
                self.ann.local_types.insert(case.id, binder);
            }
            let body = self.block(&case.body);
            result = Some(match result {
                None => body,
                Some(prev) => self.join(prev, body, case.span, "match cases"),
            });
        }
        result.unwrap_or(Type::UNIT)
    }

    fn case_binder(&mut self, sum: &Instantiation, case: &MatchCase) -> Type {
        let member = self.view().lookup_def(&case.member.name).cloned();
        let member = member.filter(|d| match d.kind {
            DefKind::Record(ref r) => r.sum == Some(sum.def()),
            DefKind::Object { sum: s } => s == Some(sum.def()),
            _ => false,
        });
        let Some(member) = member else {
            return self.error(
                codes::E0209,
                case.member.span,
                format!("'{}' is not a member of {}", case.member.name, sum),
            );
        };
        self.ann.cases.insert(case.id, member.id);
        if let Some(obj) = member.object_type() {
            return obj;
        }
        member
            .terminus()
            .and_then(|t| Instantiation::apply(t, sum.args()).ok())
            .map(Type::Instance)
            .unwrap_or(Type::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::plugin::PluginRegistry;
    use crate::resolve::{bind, ImportContext};
    use crate::scan::{check_record_cycles, record_graph, scan_params, scan_symbols, ScanContext};
    use crate::id::UnitId;

    struct Typed {
        program: Program,
        ann: Annotations,
        table: SymbolTable,
        diags: Vec<Diagnostic>,
    }

    fn typecheck(source: &str) -> Typed {
        let platform = Platform::new(&PluginRegistry::standard()).expect("platform");
        let parsed = parse(source, UnitId(1));
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        let program = parsed.program.expect("program");
        let ctx = ImportContext {
            own_name: "main",
            available: &[],
            platform: &platform.table,
        };
        let bound = bind(&program, UnitId(1), &ctx);
        assert!(bound.diagnostics.is_empty(), "{:?}", bound.diagnostics);
        let (params, _) = scan_params(&bound.decls);
        let graph = record_graph(&bound.decls, &params);
        let (sorted, _) = check_record_cycles(&bound.decls, &graph);
        let scan_ctx = ScanContext {
            imports: &[],
            platform: &platform.table,
        };
        let (mut table, scan_diags) = scan_symbols(
            bound.decls.table.clone(),
            &bound.decls,
            &params,
            &sorted.order,
            &scan_ctx,
        );
        assert!(scan_diags.is_empty(), "{:?}", scan_diags);
        let mut ann = Annotations::new();
        ann.bindings = bound.bindings;
        let diags = propagate(
            &program,
            &mut table,
            &mut ann,
            &PropagateContext {
                platform: &platform,
                imports: &[],
            },
        );
        Typed {
            program,
            ann,
            table,
            diags,
        }
    }

    fn last_type(t: &Typed) -> String {
        match &t.program.statements.last().expect("stmt").kind {
            StmtKind::Expr(e) => t.ann.type_of(e.id).to_string(),
            StmtKind::Val(_) => t
                .ann
                .local_type(t.program.statements.last().expect("stmt").id)
                .to_string(),
            other => panic!("unexpected {:?}", other),
        }
    }

    fn codes_of(t: &Typed) -> Vec<&'static str> {
        t.diags.iter().filter_map(|d| d.code.map(|c| c.0)).collect()
    }

    #[test]
    fn literals_and_concatenation() {
        let t = typecheck(r#"val s = "ab" + "cde""#);
        assert!(t.diags.is_empty(), "{:?}", t.diags);
        assert_eq!(last_type(&t), "String<5>");
    }

    #[test]
    fn decimal_arithmetic_widths() {
        let t = typecheck("1.25 * 3.5");
        assert_eq!(last_type(&t), "Decimal<5>");
        let t = typecheck("1.25 + 3.5");
        assert_eq!(last_type(&t), "Decimal<3>");
    }

    #[test]
    fn generic_function_instantiates_from_arguments() {
        let t = typecheck(
            "def first<T, #N>(xs: List<T, N>): T { xs.get(0) }\n\
             first(List('a', 'b', 'c'))",
        );
        assert!(t.diags.is_empty(), "{:?}", t.diags);
        assert_eq!(last_type(&t), "Char");
    }

    #[test]
    fn inferred_return_type_on_demand() {
        let t = typecheck(
            "def twice(x: Int) { double(x) }\n\
             def double(x: Int) { x * 2 }\n\
             twice(4)",
        );
        assert!(t.diags.is_empty(), "{:?}", t.diags);
        assert_eq!(last_type(&t), "Int");
        let id = t.table.lookup("double").expect("double");
        let ret = t.table.def(id).and_then(|d| d.as_function()).and_then(|f| f.ret.clone());
        assert_eq!(ret, Some(Type::INT));
    }

    #[test]
    fn recursion_without_return_type_is_reported() {
        let t = typecheck("def loop(x: Int) { loop(x) }");
        assert_eq!(codes_of(&t), vec!["E0301"]);
    }

    #[test]
    fn record_construction_and_field_access() {
        let t = typecheck(
            "record Box<T>(value: T, label: String<4>)\n\
             val b = Box(3, \"tag\")\n\
             b.value",
        );
        assert!(t.diags.is_empty(), "{:?}", t.diags);
        assert_eq!(last_type(&t), "Int");
    }

    #[test]
    fn match_binds_member_instances() {
        let t = typecheck(
            "val o = Some(4)\n\
             match (o) { case Some(s) { s.value } case None { 0 } }",
        );
        assert!(t.diags.is_empty(), "{:?}", t.diags);
        assert_eq!(last_type(&t), "Int");
    }

    #[test]
    fn list_of_option_members_lifts_to_sum() {
        let t = typecheck("List(Some(1), None)");
        assert!(t.diags.is_empty(), "{:?}", t.diags);
        assert_eq!(last_type(&t), "List<Option<Int>, 2>");
    }

    #[test]
    fn dictionary_iteration_yields_pairs() {
        let t = typecheck(
            "val d = Dictionary(Pair('a', 1), Pair('b', 2))\n\
             mutable n = 0\n\
             for (p in d) { n = n + p.second }\n\
             d",
        );
        assert!(t.diags.is_empty(), "{:?}", t.diags);
        assert_eq!(last_type(&t), "Dictionary<Char, Int, 2>");
    }

    #[test]
    fn type_errors() {
        let t = typecheck("1 + true");
        assert_eq!(codes_of(&t), vec!["E0210"]);
        let t = typecheck("List<Int, 2>(1, 2, 3)");
        assert_eq!(codes_of(&t), vec!["E0205"]);
        let t = typecheck("MutableList(1, 2)");
        assert_eq!(codes_of(&t), vec!["E0206"]);
        let t = typecheck("val x = 3\nx.size()");
        assert_eq!(codes_of(&t), vec!["E0207"]);
        let t = typecheck("abs(1, 2)");
        assert_eq!(codes_of(&t), vec!["E0201"]);
    }
}

// bans.rs — Feature and shape bans (the Bans phase)
//
// The cost model prices a higher-order call by looking at the lambdas and
// function references passed directly to it. Everything that would let a
// function value escape that shape is rejected here:
//
//   E0400  a function type anywhere but a top-level parameter of a `def`
//   E0401  higher-order nesting: function types inside parameter types,
//          forwarding a function parameter, invoking one from a lambda,
//          lambdas inside lambdas
//   E0402  definitions or imports inside blocks
//   E0403  a lambda or function reference that is not a direct argument to
//          a function-typed parameter; generic functions used as values
//
// Preconditions: Propagate ran (call targets and local types are known).
// Postconditions: every function value in the unit is a direct argument to
//   a function-typed parameter of a user function call.
// Failure modes: E0400–E0403.
// Side effects: none.

use crate::annot::{Annotations, Binding, CallTarget};
use crate::ast::*;
use crate::diag::{codes, DiagCode, Diagnostic};
use crate::symbols::{DefKind, SymbolView};

pub fn check_bans(program: &Program, view: SymbolView<'_>, ann: &Annotations) -> Vec<Diagnostic> {
    let mut bans = Bans {
        view,
        ann,
        in_lambda: false,
        diagnostics: Vec::new(),
    };
    for stmt in &program.statements {
        bans.top_level(stmt);
    }
    bans.diagnostics
}

struct Bans<'a> {
    view: SymbolView<'a>,
    ann: &'a Annotations,
    in_lambda: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Bans<'a> {
    fn error(&mut self, code: DiagCode, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(code, span, message));
    }

    // ── Type expressions ────────────────────────────────────────────────

    /// Reject any function type inside `ty`.
    fn no_function_type(&mut self, ty: &TypeExpr, code: DiagCode, what: &str) {
        match ty {
            TypeExpr::Function { span, .. } => {
                self.error(code, *span, format!("function types are not allowed in {}", what));
            }
            TypeExpr::Named { args, .. } | TypeExpr::FinOp { args, .. } => {
                for a in args {
                    self.no_function_type(a, codes::E0400, what);
                }
            }
            TypeExpr::FinLit(..) => {}
        }
    }

    fn param_type(&mut self, ty: &TypeExpr) {
        match ty {
            TypeExpr::Function { params, ret, .. } => {
                for p in params {
                    self.no_function_type(p, codes::E0401, "a function parameter's signature");
                }
                self.no_function_type(ret, codes::E0401, "a function parameter's signature");
            }
            other => self.no_function_type(other, codes::E0400, "type arguments"),
        }
    }

    fn fields(&mut self, fields: &[FieldDecl]) {
        for f in fields {
            self.no_function_type(&f.ty, codes::E0400, "record fields");
        }
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn top_level(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Import(_) | StmtKind::Object(_) => {}
            StmtKind::Def(decl) => {
                for p in &decl.params {
                    self.param_type(&p.ty);
                }
                if let Some(ret) = &decl.ret {
                    self.no_function_type(ret, codes::E0400, "return types");
                }
                self.block(&decl.body);
            }
            StmtKind::Record(decl) => self.fields(&decl.fields),
            StmtKind::Sum(decl) => {
                for m in &decl.members {
                    if let SumMember::Record(r) = m {
                        self.fields(&r.fields);
                    }
                }
            }
            _ => self.stmt(stmt),
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Import(name) => self.error(
                codes::E0402,
                name.span,
                "imports are only allowed at the top level",
            ),
            kind if kind.is_definition() => self.error(
                codes::E0402,
                stmt.span,
                "definitions are only allowed at the top level",
            ),
            StmtKind::Val(v) => {
                if let Some(ty) = &v.ty {
                    self.no_function_type(ty, codes::E0400, "value annotations");
                }
                self.expr(&v.value);
            }
            StmtKind::Assign(a) => {
                self.expr(&a.target);
                self.expr(&a.value);
            }
            StmtKind::Expr(e) => self.expr(e),
            _ => {}
        }
    }

    fn block(&mut self, block: &Block) {
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    /// Whether argument `index` of this call may be a function value.
    fn accepts_function(&self, call: &Expr, index: usize) -> bool {
        let Some(CallTarget::Function { def, .. }) = self.ann.calls.get(&call.id) else {
            return false;
        };
        match self.view.def(*def).map(|d| &d.kind) {
            Some(DefKind::Function(info)) => info
                .params
                .get(index)
                .is_some_and(|t| t.is_function()),
            _ => false,
        }
    }

    fn function_value(&mut self, expr: &Expr, allowed: bool) {
        match &expr.kind {
            ExprKind::Lambda { params, body } => {
                if !allowed {
                    self.error(
                        codes::E0403,
                        expr.span,
                        "a lambda may only be passed directly to a function parameter",
                    );
                }
                if self.in_lambda {
                    self.error(codes::E0401, expr.span, "lambdas cannot be nested");
                }
                for p in params {
                    self.no_function_type(&p.ty, codes::E0400, "lambda parameters");
                }
                let saved = std::mem::replace(&mut self.in_lambda, true);
                self.expr(body);
                self.in_lambda = saved;
            }
            ExprKind::Ref(name) => match self.ann.bindings.get(&expr.id) {
                Some(Binding::Local { .. }) => {
                    if self.ann.type_of(expr.id).is_function() {
                        self.error(
                            codes::E0401,
                            name.span,
                            format!("function parameter '{}' cannot be passed on", name.name),
                        );
                    }
                }
                Some(Binding::Global(id)) => {
                    let Some(def) = self.view.def(*id) else {
                        return;
                    };
                    if !matches!(def.kind, DefKind::Function(_) | DefKind::Plugin(_)) {
                        return;
                    }
                    if def.is_generic() {
                        self.error(
                            codes::E0403,
                            name.span,
                            format!("generic {} '{}' cannot be used as a value", def.kind_name(), name.name),
                        );
                    } else if !allowed {
                        self.error(
                            codes::E0403,
                            name.span,
                            format!(
                                "'{}' may only be passed directly to a function parameter",
                                name.name
                            ),
                        );
                    }
                }
                None => {}
            },
            _ => self.expr(expr),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Ref(_) | ExprKind::Lambda { .. } => self.function_value(expr, false),
            ExprKind::Block(b) => self.block(b),
            ExprKind::Call { args, .. } => {
                if self.in_lambda {
                    if let Some(CallTarget::FormalParam { .. }) = self.ann.calls.get(&expr.id) {
                        self.error(
                            codes::E0401,
                            expr.span,
                            "function parameters cannot be invoked inside a lambda",
                        );
                    }
                }
                for (i, a) in args.iter().enumerate() {
                    let allowed = self.accepts_function(expr, i);
                    self.function_value(a, allowed);
                }
            }
            ExprKind::DotAccess { receiver, .. } => self.expr(receiver),
            ExprKind::DotCall { receiver, args, .. } => {
                self.expr(receiver);
                for a in args {
                    self.expr(a);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond);
                self.block(then);
                if let Some(e) = otherwise {
                    self.expr(e);
                }
            }
            ExprKind::For { source, body, .. } => {
                self.expr(source);
                self.block(body);
            }
            ExprKind::Match { scrutinee, cases } => {
                self.expr(scrutinee);
                for c in cases {
                    self.block(&c.body);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::pass::PassId;
    use crate::test_support::compile_until;

    fn ban_codes(source: &str) -> Vec<&'static str> {
        compile_until(source, PassId::Bans)
            .iter()
            .filter_map(|d| d.code.map(|c| c.0))
            .collect()
    }

    const APPLY: &str = "def apply(f: (Int) -> Int, x: Int): Int { f(x) }\n";

    #[test]
    fn direct_lambda_argument_allowed() {
        let src = format!("{}apply(lambda (y: Int) -> y + 1, 2)", APPLY);
        assert!(ban_codes(&src).is_empty());
    }

    #[test]
    fn function_reference_argument_allowed() {
        let src = format!("{}def inc(y: Int): Int {{ y + 1 }}\napply(inc, 2)", APPLY);
        assert!(ban_codes(&src).is_empty());
    }

    #[test]
    fn lambda_outside_argument_position() {
        assert_eq!(ban_codes("val f = lambda (y: Int) -> y"), vec!["E0403"]);
    }

    #[test]
    fn function_types_in_banned_positions() {
        assert_eq!(ban_codes("record R(f: (Int) -> Int)"), vec!["E0400"]);
        assert_eq!(
            ban_codes("def f(g: (Int) -> Int): (Int) -> Int { g }"),
            vec!["E0400", "E0401"]
        );
    }

    #[test]
    fn nested_higher_order() {
        assert_eq!(
            ban_codes("def f(g: ((Int) -> Int) -> Int): Int { 1 }"),
            vec!["E0401"]
        );
        let src = format!(
            "{}def twice(f: (Int) -> Int, x: Int): Int {{ apply(f, x) }}",
            APPLY
        );
        assert_eq!(ban_codes(&src), vec!["E0401"]);
    }

    #[test]
    fn nested_definitions() {
        assert_eq!(
            ban_codes("def f(): Int { def g(): Int { 1 }\n 2 }"),
            vec!["E0402"]
        );
    }
}

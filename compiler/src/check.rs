// check.rs — Type checking (the Check phase)
//
// Verifies what Propagate only recorded: arguments against instantiated
// signatures, annotated `val`s against their values, assignments against
// binding and field mutability, conditions, declared return types, and
// match exhaustiveness.
//
// Preconditions: Propagate ran; `Annotations` holds types and signatures.
// Postconditions: none (read-only over annotations).
// Failure modes: E0200 (mismatch), E0208 (immutable target), E0209 (match).
// Side effects: none.

use std::collections::BTreeSet;

use crate::annot::{Annotations, Binding, DotTarget};
use crate::ast::*;
use crate::diag::{codes, Diagnostic};
use crate::id::DefId;
use crate::symbols::{DefKind, SymbolView};
use crate::types::{assignable, TerminusKind, Type};

pub fn check(program: &Program, view: SymbolView<'_>, ann: &Annotations) -> Vec<Diagnostic> {
    let mut checker = Checker {
        view,
        ann,
        diagnostics: Vec::new(),
    };
    for stmt in &program.statements {
        checker.stmt(stmt, true);
    }
    checker.diagnostics
}

struct Checker<'a> {
    view: SymbolView<'a>,
    ann: &'a Annotations,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Checker<'a> {
    fn mismatch(&mut self, span: Span, what: String, expected: &Type, found: &Type) {
        self.diagnostics.push(Diagnostic::error(
            codes::E0200,
            span,
            format!("type mismatch in {}: expected {}, found {}", what, expected, found),
        ));
    }

    fn stmt(&mut self, stmt: &Stmt, top_level: bool) {
        match &stmt.kind {
            StmtKind::Def(decl) if top_level => self.function(decl),
            StmtKind::Import(_)
            | StmtKind::Def(_)
            | StmtKind::Record(_)
            | StmtKind::Object(_)
            | StmtKind::Sum(_) => {}
            StmtKind::Val(v) => {
                self.expr(&v.value);
                if v.ty.is_some() {
                    let declared = self.ann.local_type(stmt.id);
                    let found = self.ann.type_of(v.value.id);
                    if !assignable(found, declared) {
                        self.mismatch(v.value.span, format!("'{}'", v.name.name), declared, found);
                    }
                }
            }
            StmtKind::Assign(a) => {
                self.expr(&a.target);
                self.expr(&a.value);
                self.assignment(a);
            }
            StmtKind::Expr(e) => self.expr(e),
        }
    }

    fn function(&mut self, decl: &FunctionDecl) {
        self.block(&decl.body);
        let Some(def) = self.view.local.lookup(&decl.name.name).and_then(|id| self.view.def(id))
        else {
            return;
        };
        let Some(info) = def.as_function() else {
            return;
        };
        if decl.ret.is_none() {
            return;
        }
        let Some(ret) = &info.ret else {
            return;
        };
        let body = self.ann.type_of(decl.body.id);
        if !assignable(body, ret) {
            self.mismatch(
                decl.body.span,
                format!("return value of '{}'", decl.name.name),
                ret,
                body,
            );
        }
    }

    fn assignment(&mut self, a: &AssignStmt) {
        let value = self.ann.type_of(a.value.id);
        match &a.target.kind {
            ExprKind::Ref(name) => match self.ann.bindings.get(&a.target.id) {
                Some(Binding::Local { mutable: false, .. }) => {
                    self.diagnostics.push(Diagnostic::error(
                        codes::E0208,
                        a.target.span,
                        format!("cannot assign to immutable '{}'", name.name),
                    ));
                    return;
                }
                Some(Binding::Global(_)) => {
                    self.diagnostics.push(Diagnostic::error(
                        codes::E0208,
                        a.target.span,
                        format!("cannot assign to definition '{}'", name.name),
                    ));
                    return;
                }
                _ => {}
            },
            ExprKind::DotAccess { receiver, member } => {
                let Some(DotTarget::Field { index }) = self.ann.dots.get(&a.target.id) else {
                    return;
                };
                let receiver_ty = self.ann.type_of(receiver.id);
                let field_mutable = receiver_ty
                    .as_instance()
                    .and_then(|inst| self.view.def(inst.def()))
                    .and_then(|d| d.as_record())
                    .and_then(|r| r.fields.get(*index))
                    .map(|f| f.mutable);
                if field_mutable == Some(false) {
                    self.diagnostics.push(Diagnostic::error(
                        codes::E0208,
                        member.span,
                        format!("field '{}' of {} is not mutable", member.name, receiver_ty),
                    ));
                    return;
                }
            }
            _ => {
                self.diagnostics.push(Diagnostic::error(
                    codes::E0208,
                    a.target.span,
                    "only names and record fields can be assigned",
                ));
                return;
            }
        }
        let target = self.ann.type_of(a.target.id);
        if !assignable(value, target) {
            self.mismatch(a.value.span, "assignment".to_string(), target, value);
        }
    }

    fn block(&mut self, block: &Block) {
        for stmt in &block.stmts {
            self.stmt(stmt, false);
        }
    }

    fn arguments(&mut self, expr: &Expr, callee: &str, args: &[Expr]) {
        let Some(sig) = self.ann.signatures.get(&expr.id) else {
            return;
        };
        for (i, (arg, param)) in args.iter().zip(&sig.params).enumerate() {
            let found = self.ann.type_of(arg.id);
            if !assignable(found, param) {
                self.mismatch(
                    arg.span,
                    format!("argument {} of '{}'", i + 1, callee),
                    param,
                    found,
                );
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::Ref(_) => {}
            ExprKind::Block(b) => self.block(b),
            ExprKind::Call { callee, args, .. } => {
                for a in args {
                    self.expr(a);
                }
                self.arguments(expr, &callee.name, args);
            }
            ExprKind::DotAccess { receiver, .. } => self.expr(receiver),
            ExprKind::DotCall {
                receiver,
                member,
                args,
                ..
            } => {
                self.expr(receiver);
                for a in args {
                    self.expr(a);
                }
                self.arguments(expr, &member.name, args);
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
                let ct = self.ann.type_of(cond.id);
                if !assignable(ct, &Type::BOOLEAN) {
                    self.mismatch(cond.span, "condition".to_string(), &Type::BOOLEAN, ct);
                }
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
                for case in cases {
                    self.block(&case.body);
                }
                self.exhaustive(scrutinee, cases, expr.span);
            }
            ExprKind::Lambda { body, .. } => self.expr(body),
        }
    }

    fn sum_of(&self, ty: &Type) -> Option<DefId> {
        let inst = ty.as_instance()?;
        match inst.terminus().kind {
            TerminusKind::Sum => Some(inst.def()),
            TerminusKind::Record { sum } => sum,
            _ => None,
        }
    }

    fn exhaustive(&mut self, scrutinee: &Expr, cases: &[MatchCase], span: Span) {
        let mut seen = BTreeSet::new();
        for case in cases {
            if let Some(member) = self.ann.cases.get(&case.id) {
                if !seen.insert(*member) {
                    self.diagnostics.push(Diagnostic::error(
                        codes::E0209,
                        case.member.span,
                        format!("duplicate case '{}'", case.member.name),
                    ));
                }
            }
        }
        let Some(sum) = self.sum_of(self.ann.type_of(scrutinee.id)) else {
            return;
        };
        let Some(DefKind::Sum(info)) = self.view.def(sum).map(|d| &d.kind) else {
            return;
        };
        let missing: Vec<String> = info
            .members
            .iter()
            .filter(|m| !seen.contains(*m))
            .filter_map(|m| self.view.def(*m).map(|d| d.name.to_string()))
            .collect();
        if !missing.is_empty() {
            self.diagnostics.push(Diagnostic::error(
                codes::E0209,
                span,
                format!("match is missing cases: {}", missing.join(", ")),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::compile_until;
    use crate::pass::PassId;

    fn check_codes(source: &str) -> Vec<&'static str> {
        compile_until(source, PassId::Check)
            .iter()
            .filter_map(|d| d.code.map(|c| c.0))
            .collect()
    }

    #[test]
    fn well_typed_unit_passes() {
        let src = "record Counter(mutable n: Int)\n\
                   def bump(c: Counter): Int { c.n = c.n + 1; c.n }\n\
                   val c = Counter(0)\n\
                   bump(c)";
        assert!(check_codes(src).is_empty());
    }

    #[test]
    fn argument_mismatch() {
        assert_eq!(check_codes("def f(x: Int): Int { x }\nf('c')"), vec!["E0200"]);
    }

    #[test]
    fn immutable_targets() {
        assert_eq!(check_codes("val x = 1\nx = 2"), vec!["E0208"]);
        assert_eq!(
            check_codes("record P(x: Int)\nval p = P(1)\np.x = 2"),
            vec!["E0208"]
        );
        assert!(check_codes("mutable x = 1\nx = 2").is_empty());
    }

    #[test]
    fn declared_return_type_enforced() {
        assert_eq!(check_codes("def f(): Int { true }"), vec!["E0200"]);
    }

    #[test]
    fn condition_must_be_boolean() {
        assert_eq!(check_codes("if (1) { 2 }"), vec!["E0200"]);
    }

    #[test]
    fn match_exhaustiveness() {
        assert_eq!(
            check_codes("val o = Some(1)\nmatch (o) { case Some(s) { 1 } }"),
            vec!["E0209"]
        );
        assert_eq!(
            check_codes("val o = Some(1)\nmatch (o) { case None { 1 } case None { 2 } case Some { 3 } }"),
            vec!["E0209"]
        );
    }

    #[test]
    fn explicit_mutable_collection_annotation() {
        assert!(check_codes("mutable xs: MutableList<Int, 3> = MutableList<Int, 3>(1)").is_empty());
        assert_eq!(
            check_codes("val xs: MutableList<Int, 2> = MutableList<Int, 3>(1)"),
            vec!["E0200"]
        );
    }
}

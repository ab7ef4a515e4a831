// resolve.rs — Scope binding (the Bind phase)
//
// Collects the unit's top-level definitions, reserves their `DefId`s in
// source order, checks import statements, and binds every name in
// expression position to a local declaration or a global definition.
//
// Scoping rules:
//   - blocks, `for` bodies, and match cases open a nested scope;
//   - a function body starts a fresh scope that sees only its parameters
//     and global definitions (top-level `val`s are not visible);
//   - a lambda body sees the enclosing locals plus its own parameters;
//   - a name declared twice in the same scope is an error.
//
// Preconditions: `program` parsed without syntax errors.
// Postconditions: every `Ref` and `Call` node that names something in scope
//   has an entry in `bindings`; `decls.table` has IDs reserved for every
//   top-level definition.
// Failure modes: unknown names (E0100), duplicates (E0101), unknown or self
//   imports (E0102, E0103). Binding continues past errors.
// Side effects: none.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::annot::Binding;
use crate::ast::*;
use crate::diag::{codes, Diagnostic};
use crate::id::{DefId, NodeId, UnitId};
use crate::symbols::SymbolTable;

// ── Declarations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum DeclItem {
    Function {
        def: DefId,
        decl: Rc<FunctionDecl>,
    },
    /// A record, either top-level or a sum member. Members take their type
    /// parameters from the sum (`params_owner`).
    Record {
        def: DefId,
        decl: RecordDecl,
        sum: Option<DefId>,
        params_owner: DefId,
    },
    Object {
        def: DefId,
        name: Ident,
        sum: Option<DefId>,
    },
    Sum {
        def: DefId,
        decl: Rc<SumDecl>,
        members: Vec<DefId>,
    },
}

impl DeclItem {
    pub fn def(&self) -> DefId {
        match self {
            DeclItem::Function { def, .. }
            | DeclItem::Record { def, .. }
            | DeclItem::Object { def, .. }
            | DeclItem::Sum { def, .. } => *def,
        }
    }

    pub fn name(&self) -> &Ident {
        match self {
            DeclItem::Function { decl, .. } => &decl.name,
            DeclItem::Record { decl, .. } => &decl.name,
            DeclItem::Object { name, .. } => name,
            DeclItem::Sum { decl, .. } => &decl.name,
        }
    }
}

/// Top-level definitions of one unit, in source order.
#[derive(Debug, Clone)]
pub struct Declarations {
    /// Table with IDs reserved; definitions are filled in by SymbolScan.
    pub table: SymbolTable,
    pub by_name: BTreeMap<String, DefId>,
    pub items: Vec<DeclItem>,
}

impl Declarations {
    pub fn item(&self, def: DefId) -> Option<&DeclItem> {
        self.items.iter().find(|i| i.def() == def)
    }
}

/// What a unit's import statements may refer to.
pub struct ImportContext<'a> {
    pub own_name: &'a str,
    /// Already compiled units, by name.
    pub available: &'a [(String, Rc<SymbolTable>)],
    pub platform: &'a SymbolTable,
}

#[derive(Debug)]
pub struct BindResult {
    pub decls: Declarations,
    pub bindings: HashMap<NodeId, Binding>,
    /// Tables of the units this unit imports, in import order.
    pub imports: Vec<Rc<SymbolTable>>,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub fn bind(program: &Program, unit: UnitId, ctx: &ImportContext<'_>) -> BindResult {
    let mut binder = Binder {
        ctx,
        decls: Declarations {
            table: SymbolTable::new(unit),
            by_name: BTreeMap::new(),
            items: Vec::new(),
        },
        imports: Vec::new(),
        bindings: HashMap::new(),
        scopes: Vec::new(),
        diagnostics: Vec::new(),
    };

    binder.collect_imports(program);
    binder.collect_definitions(program);
    binder.bind_program(program);

    BindResult {
        decls: binder.decls,
        bindings: binder.bindings,
        imports: binder.imports,
        diagnostics: binder.diagnostics,
    }
}

// ── Binder ──────────────────────────────────────────────────────────────────

struct Scope {
    names: HashMap<String, (NodeId, bool)>,
    /// A function-body root: lookups stop here before reaching outer locals.
    barrier: bool,
}

struct Binder<'a> {
    ctx: &'a ImportContext<'a>,
    decls: Declarations,
    imports: Vec<Rc<SymbolTable>>,
    bindings: HashMap<NodeId, Binding>,
    scopes: Vec<Scope>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Binder<'a> {
    fn error(&mut self, code: crate::diag::DiagCode, span: Span, message: String) {
        self.diagnostics.push(Diagnostic::error(code, span, message));
    }

    // ── Imports and definitions ─────────────────────────────────────────

    fn collect_imports(&mut self, program: &Program) {
        for stmt in &program.statements {
            let StmtKind::Import(name) = &stmt.kind else {
                continue;
            };
            if name.name == self.ctx.own_name {
                self.error(
                    codes::E0103,
                    name.span,
                    format!("unit '{}' cannot import itself", name.name),
                );
                continue;
            }
            match self.ctx.available.iter().find(|(n, _)| *n == name.name) {
                Some((_, table)) => {
                    if !self.imports.iter().any(|t| Rc::ptr_eq(t, table)) {
                        self.imports.push(Rc::clone(table));
                    }
                }
                None => self.error(
                    codes::E0102,
                    name.span,
                    format!("unknown import '{}'", name.name),
                ),
            }
        }
    }

    fn declare(&mut self, name: &Ident) -> Option<DefId> {
        if self.decls.by_name.contains_key(&name.name) {
            self.error(
                codes::E0101,
                name.span,
                format!("identifier '{}' already exists", name.name),
            );
            return None;
        }
        let def = self.decls.table.reserve();
        self.decls.by_name.insert(name.name.clone(), def);
        Some(def)
    }

    fn collect_definitions(&mut self, program: &Program) {
        for stmt in &program.statements {
            match &stmt.kind {
                StmtKind::Def(decl) => {
                    if let Some(def) = self.declare(&decl.name) {
                        self.decls.items.push(DeclItem::Function {
                            def,
                            decl: Rc::clone(decl),
                        });
                    }
                }
                StmtKind::Record(decl) => {
                    if let Some(def) = self.declare(&decl.name) {
                        self.decls.items.push(DeclItem::Record {
                            def,
                            decl: (**decl).clone(),
                            sum: None,
                            params_owner: def,
                        });
                    }
                }
                StmtKind::Object(decl) => {
                    if let Some(def) = self.declare(&decl.name) {
                        self.decls.items.push(DeclItem::Object {
                            def,
                            name: decl.name.clone(),
                            sum: None,
                        });
                    }
                }
                StmtKind::Sum(decl) => {
                    let Some(sum) = self.declare(&decl.name) else {
                        continue;
                    };
                    let mut members = Vec::new();
                    let mut items = Vec::new();
                    for member in &decl.members {
                        let Some(def) = self.declare(member.name()) else {
                            continue;
                        };
                        members.push(def);
                        items.push(match member {
                            SumMember::Record(r) => DeclItem::Record {
                                def,
                                decl: r.clone(),
                                sum: Some(sum),
                                params_owner: sum,
                            },
                            SumMember::Object(o) => DeclItem::Object {
                                def,
                                name: o.name.clone(),
                                sum: Some(sum),
                            },
                        });
                    }
                    self.decls.items.push(DeclItem::Sum {
                        def: sum,
                        decl: Rc::clone(decl),
                        members,
                    });
                    self.decls.items.extend(items);
                }
                _ => {}
            }
        }
    }

    // ── Scopes ──────────────────────────────────────────────────────────

    fn push(&mut self, barrier: bool) {
        self.scopes.push(Scope {
            names: HashMap::new(),
            barrier,
        });
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn define_local(&mut self, name: &Ident, decl: NodeId, mutable: bool) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.names.contains_key(&name.name) {
            self.error(
                codes::E0101,
                name.span,
                format!("identifier '{}' already exists", name.name),
            );
            return;
        }
        scope.names.insert(name.name.clone(), (decl, mutable));
    }

    fn lookup(&self, name: &str) -> Option<Binding> {
        for scope in self.scopes.iter().rev() {
            if let Some((decl, mutable)) = scope.names.get(name) {
                return Some(Binding::Local {
                    decl: *decl,
                    mutable: *mutable,
                });
            }
            if scope.barrier {
                break;
            }
        }
        self.decls
            .by_name
            .get(name)
            .copied()
            .or_else(|| self.imports.iter().find_map(|t| t.lookup(name)))
            .or_else(|| self.ctx.platform.lookup(name))
            .map(Binding::Global)
    }

    fn bind_name(&mut self, node: NodeId, name: &Ident) {
        match self.lookup(&name.name) {
            Some(binding) => {
                self.bindings.insert(node, binding);
            }
            None => self.error(
                codes::E0100,
                name.span,
                format!("identifier '{}' not found", name.name),
            ),
        }
    }

    // ── Bodies ──────────────────────────────────────────────────────────

    fn bind_program(&mut self, program: &Program) {
        self.push(true);
        for stmt in &program.statements {
            self.bind_stmt(stmt);
        }
        self.pop();
    }

    fn bind_function(&mut self, decl: &FunctionDecl) {
        self.push(true);
        for p in &decl.params {
            self.define_local(&p.name, p.id, false);
        }
        self.bind_block(&decl.body);
        self.pop();
    }

    fn bind_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Def(decl) => self.bind_function(decl),
            StmtKind::Import(_) | StmtKind::Record(_) | StmtKind::Object(_) | StmtKind::Sum(_) => {}
            StmtKind::Val(v) => {
                self.bind_expr(&v.value);
                self.define_local(&v.name, stmt.id, v.mutable);
            }
            StmtKind::Assign(a) => {
                self.bind_expr(&a.target);
                self.bind_expr(&a.value);
            }
            StmtKind::Expr(e) => self.bind_expr(e),
        }
    }

    fn bind_block(&mut self, block: &Block) {
        self.push(false);
        for stmt in &block.stmts {
            self.bind_stmt(stmt);
        }
        self.pop();
    }

    fn bind_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Ref(name) => self.bind_name(expr.id, name),
            ExprKind::Block(b) => self.bind_block(b),
            ExprKind::Call { callee, args, .. } => {
                self.bind_name(expr.id, callee);
                for a in args {
                    self.bind_expr(a);
                }
            }
            ExprKind::DotAccess { receiver, .. } => self.bind_expr(receiver),
            ExprKind::DotCall { receiver, args, .. } => {
                self.bind_expr(receiver);
                for a in args {
                    self.bind_expr(a);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.bind_expr(lhs);
                self.bind_expr(rhs);
            }
            ExprKind::Unary { operand, .. } => self.bind_expr(operand),
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.bind_expr(cond);
                self.bind_block(then);
                if let Some(e) = otherwise {
                    self.bind_expr(e);
                }
            }
            ExprKind::For {
                binder,
                source,
                body,
            } => {
                self.bind_expr(source);
                self.push(false);
                self.define_local(binder, expr.id, false);
                self.bind_block(body);
                self.pop();
            }
            ExprKind::Match { scrutinee, cases } => {
                self.bind_expr(scrutinee);
                for case in cases {
                    self.push(false);
                    if let Some(b) = &case.binder {
                        self.define_local(b, case.id, false);
                    }
                    self.bind_block(&case.body);
                    self.pop();
                }
            }
            ExprKind::Lambda { params, body } => {
                self.push(false);
                for p in params {
                    self.define_local(&p.name, p.id, false);
                }
                self.bind_expr(body);
                self.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const UNIT: UnitId = UnitId(1);

    fn run(src: &str) -> (Program, BindResult) {
        let parsed = parse(src, UNIT);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        let program = parsed.program.expect("program");
        let platform = SymbolTable::new(UnitId::PLATFORM);
        let ctx = ImportContext {
            own_name: "main",
            available: &[],
            platform: &platform,
        };
        let result = bind(&program, UNIT, &ctx);
        (program, result)
    }

    fn codes_of(result: &BindResult) -> Vec<&'static str> {
        result
            .diagnostics
            .iter()
            .filter_map(|d| d.code.map(|c| c.0))
            .collect()
    }

    #[test]
    fn definitions_reserve_ids_in_source_order() {
        let (_, result) = run("record A(x: Int)\nsum S { object X; object Y }\ndef f() { 1 }");
        let names: Vec<&str> = result
            .decls
            .items
            .iter()
            .map(|i| i.name().name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "S", "X", "Y", "f"]);
        assert!(result.decls.by_name["A"] < result.decls.by_name["X"]);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn locals_shadow_outer_scopes_only_in_nested_blocks() {
        let (program, result) = run("val x = 1\n{ val x = 2\n x }\nx");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let StmtKind::Expr(last) = &program.statements[2].kind else {
            panic!("expected expression statement");
        };
        assert_eq!(
            result.bindings[&last.id],
            Binding::Local {
                decl: program.statements[0].id,
                mutable: false
            }
        );
    }

    #[test]
    fn function_bodies_do_not_see_top_level_vals() {
        let (_, result) = run("val limit = 3\ndef f(n: Int) { n + limit }");
        assert_eq!(codes_of(&result), vec!["E0100"]);
    }

    #[test]
    fn lambdas_see_enclosing_locals() {
        let (_, result) = run(
            "def apply(f: (Int) -> Int): Int { f(1) }\nval k = 2\napply(lambda(x: Int) -> x + k)",
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn duplicates_are_reported() {
        let (_, result) = run("object A\nobject A\nval v = 1\nval v = 2");
        assert_eq!(codes_of(&result), vec!["E0101", "E0101"]);
    }

    #[test]
    fn self_and_unknown_imports() {
        let (_, result) = run("import main\nimport other");
        assert_eq!(codes_of(&result), vec!["E0103", "E0102"]);
    }
}

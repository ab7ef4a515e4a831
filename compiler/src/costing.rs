// costing.rs — Cost passes: Multipliers, FunctionCost, TreeCost, CostLimit
//
// Every node's cost is its architecture base cost plus a structural
// combination of its children:
//
//   sequence  sum of statements
//   branch    condition + max of branches
//   loop      source + N × body, N the source's Fin bound
//   call      arguments + callee body cost replayed through the call's
//             instantiation + for each function-typed parameter, its
//             multiplier × the cost of the function value passed in
//
// A function's multipliers count how often each function-typed parameter
// is invoked per call: one per invocation site, times the bounds of the
// enclosing loops. Function bodies are costed in call-graph order so that a
// callee's cost is known before any caller is priced. Recursion is
// rejected outright.
//
// Preconditions: Bans passed (function values only appear as direct
//   arguments to function-typed parameters).
// Postconditions: every local `FunctionInfo` has `cost` and `multipliers`;
//   `Annotations::costs` holds the cost of every costed node.
// Failure modes: E0301 (recursion), E0500 (cost over limit), E0600 (a loop
//   source without a Fin bound).
// Side effects: writes function costs into the unit's symbol table.

use std::rc::Rc;

use crate::annot::{Annotations, Binding, CallTarget, DotTarget};
use crate::arch::{Architecture, CostKind};
use crate::ast::*;
use crate::builtins::Platform;
use crate::cost::{structural_hash_cost, CostExpr};
use crate::diag::{codes, Diagnostic, Location};
use crate::graph::DepGraph;
use crate::id::{DefId, NodeId};
use crate::symbols::{DefKind, Definition, SymbolTable, SymbolView};

/// Outcome of the CostLimit pass.
#[derive(Debug, Clone, PartialEq)]
pub enum CostVerdict {
    /// The unit's cost is known and within the ceiling.
    Within(u64),
    /// The cost still mentions Fin parameters; it is checked again once a
    /// call supplies them.
    Deferred(CostExpr),
}

pub struct CostContext<'a> {
    pub arch: &'a Architecture,
    pub platform: &'a Platform,
    pub imports: &'a [Rc<SymbolTable>],
}

/// Call every `visit` on `expr` and all expressions nested in it, lambda
/// bodies included. Nested definitions are skipped.
fn walk_expr(expr: &Expr, visit: &mut impl FnMut(&Expr)) {
    visit(expr);
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Ref(_) => {}
        ExprKind::Block(b) => walk_block(b, visit),
        ExprKind::Call { args, .. } => args.iter().for_each(|a| walk_expr(a, visit)),
        ExprKind::DotAccess { receiver, .. } => walk_expr(receiver, visit),
        ExprKind::DotCall { receiver, args, .. } => {
            walk_expr(receiver, visit);
            args.iter().for_each(|a| walk_expr(a, visit));
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, visit);
            walk_expr(rhs, visit);
        }
        ExprKind::Unary { operand, .. } => walk_expr(operand, visit),
        ExprKind::If {
            cond,
            then,
            otherwise,
        } => {
            walk_expr(cond, visit);
            walk_block(then, visit);
            if let Some(e) = otherwise {
                walk_expr(e, visit);
            }
        }
        ExprKind::For { source, body, .. } => {
            walk_expr(source, visit);
            walk_block(body, visit);
        }
        ExprKind::Match { scrutinee, cases } => {
            walk_expr(scrutinee, visit);
            cases.iter().for_each(|c| walk_block(&c.body, visit));
        }
        ExprKind::Lambda { body, .. } => walk_expr(body, visit),
    }
}

fn walk_block(block: &Block, visit: &mut impl FnMut(&Expr)) {
    for stmt in &block.stmts {
        match &stmt.kind {
            StmtKind::Val(v) => walk_expr(&v.value, visit),
            StmtKind::Assign(a) => {
                walk_expr(&a.target, visit);
                walk_expr(&a.value, visit);
            }
            StmtKind::Expr(e) => walk_expr(e, visit),
            _ => {}
        }
    }
}

fn local_functions(table: &SymbolTable) -> Vec<(DefId, Rc<FunctionDecl>)> {
    table
        .iter()
        .filter_map(|d| d.as_function().map(|f| (d.id, Rc::clone(&f.decl))))
        .collect()
}

// ── Multipliers ─────────────────────────────────────────────────────────────

struct MultiplierScan<'a> {
    ann: &'a Annotations,
    params: &'a [ParamDecl],
    /// Fin bounds of the loops enclosing the current node.
    loops: Vec<CostExpr>,
    sites: Vec<Vec<CostExpr>>,
}

impl<'a> MultiplierScan<'a> {
    fn block(&mut self, block: &Block) {
        for stmt in &block.stmts {
            match &stmt.kind {
                StmtKind::Val(v) => self.expr(&v.value),
                StmtKind::Assign(a) => {
                    self.expr(&a.target);
                    self.expr(&a.value);
                }
                StmtKind::Expr(e) => self.expr(e),
                _ => {}
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        if let ExprKind::For { source, body, .. } = &expr.kind {
            self.expr(source);
            let bound = Platform::fin_bound(self.ann.type_of(source.id)).unwrap_or(CostExpr::ZERO);
            self.loops.push(bound);
            self.block(body);
            self.loops.pop();
            return;
        }
        if let Some(CallTarget::FormalParam { decl }) = self.ann.calls.get(&expr.id) {
            if let Some(i) = self.params.iter().position(|p| p.id == *decl) {
                self.sites[i].push(CostExpr::product(self.loops.iter().cloned()));
            }
        }
        match &expr.kind {
            ExprKind::Block(b) => self.block(b),
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
            ExprKind::Match { scrutinee, cases } => {
                self.expr(scrutinee);
                for c in cases {
                    self.block(&c.body);
                }
            }
            _ => {
                // Remaining forms have no nested blocks of their own.
                let mut children = Vec::new();
                collect_children(expr, &mut children);
                for child in children {
                    self.expr(child);
                }
            }
        }
    }
}

fn collect_children<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match &expr.kind {
        ExprKind::Call { args, .. } => out.extend(args),
        ExprKind::DotAccess { receiver, .. } => out.push(receiver),
        ExprKind::DotCall { receiver, args, .. } => {
            out.push(receiver);
            out.extend(args);
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            out.push(lhs);
            out.push(rhs);
        }
        ExprKind::Unary { operand, .. } => out.push(operand),
        ExprKind::Lambda { body, .. } => out.push(body),
        _ => {}
    }
}

/// Fill in `FunctionInfo::multipliers` for every local function.
pub fn infer_multipliers(table: &mut SymbolTable, ann: &Annotations) {
    for (def, decl) in local_functions(table) {
        let mut scan = MultiplierScan {
            ann,
            params: &decl.params,
            loops: Vec::new(),
            sites: vec![Vec::new(); decl.params.len()],
        };
        scan.block(&decl.body);
        let multipliers: Vec<CostExpr> = scan.sites.into_iter().map(CostExpr::sum).collect();
        if let Some(DefKind::Function(info)) = table.def_mut(def).map(|d| &mut d.kind) {
            info.multipliers = multipliers;
        }
    }
}

// ── FunctionCost ────────────────────────────────────────────────────────────

/// Edges from each local function to the functions it calls or passes.
pub fn function_graph(table: &SymbolTable, ann: &Annotations) -> DepGraph<DefId> {
    let mut graph = DepGraph::new();
    for (def, decl) in local_functions(table) {
        graph.add_node(def);
        walk_block(&decl.body, &mut |e| {
            let callee = match (ann.calls.get(&e.id), &e.kind) {
                (Some(CallTarget::Function { def, .. }), _) => Some(*def),
                (_, ExprKind::Ref(_)) => match ann.bindings.get(&e.id) {
                    Some(Binding::Global(g)) if g.unit == table.unit => table
                        .def(*g)
                        .and_then(Definition::as_function)
                        .map(|_| *g),
                    _ => None,
                },
                _ => None,
            };
            if let Some(callee) = callee {
                graph.add_edge(def, callee);
            }
        });
    }
    graph
}

/// Cost every local function body, callees first. `graph` already has the
/// imported units' call graphs folded in.
pub fn cost_functions(
    graph: &DepGraph<DefId>,
    table: &mut SymbolTable,
    ann: &mut Annotations,
    ctx: &CostContext<'_>,
) -> Vec<Diagnostic> {
    let sorted = graph.sorted();
    let mut diagnostics = Vec::new();
    for def in &sorted.cycles {
        if def.unit != table.unit {
            continue;
        }
        if let Some(d) = table.def(*def) {
            diagnostics.push(Diagnostic::error(
                codes::E0301,
                Location::NotInSource,
                format!("recursive function detected: {}", d.name),
            ));
        }
    }
    if !diagnostics.is_empty() {
        return diagnostics;
    }

    let unit = table.unit;
    for def in sorted.order.into_iter().filter(|d| d.unit == unit) {
        let Some(decl) = table.def(def).and_then(|d| d.as_function()).map(|f| Rc::clone(&f.decl))
        else {
            continue;
        };
        let cost = {
            let mut coster = Coster::new(ctx, table, ann);
            let cost = coster.block(&decl.body);
            diagnostics.append(&mut coster.diagnostics);
            cost
        };
        tracing::trace!(function = %decl.name.name, cost = %cost, "function cost");
        if let Some(DefKind::Function(info)) = table.def_mut(def).map(|d| &mut d.kind) {
            info.cost = Some(cost);
        }
    }
    diagnostics
}

// ── TreeCost ────────────────────────────────────────────────────────────────

/// Cost of the unit's top-level statements.
pub fn tree_cost(
    program: &Program,
    table: &SymbolTable,
    ann: &mut Annotations,
    ctx: &CostContext<'_>,
) -> (CostExpr, Vec<Diagnostic>) {
    let mut coster = Coster::new(ctx, table, ann);
    let costs: Vec<CostExpr> = program.statements.iter().map(|s| coster.stmt(s)).collect();
    (CostExpr::sum(costs), coster.diagnostics)
}

struct Coster<'a> {
    arch: &'a Architecture,
    view: SymbolView<'a>,
    ann: &'a mut Annotations,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Coster<'a> {
    fn new(ctx: &'a CostContext<'a>, table: &'a SymbolTable, ann: &'a mut Annotations) -> Self {
        Self {
            arch: ctx.arch,
            view: SymbolView {
                local: table,
                imports: ctx.imports,
                platform: &ctx.platform.table,
            },
            ann,
            diagnostics: Vec::new(),
        }
    }

    fn base(&self, kind: CostKind) -> CostExpr {
        CostExpr::Fin(self.arch.node_cost(kind))
    }

    fn store(&mut self, node: NodeId, cost: CostExpr) -> CostExpr {
        self.ann.costs.insert(node, cost.clone());
        cost
    }

    fn stmt(&mut self, stmt: &Stmt) -> CostExpr {
        let cost = match &stmt.kind {
            StmtKind::Import(_)
            | StmtKind::Def(_)
            | StmtKind::Record(_)
            | StmtKind::Object(_)
            | StmtKind::Sum(_) => return CostExpr::ZERO,
            StmtKind::Val(v) => self.base(CostKind::Val).plus(self.expr(&v.value)),
            StmtKind::Assign(a) => {
                let target = match &a.target.kind {
                    ExprKind::Ref(_) => CostExpr::ZERO,
                    _ => self.expr(&a.target),
                };
                CostExpr::sum([self.base(CostKind::Assign), target, self.expr(&a.value)])
            }
            StmtKind::Expr(e) => self.expr(e),
        };
        self.store(stmt.id, cost)
    }

    fn block(&mut self, block: &Block) -> CostExpr {
        let mut parts = vec![self.base(CostKind::Block)];
        for stmt in &block.stmts {
            parts.push(self.stmt(stmt));
        }
        let cost = CostExpr::sum(parts);
        self.store(block.id, cost)
    }

    fn exprs(&mut self, exprs: &[Expr]) -> CostExpr {
        let parts: Vec<CostExpr> = exprs.iter().map(|e| self.expr(e)).collect();
        CostExpr::sum(parts)
    }

    fn expr(&mut self, expr: &Expr) -> CostExpr {
        let cost = match &expr.kind {
            ExprKind::Literal(_) => self.base(CostKind::Literal),
            ExprKind::Ref(_) => self.base(CostKind::Reference),
            ExprKind::Block(b) => self.block(b),
            ExprKind::Call { args, .. } => {
                let args_cost = self.exprs(args);
                let callee = self.callee(expr, args);
                CostExpr::sum([self.base(CostKind::Call), args_cost, callee])
            }
            ExprKind::DotAccess { receiver, .. } => {
                self.base(CostKind::DotAccess).plus(self.expr(receiver))
            }
            ExprKind::DotCall { receiver, args, .. } => {
                let member = match self.ann.dots.get(&expr.id) {
                    Some(DotTarget::Member(sig)) => sig.cost.clone(),
                    _ => CostExpr::ZERO,
                };
                CostExpr::sum([
                    self.base(CostKind::DotCall),
                    self.expr(receiver),
                    self.exprs(args),
                    member,
                ])
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let hash = match op {
                    BinaryOp::Eq | BinaryOp::NotEq => structural_hash_cost(self.ann.type_of(lhs.id)),
                    _ => CostExpr::ZERO,
                };
                CostExpr::sum([self.base(CostKind::Binary), self.expr(lhs), self.expr(rhs), hash])
            }
            ExprKind::Unary { operand, .. } => self.base(CostKind::Unary).plus(self.expr(operand)),
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => {
                let c = self.expr(cond);
                let t = self.block(then);
                let o = match otherwise {
                    Some(e) => self.expr(e),
                    None => CostExpr::ZERO,
                };
                CostExpr::sum([self.base(CostKind::If), c, CostExpr::max([t, o])])
            }
            ExprKind::For { source, body, .. } => {
                let s = self.expr(source);
                let b = self.block(body);
                match Platform::fin_bound(self.ann.type_of(source.id)) {
                    Some(n) => CostExpr::sum([self.base(CostKind::For), s, n.times(b)]),
                    None => {
                        self.diagnostics.push(Diagnostic::error(
                            codes::E0600,
                            source.span,
                            format!(
                                "type system bug: loop source of type {} has no Fin bound",
                                self.ann.type_of(source.id)
                            ),
                        ));
                        CostExpr::ZERO
                    }
                }
            }
            ExprKind::Match { scrutinee, cases } => {
                let s = self.expr(scrutinee);
                let arms: Vec<CostExpr> = cases.iter().map(|c| self.block(&c.body)).collect();
                CostExpr::sum([self.base(CostKind::Match), s, CostExpr::max(arms)])
            }
            ExprKind::Lambda { body, .. } => {
                self.expr(body);
                self.base(CostKind::Lambda)
            }
        };
        self.store(expr.id, cost)
    }

    /// Cost contributed by what a call invokes, beyond its arguments.
    fn callee(&mut self, expr: &Expr, args: &[Expr]) -> CostExpr {
        match self.ann.calls.get(&expr.id).cloned() {
            Some(CallTarget::Function { def, inst }) => {
                let Some(info) = self.view.def(def).and_then(Definition::as_function) else {
                    return CostExpr::ZERO;
                };
                let Some(body) = &info.cost else {
                    self.diagnostics.push(Diagnostic::error(
                        codes::E0600,
                        expr.span,
                        format!("type system bug: cost of '{}' is not known", info.decl.name.name),
                    ));
                    return CostExpr::ZERO;
                };
                let mut parts = vec![inst.replay_cost(body)];
                for (multiplier, arg) in info.multipliers.iter().zip(args) {
                    if *multiplier == CostExpr::ZERO {
                        continue;
                    }
                    let per_call = self.function_value(arg);
                    parts.push(inst.replay_cost(multiplier).times(per_call));
                }
                CostExpr::sum(parts)
            }
            Some(CallTarget::Plugin { def, inst }) => match self.view.def(def).map(|d| &d.kind) {
                Some(DefKind::Plugin(p)) => inst.replay_cost(&p.cost),
                _ => CostExpr::ZERO,
            },
            _ => CostExpr::ZERO,
        }
    }

    /// Cost of one invocation of a function value passed as an argument.
    fn function_value(&self, arg: &Expr) -> CostExpr {
        let call = self.base(CostKind::Call);
        match &arg.kind {
            ExprKind::Lambda { body, .. } => self.ann.cost_of(body.id).plus(call),
            ExprKind::Ref(_) => {
                let def = match self.ann.bindings.get(&arg.id) {
                    Some(Binding::Global(g)) => self.view.def(*g),
                    _ => None,
                };
                match def.map(|d| &d.kind) {
                    Some(DefKind::Function(f)) => f.cost.clone().unwrap_or(CostExpr::ZERO).plus(call),
                    Some(DefKind::Plugin(p)) => p.cost.clone().plus(call),
                    _ => CostExpr::ZERO,
                }
            }
            _ => CostExpr::ZERO,
        }
    }
}

// ── CostLimit ───────────────────────────────────────────────────────────────

/// Compare an evaluable cost against the ceiling; defer a symbolic one.
pub fn check_cost_limit(cost: &CostExpr, arch: &Architecture) -> Result<CostVerdict, Diagnostic> {
    match cost.evaluate() {
        Some(value) if value > arch.cost_upper_limit => Err(Diagnostic::error(
            codes::E0500,
            Location::NotInSource,
            format!(
                "cost over limit: {} exceeds {}",
                value, arch.cost_upper_limit
            ),
        )),
        Some(value) => Ok(CostVerdict::Within(value)),
        None => {
            tracing::debug!(cost = %cost, "cost deferred until Fin arguments are known");
            Ok(CostVerdict::Deferred(cost.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{compile, compile_until};
    use crate::pass::PassId;

    #[test]
    fn addition_costs_three_nodes() {
        let state = compile("5 + 6", Architecture::default()).expect("compile");
        assert_eq!(state.verdict, Some(CostVerdict::Within(3)));
    }

    #[test]
    fn loop_multiplies_body_by_bound() {
        // for: 1, source List(..): call 1 + 3 literals, body block: 1 + binary 3
        let state = compile("for (x in List(1, 2, 3)) { x + 1 }", Architecture::default())
            .expect("compile");
        assert_eq!(state.verdict, Some(CostVerdict::Within(1 + 4 + 3 * 4)));
    }

    #[test]
    fn higher_order_call_prices_the_lambda() {
        let src = "def each(xs: List<Int, 3>, f: (Int) -> Int): Int {\n\
                     mutable n = 0\n\
                     for (x in xs) { n = n + f(x) }\n\
                     n\n\
                   }\n\
                   each(List(1, 2, 3), lambda (y: Int) -> y * y)";
        let cheap = compile(src, Architecture::default()).expect("compile");
        let src_costly = src.replace("y * y", "y * y * y * y");
        let costly = compile(&src_costly, Architecture::default()).expect("compile");
        let (Some(CostVerdict::Within(a)), Some(CostVerdict::Within(b))) =
            (cheap.verdict, costly.verdict)
        else {
            panic!("expected evaluable costs");
        };
        // two more multiplications per invocation, three invocations
        assert_eq!(b - a, 3 * 4);
    }

    #[test]
    fn multipliers_count_loop_nesting() {
        let src = "def grid(xs: List<Int, 4>, f: (Int) -> Int): Int {\n\
                     mutable n = 0\n\
                     for (x in xs) { for (y in xs) { n = n + f(y) } }\n\
                     n = n + f(0)\n\
                     n\n\
                   }";
        let state = compile(src, Architecture::default()).expect("compile");
        let id = state.symbols.lookup("grid").expect("grid");
        let info = state.symbols.def(id).and_then(|d| d.as_function()).expect("function");
        assert_eq!(info.multipliers, vec![CostExpr::ZERO, CostExpr::Fin(17)]);
    }

    #[test]
    fn callees_are_costed_before_callers() {
        let state = compile(
            "def quad(x: Int): Int { double(double(x)) }\ndef double(x: Int): Int { x * 2 }",
            Architecture::default(),
        )
        .expect("compile");
        let cost = |name: &str| {
            let id = state.symbols.lookup(name).expect(name);
            let info = state.symbols.def(id).and_then(|d| d.as_function()).expect("function");
            info.cost.as_ref().and_then(CostExpr::evaluate).expect("evaluable cost")
        };
        assert_eq!(cost("double"), 4);
        assert!(cost("quad") > 2 * cost("double"));
    }

    #[test]
    fn recursion_is_rejected_per_function() {
        let diags = compile_until(
            "def ping(x: Int): Int { pong(x) }\ndef pong(x: Int): Int { ping(x) }",
            PassId::FunctionCost,
        );
        let messages: Vec<String> = diags.iter().map(|d| d.message.clone()).collect();
        assert_eq!(
            messages,
            vec![
                "recursive function detected: ping".to_string(),
                "recursive function detected: pong".to_string()
            ]
        );
        assert!(diags.iter().all(|d| d.location == Location::NotInSource));
    }

    #[test]
    fn generic_unit_cost_is_deferred() {
        let state = compile(
            "def scan<#N>(xs: List<Int, N>): Int { mutable n = 0\n for (x in xs) { n = n + x }\n n }",
            Architecture::default(),
        )
        .expect("compile");
        let id = state.symbols.lookup("scan").expect("scan");
        let cost = state
            .symbols
            .def(id)
            .and_then(|d| d.as_function())
            .and_then(|f| f.cost.clone())
            .expect("cost");
        insta::assert_snapshot!(cost.to_string(), @"Sum(Mul(5, N), 6)");
    }

    #[test]
    fn ceiling_enforced() {
        let arch = Architecture::default().with_ceiling(2);
        let err = check_cost_limit(&CostExpr::Fin(3), &arch).unwrap_err();
        insta::assert_snapshot!(err.message, @"cost over limit: 3 exceeds 2");
        assert_eq!(
            check_cost_limit(&CostExpr::Fin(2), &arch),
            Ok(CostVerdict::Within(2))
        );
    }
}

// session.rs — Compilation session: artifacts, import graph, evaluation
//
// A session owns the platform unit and an append-only list of compiled
// units. Each unit compiles against the artifacts already in the session;
// `compile_all` orders a batch by its import graph first.
//
// Preconditions: plugin declarations in the registry are well formed.
// Postconditions: every stored artifact passed all eleven phases; artifacts
//   are never mutated after they are stored.
// Failure modes: compile diagnostics (`Failure::Compile`) or run-time errors
//   (`Failure::Runtime`).
// Side effects: emits `tracing` events.

use std::collections::BTreeMap;
use std::rc::Rc;

use thiserror::Error;

use crate::annot::Annotations;
use crate::arch::Architecture;
use crate::ast::{Expr, ExprKind, Ident, Program, Span, Stmt, StmtKind};
use crate::builtins::Platform;
use crate::cost::CostExpr;
use crate::costing::CostVerdict;
use crate::diag::{codes, Diagnostic, Location};
use crate::eval::Interpreter;
use crate::graph::DepGraph;
use crate::id::{DefId, NodeIdSource, UnitId};
use crate::parser::{parse, syntax_diagnostics};
use crate::pass::PassId;
use crate::pipeline::{compute_provenance, run_pipeline, CompilationState, Provenance, UnitEnv};
use crate::plugin::{PluginError, PluginRegistry};
use crate::symbols::SymbolTable;
use crate::transport::TransportValue;
use crate::types::Type;
use crate::value::{bug, RuntimeError, Value};

// ── Artifacts ──────────────────────────────────────────────────────────────

/// A compiled unit. Importers receive read-only views of its tables.
#[derive(Debug)]
pub struct Artifact {
    pub name: String,
    pub unit: UnitId,
    pub source: String,
    pub program: Rc<Program>,
    pub symbols: Rc<SymbolTable>,
    /// Direct imports first, then transitive ones.
    pub imports: Vec<Rc<SymbolTable>>,
    pub annotations: Annotations,
    pub record_graph: DepGraph<DefId>,
    pub record_order: Vec<DefId>,
    pub function_graph: DepGraph<DefId>,
    pub function_order: Vec<DefId>,
    pub tree_cost: Option<CostExpr>,
    pub verdict: Option<CostVerdict>,
    pub provenance: Provenance,
}

impl Artifact {
    fn from_state(state: CompilationState, source: &str) -> Self {
        let provenance = compute_provenance(source, &state.symbols);
        Self {
            name: state.name,
            unit: state.unit,
            source: source.to_string(),
            program: Rc::new(state.program),
            symbols: Rc::new(state.symbols),
            imports: state.imports,
            annotations: state.annotations,
            record_graph: state.record_graph,
            record_order: state.record_order,
            function_graph: state.function_graph,
            function_order: state.function_order,
            tree_cost: state.tree_cost,
            verdict: state.verdict,
            provenance,
        }
    }

    /// Definitions visible to importers: every top-level definition.
    pub fn exports(&self) -> impl Iterator<Item = DefId> + '_ {
        self.symbols.iter().map(|d| d.id)
    }

    /// The unit's evaluated cost, when it did not depend on Fin parameters.
    pub fn cost(&self) -> Option<u64> {
        match self.verdict {
            Some(CostVerdict::Within(n)) => Some(n),
            _ => None,
        }
    }

    /// Render diagnostics against this unit's source.
    pub fn render(&self, diags: &[Diagnostic]) -> String {
        diags
            .iter()
            .map(|d| d.render(&self.name, &self.source))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── Failures ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Failure {
    #[error("compilation failed with {} error(s)", .0.len())]
    Compile(Vec<Diagnostic>),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Diagnostics of one unit in a batch.
#[derive(Debug)]
pub struct UnitFailure {
    pub name: String,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Session ────────────────────────────────────────────────────────────────

pub struct Session {
    arch: Architecture,
    plugins: PluginRegistry,
    platform: Rc<Platform>,
    units: Vec<Rc<Artifact>>,
    next_unit: u16,
}

impl Session {
    pub fn new(arch: Architecture, plugins: PluginRegistry) -> Result<Self, PluginError> {
        let platform = Platform::new(&plugins)?;
        Ok(Self {
            arch,
            plugins,
            platform: Rc::new(platform),
            units: Vec::new(),
            next_unit: 1,
        })
    }

    pub fn arch(&self) -> &Architecture {
        &self.arch
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn units(&self) -> &[Rc<Artifact>] {
        &self.units
    }

    pub fn artifact(&self, name: &str) -> Option<&Rc<Artifact>> {
        self.units.iter().find(|a| a.name == name)
    }

    fn alloc_unit(&mut self) -> UnitId {
        let unit = UnitId(self.next_unit);
        self.next_unit += 1;
        unit
    }

    fn env(&self) -> UnitEnv {
        UnitEnv {
            platform: Rc::clone(&self.platform),
            arch: self.arch.clone(),
            available: self.units.clone(),
        }
    }

    /// Compile one unit. Its imports must already be in the session.
    pub fn compile(&mut self, name: &str, source: &str) -> Result<Rc<Artifact>, Vec<Diagnostic>> {
        let unit = self.alloc_unit();
        let program = parse_unit(source, unit)?;
        self.build(name, source, unit, program)
    }

    fn build(
        &mut self,
        name: &str,
        source: &str,
        unit: UnitId,
        program: Program,
    ) -> Result<Rc<Artifact>, Vec<Diagnostic>> {
        if self.artifact(name).is_some() {
            return Err(vec![Diagnostic::error(
                codes::E0101,
                Location::NotInSource,
                format!("unit '{}' already exists", name),
            )]);
        }
        let mut state = CompilationState::new(name, unit, program, self.env());
        if run_pipeline(&mut state, PassId::CostLimit, |_, _| {}).is_err() {
            return Err(state.diagnostics);
        }
        let artifact = Rc::new(Artifact::from_state(state, source));
        tracing::debug!(
            unit = %artifact.name,
            cost = ?artifact.verdict,
            fingerprint = %artifact.provenance.symbol_fingerprint_hex(),
            "compiled"
        );
        self.units.push(Rc::clone(&artifact));
        Ok(artifact)
    }

    /// Compile a batch of named units in import order. Units on an import
    /// cycle are reported and skipped; the rest still compile.
    pub fn compile_all(&mut self, units: &[(&str, &str)]) -> Result<Vec<Rc<Artifact>>, Vec<UnitFailure>> {
        let mut failures = Vec::new();
        let mut fail = |name: &str, diagnostics: Vec<Diagnostic>| {
            failures.push(UnitFailure {
                name: name.to_string(),
                diagnostics,
            })
        };
        let mut parsed: BTreeMap<usize, (UnitId, Program)> = BTreeMap::new();
        for (i, (name, source)) in units.iter().enumerate() {
            let unit = self.alloc_unit();
            match parse_unit(source, unit) {
                Ok(program) => {
                    parsed.insert(i, (unit, program));
                }
                Err(diags) => fail(name, diags),
            }
        }

        let index: BTreeMap<&str, usize> = units.iter().enumerate().map(|(i, (n, _))| (*n, i)).collect();
        let mut graph: DepGraph<usize> = DepGraph::new();
        for (i, (_, program)) in &parsed {
            graph.add_node(*i);
            for import in imports_of(program) {
                match index.get(import) {
                    Some(j) if j != i => graph.add_edge(*i, *j),
                    _ => {}
                }
            }
        }
        for i in graph.cycle_nodes() {
            let name = units[i].0;
            tracing::debug!(unit = name, "import cycle");
            fail(
                name,
                vec![Diagnostic::error(
                    codes::E0104,
                    Location::NotInSource,
                    format!("recursive namespace detected: {}", name),
                )],
            );
        }

        let mut artifacts = Vec::new();
        for i in graph.sorted().order {
            let Some((unit, program)) = parsed.remove(&i) else {
                continue;
            };
            let (name, source) = units[i];
            match self.build(name, source, unit, program) {
                Ok(a) => artifacts.push(a),
                Err(diags) => fail(name, diags),
            }
        }
        if failures.is_empty() {
            Ok(artifacts)
        } else {
            Err(failures)
        }
    }

    /// Evaluate a compiled unit's top-level statements.
    pub fn evaluate(&self, artifact: &Artifact) -> Result<Value, RuntimeError> {
        let mut interp = Interpreter::new(&self.platform, &self.plugins, self.units.iter().map(|a| &**a));
        interp.run(artifact)
    }

    /// Compile and evaluate one unit.
    pub fn run(&mut self, name: &str, source: &str) -> Result<Value, Failure> {
        let artifact = self.compile(name, source).map_err(Failure::Compile)?;
        Ok(self.evaluate(&artifact)?)
    }

    /// Call `function` from a compiled unit again with fresh arguments.
    ///
    /// Builds a one-call unit that imports `artifact`, type checks it, then
    /// replays the callee's stored cost through the call's instantiation
    /// before evaluating. An over-limit replayed cost is a run-time error.
    pub fn invoke(
        &mut self,
        artifact: &Artifact,
        function: &str,
        args: &[TransportValue],
    ) -> Result<Value, Failure> {
        let unit = self.alloc_unit();
        let params = artifact
            .symbols
            .lookup(function)
            .and_then(|id| artifact.symbols.def(id))
            .and_then(|d| d.as_function())
            .map(|f| f.params.clone())
            .unwrap_or_default();
        let program = call_unit(unit, &artifact.name, function, args, &params)?;
        let mut state = CompilationState::new("<invoke>", unit, program, self.env());
        if run_pipeline(&mut state, PassId::TreeCost, |_, _| {}).is_err() {
            return Err(Failure::Compile(state.diagnostics));
        }

        let total = state.tree_cost.clone().unwrap_or(CostExpr::ZERO);
        let cost = total
            .evaluate()
            .ok_or_else(|| bug(format!("invocation cost {} is not concrete", total)))?;
        tracing::debug!(
            function,
            cost,
            limit = self.arch.cost_upper_limit,
            "deferred cost check"
        );
        if cost > self.arch.cost_upper_limit {
            return Err(RuntimeError::CostLimitExceeded {
                cost,
                limit: self.arch.cost_upper_limit,
            }
            .into());
        }

        let call = Artifact::from_state(state, "");
        let mut interp = Interpreter::new(&self.platform, &self.plugins, self.units.iter().map(|a| &**a));
        Ok(interp.run(&call)?)
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn parse_unit(source: &str, unit: UnitId) -> Result<Program, Vec<Diagnostic>> {
    let result = parse(source, unit);
    if !result.errors.is_empty() {
        return Err(syntax_diagnostics(&result.errors));
    }
    result.program.ok_or_else(|| {
        vec![Diagnostic::error(
            codes::E0001,
            Location::NotInSource,
            "syntax error: empty parse",
        )]
    })
}

fn imports_of(program: &Program) -> impl Iterator<Item = &str> {
    program.statements.iter().filter_map(|s| match &s.kind {
        StmtKind::Import(name) => Some(name.name.as_str()),
        _ => None,
    })
}

/// `import <unit>; <function>(<args>)`. `params` are the callee's declared
/// parameter types, used to write out empty collections.
fn call_unit(
    unit: UnitId,
    import: &str,
    function: &str,
    args: &[TransportValue],
    params: &[Type],
) -> Result<Program, Failure> {
    let ids = NodeIdSource::new(unit);
    let span: Span = (0..0).into();
    let args = args
        .iter()
        .enumerate()
        .map(|(i, a)| a.to_expr(&ids, span, params.get(i)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            Failure::Compile(vec![Diagnostic::error(
                codes::E0200,
                Location::NotInSource,
                e.to_string(),
            )])
        })?;
    let call = Expr {
        id: ids.next(),
        kind: ExprKind::Call {
            callee: Ident::new(function, span),
            type_args: Vec::new(),
            args,
        },
        span,
    };
    let statements = vec![
        Stmt {
            id: ids.next(),
            kind: StmtKind::Import(Ident::new(import, span)),
            span,
        },
        Stmt {
            id: ids.next(),
            kind: StmtKind::Expr(call),
            span,
        },
    ];
    Ok(Program { statements, span })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(Architecture::default(), PluginRegistry::standard()).expect("session")
    }

    fn codes_of(diags: &[Diagnostic]) -> Vec<&'static str> {
        diags.iter().filter_map(|d| d.code.map(|c| c.0)).collect()
    }

    #[test]
    fn imported_functions_are_callable() {
        let mut s = session();
        s.compile("lib", "def double(x: Int): Int { x * 2 }").expect("lib");
        let main = s.compile("main", "import lib\ndouble(21)").expect("main");
        assert_eq!(s.evaluate(&main).expect("run"), Value::Int(42));
    }

    #[test]
    fn duplicate_unit_names_rejected() {
        let mut s = session();
        s.compile("a", "1").expect("a");
        let err = s.compile("a", "2").unwrap_err();
        assert_eq!(codes_of(&err), vec!["E0101"]);
    }

    #[test]
    fn batch_is_compiled_in_import_order() {
        let mut s = session();
        let artifacts = s
            .compile_all(&[
                ("main", "import util\nhalf(8)"),
                ("util", "import base\ndef half(x: Int): Int { x / two() }"),
                ("base", "def two(): Int { 2 }"),
            ])
            .expect("batch");
        let names: Vec<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["base", "util", "main"]);
        let main = s.artifact("main").cloned().expect("main");
        assert_eq!(s.evaluate(&main).expect("run"), Value::Int(4));
    }

    #[test]
    fn import_cycle_reported_per_unit() {
        let mut s = session();
        let err = s
            .compile_all(&[("a", "import b\n1"), ("b", "import a\n2"), ("c", "3")])
            .unwrap_err();
        let cycles: Vec<String> = err
            .iter()
            .flat_map(|f| &f.diagnostics)
            .filter(|d| d.code == Some(codes::E0104))
            .map(|d| d.message.clone())
            .collect();
        assert_eq!(
            cycles,
            vec!["recursive namespace detected: a", "recursive namespace detected: b"]
        );
        assert!(s.artifact("c").is_some());
    }

    #[test]
    fn syntax_errors_stop_before_binding() {
        let mut s = session();
        let err = s.compile("main", "val = ").unwrap_err();
        assert!(codes_of(&err).iter().all(|c| *c == "E0001"));
    }

    #[test]
    fn invoke_replays_generic_cost() {
        let mut s = session();
        let lib = s
            .compile(
                "lib",
                "def total2<#N>(xs: List<Int, N>): Int { mutable n = 0\n for (x in xs) { n = n + x }\n n }",
            )
            .expect("lib");
        let args = [TransportValue::List(vec![
            TransportValue::Int(1),
            TransportValue::Int(2),
            TransportValue::Int(3),
        ])];
        assert_eq!(s.invoke(&lib, "total2", &args).expect("invoke"), Value::Int(6));

        let mut tight = Session::new(Architecture::default().with_ceiling(20), PluginRegistry::standard())
            .expect("session");
        let lib = tight.compile("lib", &lib.source).expect("lib");
        let many: Vec<TransportValue> = (0..10).map(TransportValue::Int).collect();
        let err = tight
            .invoke(&lib, "total2", &[TransportValue::List(many)])
            .unwrap_err();
        assert!(matches!(
            err,
            Failure::Runtime(RuntimeError::CostLimitExceeded { limit: 20, .. })
        ));
    }

    #[test]
    fn invoke_accepts_empty_collections() {
        let mut s = session();
        let lib = s
            .compile(
                "lib",
                "def total2<#N>(xs: List<Int, N>): Int { mutable n = 0\n for (x in xs) { n = n + x }\n n }\n\
                 def keys<#N>(d: Dictionary<Char, Int, N>): Int { d.size() }",
            )
            .expect("lib");
        assert_eq!(
            s.invoke(&lib, "total2", &[TransportValue::List(Vec::new())]).expect("invoke"),
            Value::Int(0)
        );
        assert_eq!(
            s.invoke(&lib, "keys", &[TransportValue::Dictionary(Vec::new())]).expect("invoke"),
            Value::Int(0)
        );
    }

    #[test]
    fn artifacts_record_provenance() {
        let mut a = session();
        let mut b = session();
        let src = "record P(x: Int)\ndef f(p: P): Int { p.x }";
        let x = a.compile("m", src).expect("a");
        let y = b.compile("m", src).expect("b");
        assert_eq!(x.provenance, y.provenance);
        assert_eq!(x.exports().count(), 2);
    }
}

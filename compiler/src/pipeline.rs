// pipeline.rs — Compilation state and pass orchestration
//
// Holds every pass artifact of one unit and runs the minimal set of passes
// for a given terminal PassId. Parsing happens before the runner; the
// session turns a finished state into an immutable `Artifact`.
//
// Preconditions: the unit parsed without syntax errors; every unit it
//   imports is among `UnitEnv::available`.
// Postconditions: artifacts for all passes in `required_passes(terminal)`
//   are populated, or `has_error` is set.
// Failure modes: any pass emitting error-level diagnostics.
// Side effects: calls on_pass_complete after each pass; emits a tracing
//   event per pass.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::annot::Annotations;
use crate::arch::Architecture;
use crate::ast::Program;
use crate::bans::check_bans;
use crate::builtins::Platform;
use crate::check::check;
use crate::cost::CostExpr;
use crate::costing::{
    check_cost_limit, cost_functions, function_graph, infer_multipliers, tree_cost, CostContext,
    CostVerdict,
};
use crate::diag::{has_errors, Diagnostic};
use crate::graph::DepGraph;
use crate::id::{DefId, UnitId};
use crate::pass::{descriptor, required_passes, PassId};
use crate::resolve::{bind, Declarations, ImportContext};
use crate::scan::{check_record_cycles, record_graph, scan_params, scan_symbols, ParamMap, ScanContext};
use crate::session::Artifact;
use crate::symbols::{SymbolTable, SymbolView};
use crate::typeck::{propagate, PropagateContext};

// ── Artifact storage ───────────────────────────────────────────────────────

/// What a unit is compiled against.
#[derive(Clone)]
pub struct UnitEnv {
    pub platform: Rc<Platform>,
    pub arch: Architecture,
    /// Units compiled earlier in the session, importable by name.
    pub available: Vec<Rc<Artifact>>,
}

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub name: String,
    pub unit: UnitId,
    pub program: Program,
    pub env: UnitEnv,
    pub decls: Declarations,
    /// Imported tables: direct imports first, then what they import.
    pub imports: Vec<Rc<SymbolTable>>,
    pub params: ParamMap,
    pub record_graph: DepGraph<DefId>,
    pub record_order: Vec<DefId>,
    pub symbols: SymbolTable,
    pub annotations: Annotations,
    pub function_graph: DepGraph<DefId>,
    pub function_order: Vec<DefId>,
    pub tree_cost: Option<CostExpr>,
    pub verdict: Option<CostVerdict>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
}

impl CompilationState {
    pub fn new(name: &str, unit: UnitId, program: Program, env: UnitEnv) -> Self {
        Self {
            name: name.to_string(),
            unit,
            program,
            env,
            decls: Declarations {
                table: SymbolTable::new(unit),
                by_name: BTreeMap::new(),
                items: Vec::new(),
            },
            imports: Vec::new(),
            params: ParamMap::new(),
            record_graph: DepGraph::new(),
            record_order: Vec::new(),
            symbols: SymbolTable::new(unit),
            annotations: Annotations::new(),
            function_graph: DepGraph::new(),
            function_order: Vec::new(),
            tree_cost: None,
            verdict: None,
            diagnostics: Vec::new(),
            has_error: false,
        }
    }

    pub fn view(&self) -> SymbolView<'_> {
        SymbolView {
            local: &self.symbols,
            imports: &self.imports,
            platform: &self.env.platform.table,
        }
    }

    /// Artifacts of the units whose tables this unit imports.
    fn imported(&self) -> impl Iterator<Item = &Rc<Artifact>> + '_ {
        self.env
            .available
            .iter()
            .filter(|a| self.imports.iter().any(|t| t.unit == a.unit))
    }
}

/// Provenance metadata for reproducible builds and cache keys.
///
/// `source_hash`: SHA-256 of the raw source text.
/// `symbol_fingerprint`: SHA-256 of the canonical symbol-table dump, which
/// includes every signature and function cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    #[serde(serialize_with = "serialize_hex")]
    pub source_hash: [u8; 32],
    #[serde(serialize_with = "serialize_hex")]
    pub symbol_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    /// Hex string of the symbol fingerprint (64 characters).
    pub fn symbol_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.symbol_fingerprint)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

fn serialize_hex<S: serde::Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&bytes_to_hex(bytes))
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(text: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from source text and the finished symbol table.
pub fn compute_provenance(source: &str, symbols: &SymbolTable) -> Provenance {
    Provenance {
        source_hash: sha256(source),
        symbol_fingerprint: sha256(&symbols.to_string()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
}

/// Per-pass post-processing: callback, accumulate, log, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    tracing::debug!(
        unit = %state.name,
        pass = descriptor(pass_id).name,
        diagnostics = diags.len(),
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "pass complete"
    );
    let is_err = has_errors(&diags);
    state.diagnostics.extend(diags);
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → log → error check.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        let t = Instant::now();
        let diags = run_pass(state, pass_id);
        finish_pass(state, pass_id, diags, t.elapsed(), &mut on_pass_complete)?;
    }
    Ok(())
}

fn run_pass(state: &mut CompilationState, pass_id: PassId) -> Vec<Diagnostic> {
    let platform = Rc::clone(&state.env.platform);
    match pass_id {
        PassId::Bind => {
            let available: Vec<(String, Rc<SymbolTable>)> = state
                .env
                .available
                .iter()
                .map(|a| (a.name.clone(), Rc::clone(&a.symbols)))
                .collect();
            let ctx = ImportContext {
                own_name: &state.name,
                available: &available,
                platform: &platform.table,
            };
            let result = bind(&state.program, state.unit, &ctx);
            state.decls = result.decls;
            state.annotations.bindings = result.bindings;
            state.imports = result.imports;
            let transitive: Vec<Rc<SymbolTable>> = state
                .imported()
                .flat_map(|a| a.imports.iter().cloned())
                .collect();
            for table in transitive {
                if !state.imports.iter().any(|t| t.unit == table.unit) {
                    state.imports.push(table);
                }
            }
            result.diagnostics
        }
        PassId::ParamScan => {
            let (params, diags) = scan_params(&state.decls);
            state.params = params;
            diags
        }
        PassId::RecordCycle => {
            let mut graph = record_graph(&state.decls, &state.params);
            for artifact in state.imported() {
                graph.merge(&artifact.record_graph);
            }
            let (sorted, diags) = check_record_cycles(&state.decls, &graph);
            state.record_graph = graph;
            state.record_order = sorted.order;
            diags
        }
        PassId::SymbolScan => {
            let ctx = ScanContext {
                imports: &state.imports,
                platform: &platform.table,
            };
            let (table, diags) = scan_symbols(
                state.decls.table.clone(),
                &state.decls,
                &state.params,
                &state.record_order,
                &ctx,
            );
            state.symbols = table;
            diags
        }
        PassId::Propagate => {
            let ctx = PropagateContext {
                platform: &platform,
                imports: &state.imports,
            };
            propagate(&state.program, &mut state.symbols, &mut state.annotations, &ctx)
        }
        PassId::Check => check(&state.program, state.view(), &state.annotations),
        PassId::Bans => check_bans(&state.program, state.view(), &state.annotations),
        PassId::Multipliers => {
            infer_multipliers(&mut state.symbols, &state.annotations);
            Vec::new()
        }
        PassId::FunctionCost => {
            let mut graph = function_graph(&state.symbols, &state.annotations);
            for artifact in state.imported() {
                graph.merge(&artifact.function_graph);
            }
            let ctx = CostContext {
                arch: &state.env.arch,
                platform: &platform,
                imports: &state.imports,
            };
            let diags = cost_functions(&graph, &mut state.symbols, &mut state.annotations, &ctx);
            state.function_order = graph
                .sorted()
                .order
                .into_iter()
                .filter(|d| d.unit == state.unit)
                .collect();
            state.function_graph = graph;
            diags
        }
        PassId::TreeCost => {
            let ctx = CostContext {
                arch: &state.env.arch,
                platform: &platform,
                imports: &state.imports,
            };
            let (cost, diags) =
                tree_cost(&state.program, &state.symbols, &mut state.annotations, &ctx);
            tracing::debug!(unit = %state.name, cost = %cost, "tree cost");
            state.tree_cost = Some(cost);
            diags
        }
        PassId::CostLimit => {
            let cost = state.tree_cost.clone().unwrap_or(CostExpr::ZERO);
            match check_cost_limit(&cost, &state.env.arch) {
                Ok(verdict) => {
                    state.verdict = Some(verdict);
                    Vec::new()
                }
                Err(diag) => vec![diag],
            }
        }
    }
}

// pass.rs — Pass descriptors: metadata, dependency resolution, artifact IDs
//
// Declares the eleven semantic passes (parsing happens before the runner),
// their dependency edges, and the artifacts they produce. The pipeline
// runner uses `required_passes` to run the minimal prefix for a terminal
// pass, which is also how the tests stop after a given phase.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each compiler pass (parsing happens before the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassId {
    Bind,
    ParamScan,
    RecordCycle,
    SymbolScan,
    Propagate,
    Check,
    Bans,
    Multipliers,
    FunctionCost,
    TreeCost,
    CostLimit,
}

/// Machine-readable artifact identifiers. Each maps to a field of the
/// compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Declarations, // resolve::Declarations
    Bindings,     // Annotations::bindings
    Imports,      // imported symbol tables
    Params,       // scan::ParamMap
    RecordOrder,  // record graph + topological order
    Symbols,      // SymbolTable
    Types,        // Annotations::{types, calls, dots, signatures, cases}
    Multipliers,  // FunctionInfo::multipliers
    FunctionGraph,
    FunctionCosts, // FunctionInfo::cost + Annotations::costs
    TreeCost,
    Verdict, // costing::CostVerdict
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a compiler pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// What holds once the pass succeeds (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Bind => PassDescriptor {
            name: "bind",
            inputs: &[],
            outputs: &[
                ArtifactId::Declarations,
                ArtifactId::Bindings,
                ArtifactId::Imports,
            ],
            invariants: "every name in expression position is bound; imports resolved",
        },
        PassId::ParamScan => PassDescriptor {
            name: "param_scan",
            inputs: &[PassId::Bind],
            outputs: &[ArtifactId::Params],
            invariants: "each generic definition has its type parameters",
        },
        PassId::RecordCycle => PassDescriptor {
            name: "record_cycle",
            inputs: &[PassId::ParamScan],
            outputs: &[ArtifactId::RecordOrder],
            invariants: "record and sum dependencies are acyclic",
        },
        PassId::SymbolScan => PassDescriptor {
            name: "symbol_scan",
            inputs: &[PassId::RecordCycle],
            outputs: &[ArtifactId::Symbols],
            invariants: "every declaration has a definition with resolved types",
        },
        PassId::Propagate => PassDescriptor {
            name: "propagate",
            inputs: &[PassId::SymbolScan],
            outputs: &[ArtifactId::Types],
            invariants: "every expression has a type; every call has a target",
        },
        PassId::Check => PassDescriptor {
            name: "check",
            inputs: &[PassId::Propagate],
            outputs: &[],
            invariants: "arguments, assignments and conditions are well typed",
        },
        PassId::Bans => PassDescriptor {
            name: "bans",
            inputs: &[PassId::Check],
            outputs: &[],
            invariants: "function values only appear as direct arguments",
        },
        PassId::Multipliers => PassDescriptor {
            name: "multipliers",
            inputs: &[PassId::Bans],
            outputs: &[ArtifactId::Multipliers],
            invariants: "each function parameter has an invocation count",
        },
        PassId::FunctionCost => PassDescriptor {
            name: "function_cost",
            inputs: &[PassId::Multipliers],
            outputs: &[ArtifactId::FunctionGraph, ArtifactId::FunctionCosts],
            invariants: "no recursion; every function has a body cost",
        },
        PassId::TreeCost => PassDescriptor {
            name: "tree_cost",
            inputs: &[PassId::FunctionCost],
            outputs: &[ArtifactId::TreeCost],
            invariants: "the unit's top-level cost is known",
        },
        PassId::CostLimit => PassDescriptor {
            name: "cost_limit",
            inputs: &[PassId::TreeCost],
            outputs: &[ArtifactId::Verdict],
            invariants: "an evaluable unit cost is within the ceiling",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 11] = [
    PassId::Bind,
    PassId::ParamScan,
    PassId::RecordCycle,
    PassId::SymbolScan,
    PassId::Propagate,
    PassId::Check,
    PassId::Bans,
    PassId::Multipliers,
    PassId::FunctionCost,
    PassId::TreeCost,
    PassId::CostLimit,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

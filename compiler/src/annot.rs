// annot.rs — Per-unit side tables filled by the semantic phases
//
// The AST is never mutated after parsing. Each phase writes its results
// into one of these tables, keyed by the `NodeId` of the node it describes:
//
//   Bind       → bindings
//   Propagate  → types, local_types, calls, dots, signatures, cases
//   cost passes → costs
//
// Local declarations are keyed by the declaring node: a `val` statement, a
// parameter, a `for` expression (its binder), or a match case (its binder).
//
// Preconditions: none (data-only module).
// Postconditions: none.
// Failure modes: none.
// Side effects: none.

use std::collections::HashMap;

use crate::builtins::{BuiltinKind, MemberSig};
use crate::cost::CostExpr;
use crate::id::{DefId, NodeId};
use crate::subst::Instantiation;
use crate::types::{FunctionType, Type};

/// What a name in expression position refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Local { decl: NodeId, mutable: bool },
    Global(DefId),
}

/// The resolved target of a call expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    /// Invoking a function-typed parameter.
    FormalParam { decl: NodeId },
    /// A user function; `inst` holds the (possibly empty) type arguments.
    Function { def: DefId, inst: Instantiation },
    /// Construction of a built-in collection.
    Builtin {
        kind: BuiltinKind,
        inst: Instantiation,
    },
    Plugin { def: DefId, inst: Instantiation },
    /// Construction of a record or sum member record.
    Record { inst: Instantiation },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DotTarget {
    Field { index: usize },
    Member(MemberSig),
}

#[derive(Debug, Clone, Default)]
pub struct Annotations {
    pub bindings: HashMap<NodeId, Binding>,
    /// Expression and block types.
    pub types: HashMap<NodeId, Type>,
    /// Types of local declarations.
    pub local_types: HashMap<NodeId, Type>,
    pub calls: HashMap<NodeId, CallTarget>,
    /// Instantiated signature per call or member call, for argument checks.
    pub signatures: HashMap<NodeId, FunctionType>,
    pub dots: HashMap<NodeId, DotTarget>,
    /// Member definition selected by each match case.
    pub cases: HashMap<NodeId, DefId>,
    pub costs: HashMap<NodeId, CostExpr>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_of(&self, node: NodeId) -> &Type {
        self.types.get(&node).unwrap_or(&Type::Error)
    }

    pub fn local_type(&self, decl: NodeId) -> &Type {
        self.local_types.get(&decl).unwrap_or(&Type::Error)
    }

    pub fn cost_of(&self, node: NodeId) -> CostExpr {
        self.costs.get(&node).cloned().unwrap_or(CostExpr::ZERO)
    }
}

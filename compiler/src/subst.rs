// subst.rs — Substitutions and instantiation chains
//
// A `Substitution` maps type parameters to arguments for one instantiation
// event. A `SubstChain` is the persistent history of such events back to the
// original parameterized definition (the terminus). Replaying a chain on a
// type or cost expression from the definition's parameter space applies the
// parent chain first and the link's own substitution last.
//
// Chains are shared between the type checker and the evaluator: call
// targets store an `Instantiation`, and the evaluator replays it at run time
// to recover concrete Fin bounds.
//
// Preconditions: arguments passed to `Instantiation::apply` match the
//   terminus parameters in arity and kind.
// Postconditions: `apply(t, args).args() == args` (after collapsing).
// Failure modes: arity or kind mismatch → `SubstError`.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::cost::{structural_hash_cost, CostExpr};
use crate::id::{DefId, TypeParamId};
use crate::types::{FunctionType, Terminus, Type, TypeArg, TypeParam};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubstError {
    #[error("{name} expects {expected} type argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("type argument {index} of {name} has the wrong kind")]
    Kind { name: String, index: usize },
    #[error("type parameter {param} of {name} has no argument")]
    Missing { name: String, param: String },
}

// ── Substitution ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    entries: BTreeMap<TypeParamId, (TypeParam, TypeArg)>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair `params` with `args` positionally. Lengths must already match.
    pub fn zip(params: &[TypeParam], args: Vec<TypeArg>) -> Self {
        let mut subst = Self::new();
        for (p, a) in params.iter().zip(args) {
            subst.insert(p, a);
        }
        subst
    }

    pub fn insert(&mut self, param: &TypeParam, arg: TypeArg) {
        self.entries.insert(param.id, (param.clone(), arg));
    }

    pub fn get(&self, id: &TypeParamId) -> Option<&TypeArg> {
        self.entries.get(id).map(|(_, arg)| arg)
    }

    pub fn contains(&self, id: &TypeParamId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TypeParam, &TypeArg)> {
        self.entries.values().map(|(p, a)| (p, a))
    }

    pub fn apply_type(&self, ty: &Type) -> Type {
        if self.is_empty() {
            return ty.clone();
        }
        match ty {
            Type::Basic(_) | Type::Object { .. } | Type::Error => ty.clone(),
            Type::Param(p) => match self.get(&p.id) {
                Some(TypeArg::Type(t)) => t.clone(),
                _ => ty.clone(),
            },
            Type::Function(f) => Type::Function(Rc::new(self.apply_function(f))),
            Type::Instance(inst) => Type::Instance(self.apply_instance(inst)),
        }
    }

    pub fn apply_function(&self, f: &FunctionType) -> FunctionType {
        FunctionType {
            params: f.params.iter().map(|p| self.apply_type(p)).collect(),
            ret: self.apply_type(&f.ret),
        }
    }

    /// Hash placeholders are rewritten into structural costs once their
    /// parameter is bound to a type.
    pub fn apply_cost(&self, cost: &CostExpr) -> CostExpr {
        if self.is_empty() {
            return cost.clone();
        }
        let applied = match cost {
            CostExpr::Fin(_) => cost.clone(),
            CostExpr::Param(p) => match self.get(&p.id) {
                Some(TypeArg::Fin(c)) => c.clone(),
                _ => cost.clone(),
            },
            CostExpr::Sum(items) => CostExpr::sum(items.iter().map(|c| self.apply_cost(c))),
            CostExpr::Product(items) => {
                CostExpr::product(items.iter().map(|c| self.apply_cost(c)))
            }
            CostExpr::Max(items) => CostExpr::max(items.iter().map(|c| self.apply_cost(c))),
            CostExpr::HashOfParam(p) => match self.get(&p.id) {
                Some(TypeArg::Type(t)) => structural_hash_cost(t),
                _ => cost.clone(),
            },
            CostExpr::HashOfInstance(inst) => {
                structural_hash_cost(&Type::Instance(self.apply_instance(inst)))
            }
        };
        applied.collapse()
    }

    pub fn apply_arg(&self, arg: &TypeArg) -> TypeArg {
        match arg {
            TypeArg::Type(t) => TypeArg::Type(self.apply_type(t)),
            TypeArg::Fin(c) => TypeArg::Fin(self.apply_cost(c)),
        }
    }

    /// Extend `inst` only if this substitution binds one of its free
    /// parameters; untouched instances are shared as-is.
    pub fn apply_instance(&self, inst: &Instantiation) -> Instantiation {
        if inst.free_params().keys().any(|id| self.contains(id)) {
            inst.extend(self.clone())
        } else {
            inst.clone()
        }
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (p, a)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} := {}", p.name, a)?;
        }
        write!(f, "}}")
    }
}

// ── Substitution chain ─────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SubstChain {
    Terminus(Rc<Terminus>),
    Link {
        subst: Rc<Substitution>,
        parent: Rc<SubstChain>,
    },
}

impl SubstChain {
    pub fn terminus(&self) -> &Rc<Terminus> {
        let mut chain = self;
        loop {
            match chain {
                SubstChain::Terminus(t) => return t,
                SubstChain::Link { parent, .. } => chain = parent,
            }
        }
    }

    /// Number of links above the terminus.
    pub fn depth(&self) -> usize {
        match self {
            SubstChain::Terminus(_) => 0,
            SubstChain::Link { parent, .. } => 1 + parent.depth(),
        }
    }

    pub fn replay_type(&self, ty: &Type) -> Type {
        match self {
            SubstChain::Terminus(_) => ty.clone(),
            SubstChain::Link { subst, parent } => subst.apply_type(&parent.replay_type(ty)),
        }
    }

    pub fn replay_cost(&self, cost: &CostExpr) -> CostExpr {
        match self {
            SubstChain::Terminus(_) => cost.clone(),
            SubstChain::Link { subst, parent } => subst.apply_cost(&parent.replay_cost(cost)),
        }
    }

    pub fn replay_arg(&self, arg: &TypeArg) -> TypeArg {
        match arg {
            TypeArg::Type(t) => TypeArg::Type(self.replay_type(t)),
            TypeArg::Fin(c) => TypeArg::Fin(self.replay_cost(c)),
        }
    }
}

// ── Instantiation ──────────────────────────────────────────────────────────

/// A parameterized definition paired with arguments for all its parameters.
#[derive(Debug, Clone)]
pub struct Instantiation {
    chain: Rc<SubstChain>,
}

impl Instantiation {
    /// Start a chain at `terminus` with one substitution built from `args`.
    pub fn apply(terminus: Rc<Terminus>, args: Vec<TypeArg>) -> Result<Self, SubstError> {
        if args.len() != terminus.params.len() {
            return Err(SubstError::Arity {
                name: terminus.name.to_string(),
                expected: terminus.params.len(),
                found: args.len(),
            });
        }
        for (index, (p, a)) in terminus.params.iter().zip(&args).enumerate() {
            if p.kind != a.kind() {
                return Err(SubstError::Kind {
                    name: terminus.name.to_string(),
                    index,
                });
            }
        }
        let subst = Substitution::zip(&terminus.params, args);
        Ok(Self {
            chain: Rc::new(SubstChain::Link {
                subst: Rc::new(subst),
                parent: Rc::new(SubstChain::Terminus(terminus)),
            }),
        })
    }

    /// Build from a resolved substitution that must cover every parameter.
    pub fn from_substitution(
        terminus: Rc<Terminus>,
        subst: &Substitution,
    ) -> Result<Self, SubstError> {
        let mut args = Vec::with_capacity(terminus.params.len());
        for p in &terminus.params {
            match subst.get(&p.id) {
                Some(a) => args.push(a.clone()),
                None => {
                    return Err(SubstError::Missing {
                        name: terminus.name.to_string(),
                        param: p.name.to_string(),
                    })
                }
            }
        }
        Self::apply(terminus, args)
    }

    /// A definition used with its own parameters as arguments, as seen from
    /// inside its body.
    pub fn identity(terminus: Rc<Terminus>) -> Self {
        Self {
            chain: Rc::new(SubstChain::Terminus(terminus)),
        }
    }

    /// Extend this chain with another link instead of restarting it.
    pub fn extend(&self, subst: Substitution) -> Self {
        Self {
            chain: Rc::new(SubstChain::Link {
                subst: Rc::new(subst),
                parent: Rc::clone(&self.chain),
            }),
        }
    }

    pub fn chain(&self) -> &SubstChain {
        &self.chain
    }

    pub fn terminus(&self) -> &Terminus {
        self.chain.terminus()
    }

    pub fn def(&self) -> DefId {
        self.terminus().def
    }

    /// The replayed argument list, in terminus parameter order.
    pub fn args(&self) -> Vec<TypeArg> {
        self.terminus()
            .params
            .iter()
            .map(|p| self.arg_for(p))
            .collect()
    }

    pub fn arg(&self, index: usize) -> Option<TypeArg> {
        self.terminus().params.get(index).map(|p| self.arg_for(p))
    }

    fn arg_for(&self, p: &TypeParam) -> TypeArg {
        if p.is_fin() {
            TypeArg::Fin(self.chain.replay_cost(&CostExpr::Param(p.clone())))
        } else {
            TypeArg::Type(self.chain.replay_type(&Type::Param(p.clone())))
        }
    }

    /// The flattened substitution from terminus parameters to replayed args.
    pub fn substitution(&self) -> Substitution {
        Substitution::zip(&self.terminus().params, self.args())
    }

    pub fn replay_type(&self, ty: &Type) -> Type {
        self.chain.replay_type(ty)
    }

    pub fn replay_cost(&self, cost: &CostExpr) -> CostExpr {
        self.chain.replay_cost(cost)
    }

    pub fn free_params(&self) -> BTreeMap<TypeParamId, TypeParam> {
        let mut out = BTreeMap::new();
        for arg in self.args() {
            arg.collect_params(&mut out);
        }
        out
    }
}

impl PartialEq for Instantiation {
    fn eq(&self, other: &Self) -> bool {
        self.def() == other.def() && self.args() == other.args()
    }
}

impl fmt::Display for Instantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terminus = self.terminus();
        write!(f, "{}", terminus.name)?;
        let args = self.args();
        if !args.is_empty() {
            write!(f, "<")?;
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", a)?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BuiltinKind;
    use crate::id::UnitId;
    use crate::types::{ParamKind, TerminusKind};

    fn def(index: u32) -> DefId {
        DefId {
            unit: UnitId(1),
            index,
        }
    }

    fn pair_terminus() -> Rc<Terminus> {
        let a = TypeParam::new(def(10), 0, "A", ParamKind::Standard);
        let b = TypeParam::new(def(10), 1, "B", ParamKind::Standard);
        Rc::new(Terminus {
            def: def(10),
            name: "Pair".into(),
            hash_cost: CostExpr::sum([
                CostExpr::HashOfParam(a.clone()),
                CostExpr::HashOfParam(b.clone()),
            ]),
            params: vec![a, b],
            kind: TerminusKind::Record { sum: None },
        })
    }

    #[test]
    fn apply_round_trips_args() {
        let t = BuiltinKind::List.terminus(def(0));
        let args = vec![TypeArg::Type(Type::INT), TypeArg::Fin(CostExpr::Fin(3))];
        let inst = Instantiation::apply(t, args.clone()).expect("apply");
        assert_eq!(inst.args(), args);
        assert_eq!(inst.to_string(), "List<Int, 3>");
    }

    #[test]
    fn arity_and_kind_checked() {
        let t = BuiltinKind::List.terminus(def(0));
        let err = Instantiation::apply(t.clone(), vec![TypeArg::Type(Type::INT)]).unwrap_err();
        assert!(matches!(err, SubstError::Arity { expected: 2, found: 1, .. }));
        let err = Instantiation::apply(
            t,
            vec![TypeArg::Fin(CostExpr::ONE), TypeArg::Fin(CostExpr::ONE)],
        )
        .unwrap_err();
        assert!(matches!(err, SubstError::Kind { index: 0, .. }));
    }

    #[test]
    fn nested_generic_replays_through_outer_substitution() {
        // Inside `def f<#N>(..)`, `List<String<N>, 2>`; then f is called with N := 4.
        let n = TypeParam::new(def(20), 0, "N", ParamKind::Fin);
        let string = Instantiation::apply(
            BuiltinKind::String.terminus(def(1)),
            vec![TypeArg::Fin(CostExpr::Param(n.clone()))],
        )
        .expect("string");
        let list = Instantiation::apply(
            BuiltinKind::List.terminus(def(0)),
            vec![
                TypeArg::Type(Type::Instance(string)),
                TypeArg::Fin(CostExpr::Fin(2)),
            ],
        )
        .expect("list");
        assert_eq!(list.to_string(), "List<String<N>, 2>");

        let mut outer = Substitution::new();
        outer.insert(&n, TypeArg::Fin(CostExpr::Fin(4)));
        let replayed = outer.apply_instance(&list);
        assert_eq!(replayed.to_string(), "List<String<4>, 2>");
        assert_eq!(replayed.chain().depth(), 2);
        assert_eq!(
            structural_hash_cost(&Type::Instance(replayed)),
            CostExpr::Fin(8)
        );
    }

    #[test]
    fn untouched_instances_are_not_extended() {
        let list = Instantiation::apply(
            BuiltinKind::List.terminus(def(0)),
            vec![TypeArg::Type(Type::INT), TypeArg::Fin(CostExpr::Fin(2))],
        )
        .expect("list");
        let other = TypeParam::new(def(30), 0, "M", ParamKind::Fin);
        let mut subst = Substitution::new();
        subst.insert(&other, TypeArg::Fin(CostExpr::Fin(9)));
        assert_eq!(subst.apply_instance(&list).chain().depth(), 1);
    }

    #[test]
    fn hash_placeholder_resolves_after_substitution() {
        let t = TypeParam::new(def(40), 0, "T", ParamKind::Standard);
        let pair = Instantiation::apply(
            pair_terminus(),
            vec![TypeArg::Type(Type::Param(t.clone())), TypeArg::Type(Type::INT)],
        )
        .expect("pair");
        let cost = structural_hash_cost(&Type::Instance(pair));
        assert!(matches!(cost, CostExpr::HashOfInstance(_)));

        let mut subst = Substitution::new();
        subst.insert(&t, TypeArg::Type(Type::CHAR));
        assert_eq!(subst.apply_cost(&cost), CostExpr::Fin(2));
    }

    #[test]
    fn missing_parameter_reported() {
        let err = Instantiation::from_substitution(pair_terminus(), &Substitution::new())
            .unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"type parameter A of Pair has no argument");
    }
}

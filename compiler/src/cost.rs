// cost.rs — Cost expression algebra
//
// A closed expression language for "work as a function of Fin bounds that
// may not be known yet". The smart constructors (`sum`, `product`, `max`)
// flatten nested operators and fold constants, so any expression built
// through them is a literal `Fin` as soon as it becomes evaluable.
//
// Preconditions: none.
// Postconditions: `evaluate` returns `Some` iff `is_evaluable`; arithmetic
//   saturates at `u64::MAX`.
// Failure modes: none.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use crate::id::TypeParamId;
use crate::subst::Instantiation;
use crate::types::{Type, TypeArg, TypeParam};

#[derive(Debug, Clone, PartialEq)]
pub enum CostExpr {
    Fin(u64),
    /// A Fin type parameter used as a cost term.
    Param(TypeParam),
    Sum(Vec<CostExpr>),
    Product(Vec<CostExpr>),
    Max(Vec<CostExpr>),
    /// Cost of hashing a value whose type is a standard parameter.
    HashOfParam(TypeParam),
    /// Cost of hashing an instance whose arguments still mention standard
    /// parameters.
    HashOfInstance(Box<Instantiation>),
}

impl CostExpr {
    pub const ZERO: CostExpr = CostExpr::Fin(0);
    pub const ONE: CostExpr = CostExpr::Fin(1);

    pub fn sum(items: impl IntoIterator<Item = CostExpr>) -> CostExpr {
        let mut constant = 0u64;
        let mut rest = Vec::new();
        for item in items {
            match item {
                CostExpr::Fin(n) => constant = constant.saturating_add(n),
                CostExpr::Sum(inner) => {
                    for i in inner {
                        match i {
                            CostExpr::Fin(n) => constant = constant.saturating_add(n),
                            other => rest.push(other),
                        }
                    }
                }
                other => rest.push(other),
            }
        }
        if rest.is_empty() {
            return CostExpr::Fin(constant);
        }
        if constant > 0 {
            rest.push(CostExpr::Fin(constant));
        }
        if rest.len() == 1 {
            rest.pop().unwrap_or(CostExpr::ZERO)
        } else {
            CostExpr::Sum(rest)
        }
    }

    pub fn product(items: impl IntoIterator<Item = CostExpr>) -> CostExpr {
        let mut constant = 1u64;
        let mut rest = Vec::new();
        for item in items {
            match item {
                CostExpr::Fin(n) => constant = constant.saturating_mul(n),
                CostExpr::Product(inner) => {
                    for i in inner {
                        match i {
                            CostExpr::Fin(n) => constant = constant.saturating_mul(n),
                            other => rest.push(other),
                        }
                    }
                }
                other => rest.push(other),
            }
        }
        if constant == 0 || rest.is_empty() {
            return CostExpr::Fin(constant);
        }
        if constant != 1 {
            rest.insert(0, CostExpr::Fin(constant));
        }
        if rest.len() == 1 {
            rest.pop().unwrap_or(CostExpr::ONE)
        } else {
            CostExpr::Product(rest)
        }
    }

    pub fn max(items: impl IntoIterator<Item = CostExpr>) -> CostExpr {
        let mut constant = 0u64;
        let mut rest: Vec<CostExpr> = Vec::new();
        for item in items {
            let flattened = match item {
                CostExpr::Max(inner) => inner,
                other => vec![other],
            };
            for i in flattened {
                match i {
                    CostExpr::Fin(n) => constant = constant.max(n),
                    other => {
                        if !rest.contains(&other) {
                            rest.push(other);
                        }
                    }
                }
            }
        }
        if rest.is_empty() {
            return CostExpr::Fin(constant);
        }
        if constant > 0 {
            rest.push(CostExpr::Fin(constant));
        }
        if rest.len() == 1 {
            rest.pop().unwrap_or(CostExpr::ZERO)
        } else {
            CostExpr::Max(rest)
        }
    }

    pub fn plus(self, other: CostExpr) -> CostExpr {
        CostExpr::sum([self, other])
    }

    pub fn times(self, other: CostExpr) -> CostExpr {
        CostExpr::product([self, other])
    }

    /// True when no parameter or hash placeholder remains.
    pub fn is_evaluable(&self) -> bool {
        match self {
            CostExpr::Fin(_) => true,
            CostExpr::Param(_) | CostExpr::HashOfParam(_) | CostExpr::HashOfInstance(_) => false,
            CostExpr::Sum(items) | CostExpr::Product(items) | CostExpr::Max(items) => {
                items.iter().all(CostExpr::is_evaluable)
            }
        }
    }

    pub fn evaluate(&self) -> Option<u64> {
        match self {
            CostExpr::Fin(n) => Some(*n),
            CostExpr::Param(_) | CostExpr::HashOfParam(_) | CostExpr::HashOfInstance(_) => None,
            CostExpr::Sum(items) => items
                .iter()
                .try_fold(0u64, |acc, c| Some(acc.saturating_add(c.evaluate()?))),
            CostExpr::Product(items) => items
                .iter()
                .try_fold(1u64, |acc, c| Some(acc.saturating_mul(c.evaluate()?))),
            CostExpr::Max(items) => items
                .iter()
                .try_fold(0u64, |acc, c| Some(acc.max(c.evaluate()?))),
        }
    }

    /// Replace an evaluable expression by its literal value.
    pub fn collapse(self) -> CostExpr {
        match self.evaluate() {
            Some(n) => CostExpr::Fin(n),
            None => self,
        }
    }

    pub fn collect_params(&self, out: &mut BTreeMap<TypeParamId, TypeParam>) {
        match self {
            CostExpr::Fin(_) => {}
            CostExpr::Param(p) | CostExpr::HashOfParam(p) => {
                out.insert(p.id, p.clone());
            }
            CostExpr::Sum(items) | CostExpr::Product(items) | CostExpr::Max(items) => {
                for i in items {
                    i.collect_params(out);
                }
            }
            CostExpr::HashOfInstance(inst) => {
                for arg in inst.args() {
                    arg.collect_params(out);
                }
            }
        }
    }
}

impl fmt::Display for CostExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |f: &mut fmt::Formatter<'_>, name: &str, items: &[CostExpr]| {
            write!(f, "{}(", name)?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", item)?;
            }
            write!(f, ")")
        };
        match self {
            CostExpr::Fin(n) => write!(f, "{}", n),
            CostExpr::Param(p) => write!(f, "{}", p.name),
            CostExpr::Sum(items) => list(f, "Sum", items),
            CostExpr::Product(items) => list(f, "Mul", items),
            CostExpr::Max(items) => list(f, "Max", items),
            CostExpr::HashOfParam(p) => write!(f, "hash({})", p.name),
            CostExpr::HashOfInstance(inst) => write!(f, "hash({})", inst),
        }
    }
}

// ── Structural hash cost ───────────────────────────────────────────────────

/// Cost of producing the hash/string form of a value of type `ty`.
///
/// Basic values cost 1, objects their identifier length. Instances replay
/// their definition's stored hash cost through the instantiation chain,
/// unless a standard parameter is still free, in which case the cost stays
/// a placeholder until that parameter is substituted.
pub fn structural_hash_cost(ty: &Type) -> CostExpr {
    match ty {
        Type::Basic(_) | Type::Function(_) | Type::Error => CostExpr::ONE,
        Type::Object { name, .. } => CostExpr::Fin(name.chars().count() as u64),
        Type::Param(p) if p.is_fin() => CostExpr::ONE,
        Type::Param(p) => CostExpr::HashOfParam(p.clone()),
        Type::Instance(inst) => {
            let standard_free = inst.args().iter().any(|arg| match arg {
                TypeArg::Type(t) => {
                    let mut params = BTreeMap::new();
                    t.collect_params(&mut params);
                    params.values().any(|p| !p.is_fin())
                }
                TypeArg::Fin(_) => false,
            });
            if standard_free {
                CostExpr::HashOfInstance(Box::new(inst.clone()))
            } else {
                inst.replay_cost(&inst.terminus().hash_cost)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{DefId, UnitId};
    use crate::types::ParamKind;

    fn fin_param(name: &str, index: u16) -> CostExpr {
        CostExpr::Param(TypeParam::new(
            DefId {
                unit: UnitId(1),
                index: 0,
            },
            index,
            name,
            ParamKind::Fin,
        ))
    }

    #[test]
    fn constructors_fold_constants() {
        assert_eq!(CostExpr::sum([CostExpr::Fin(2), CostExpr::Fin(3)]), CostExpr::Fin(5));
        assert_eq!(
            CostExpr::product([CostExpr::Fin(4), CostExpr::Fin(0), fin_param("N", 0)]),
            CostExpr::Fin(0)
        );
        assert_eq!(CostExpr::max([CostExpr::Fin(2), CostExpr::Fin(7)]), CostExpr::Fin(7));
    }

    #[test]
    fn symbolic_terms_survive() {
        let n = fin_param("N", 0);
        let c = CostExpr::sum([CostExpr::product([n.clone(), CostExpr::Fin(3)]), CostExpr::Fin(1)]);
        assert!(!c.is_evaluable());
        assert_eq!(c.evaluate(), None);
        insta::assert_snapshot!(c.to_string(), @"Sum(Mul(3, N), 1)");
    }

    #[test]
    fn nested_sums_flatten() {
        let n = fin_param("N", 0);
        let m = fin_param("M", 1);
        let c = CostExpr::sum([
            CostExpr::sum([n.clone(), CostExpr::Fin(1)]),
            CostExpr::sum([m.clone(), CostExpr::Fin(2)]),
        ]);
        assert_eq!(c, CostExpr::Sum(vec![n, m, CostExpr::Fin(3)]));
    }

    #[test]
    fn max_dedupes() {
        let n = fin_param("N", 0);
        assert_eq!(CostExpr::max([n.clone(), n.clone()]), n);
    }

    #[test]
    fn evaluation_saturates() {
        let c = CostExpr::Product(vec![CostExpr::Fin(u64::MAX), CostExpr::Fin(2)]);
        assert_eq!(c.evaluate(), Some(u64::MAX));
        assert_eq!(c.collapse(), CostExpr::Fin(u64::MAX));
    }

    #[test]
    fn basic_and_object_hash_costs() {
        assert_eq!(structural_hash_cost(&Type::INT), CostExpr::ONE);
        let obj = Type::Object {
            def: DefId {
                unit: UnitId(1),
                index: 4,
            },
            name: "Origin".into(),
            sum: None,
        };
        assert_eq!(structural_hash_cost(&obj), CostExpr::Fin(6));
    }
}

// constraint.rs — Constraint-based instantiation
//
// Infers the type arguments of a generic call site. Each formal parameter's
// declared type is matched structurally against the argument's type,
// yielding one constraint per parameter occurrence. Constraints are grouped
// per parameter into equivalence relations, and each relation is resolved to
// a single argument with `best_type`.
//
// Built-in collections do not fit this scheme: their capacity parameter is
// the number of constructor arguments, not something any argument's type
// carries. `builtin_instance` implements those rules.
//
// Preconditions: argument types have been propagated.
// Postconditions: a returned `Substitution` covers every target parameter.
// Failure modes: shape mismatches, uninferable or conflicting parameters,
//   mutable collections without explicit arguments, literal overflow of an
//   explicit bound → `ConstraintError`.
// Side effects: none.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::builtins::{BuiltinKind, Platform};
use crate::cost::CostExpr;
use crate::diag::{codes, DiagCode, Diagnostic};
use crate::id::TypeParamId;
use crate::subst::{Instantiation, SubstError, Substitution};
use crate::symbols::SymbolView;
use crate::types::{join, Type, TypeArg, TypeParam};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstraintError {
    #[error("type mismatch: expected {expected}, found {found}")]
    Shape { expected: String, found: String },
    #[error("cannot infer type parameter {param} of {owner}")]
    Uninferred { param: String, owner: String },
    #[error("conflicting types for {param}: {first} and {second}")]
    Conflict {
        param: String,
        first: String,
        second: String,
    },
    #[error("{0} requires explicit type arguments")]
    MutableInference(&'static str),
    #[error("too many elements: {kind} bounded by {bound} given {count}")]
    TooMany {
        kind: &'static str,
        bound: u64,
        count: usize,
    },
    #[error("Dictionary arguments must be Pair values, found {0}")]
    NotPair(String),
    #[error(transparent)]
    Subst(#[from] SubstError),
}

impl ConstraintError {
    pub fn code(&self) -> DiagCode {
        match self {
            ConstraintError::Shape { .. }
            | ConstraintError::Conflict { .. }
            | ConstraintError::NotPair(_) => codes::E0200,
            ConstraintError::Uninferred { .. } => codes::E0203,
            ConstraintError::MutableInference(_) => codes::E0206,
            ConstraintError::TooMany { .. } => codes::E0205,
            ConstraintError::Subst(SubstError::Arity { .. }) => codes::E0202,
            ConstraintError::Subst(SubstError::Kind { .. }) => codes::E0204,
            ConstraintError::Subst(SubstError::Missing { .. }) => codes::E0203,
        }
    }

    pub fn at(self, span: crate::ast::Span) -> Diagnostic {
        Diagnostic::error(self.code(), span, self.to_string())
    }
}

// ── Constraints ─────────────────────────────────────────────────────────────

/// One observed candidate for one type parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub param: TypeParam,
    pub candidate: TypeArg,
}

/// A parameter with every candidate observed for it, in observation order.
#[derive(Debug, Clone, PartialEq)]
pub struct EquivalenceRelation {
    pub param: TypeParam,
    pub candidates: Vec<TypeArg>,
}

fn is_target(p: &TypeParam, targets: &[TypeParam]) -> bool {
    targets.iter().any(|t| t.id == p.id)
}

fn shape(expected: &Type, found: &Type) -> ConstraintError {
    ConstraintError::Shape {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

/// Match `declared` (over `targets`) against `actual`, pushing constraints.
pub fn collect(
    declared: &Type,
    actual: &Type,
    targets: &[TypeParam],
    out: &mut Vec<Constraint>,
) -> Result<(), ConstraintError> {
    if actual.is_error() {
        return Ok(());
    }
    match declared {
        Type::Param(p) if is_target(p, targets) => {
            out.push(Constraint {
                param: p.clone(),
                candidate: TypeArg::Type(actual.clone()),
            });
            Ok(())
        }
        Type::Function(d) => match actual {
            Type::Function(a) if a.params.len() == d.params.len() => {
                for (dp, ap) in d.params.iter().zip(&a.params) {
                    collect(dp, ap, targets, out)?;
                }
                collect(&d.ret, &a.ret, targets, out)
            }
            _ => Err(shape(declared, actual)),
        },
        Type::Instance(d) => match actual {
            Type::Instance(a)
                if a.def() == d.def() || a.terminus().member_of() == Some(d.def()) =>
            {
                for (da, aa) in d.args().iter().zip(a.args()) {
                    match (da, &aa) {
                        (TypeArg::Type(dt), TypeArg::Type(at)) => collect(dt, at, targets, out)?,
                        (TypeArg::Fin(CostExpr::Param(p)), TypeArg::Fin(_))
                            if is_target(p, targets) =>
                        {
                            out.push(Constraint {
                                param: p.clone(),
                                candidate: aa.clone(),
                            });
                        }
                        _ => {}
                    }
                }
                Ok(())
            }
            Type::Object { sum: Some(s), .. } if *s == d.def() => Ok(()),
            _ => Err(shape(declared, actual)),
        },
        _ => Ok(()),
    }
}

/// Group constraints by parameter, keeping parameters in ID order.
pub fn group(constraints: Vec<Constraint>) -> BTreeMap<TypeParamId, EquivalenceRelation> {
    let mut groups: BTreeMap<TypeParamId, EquivalenceRelation> = BTreeMap::new();
    for c in constraints {
        groups
            .entry(c.param.id)
            .or_insert_with(|| EquivalenceRelation {
                param: c.param.clone(),
                candidates: Vec::new(),
            })
            .candidates
            .push(c.candidate);
    }
    groups
}

// ── Best type ───────────────────────────────────────────────────────────────

/// A sum member instance viewed as an instance of its sum.
fn lift_to_sum(view: SymbolView<'_>, ty: &Type) -> Option<Type> {
    let inst = ty.as_instance()?;
    let sum = view.def(inst.terminus().member_of()?)?.terminus()?;
    Instantiation::apply(sum, inst.args()).ok().map(Type::Instance)
}

/// Join two types, lifting sum members to their sum when neither side is
/// assignable to the other.
pub fn join_types(view: SymbolView<'_>, a: &Type, b: &Type) -> Option<Type> {
    join(a, b).or_else(|| {
        let la = lift_to_sum(view, a).unwrap_or_else(|| a.clone());
        let lb = lift_to_sum(view, b).unwrap_or_else(|| b.clone());
        join(&la, &lb)
    })
}

/// Pick one argument from a relation's candidates.
///
/// Fin candidates: the largest bound when all are evaluable, otherwise the
/// `Max` of all of them. Type candidates: the candidate every other one is
/// assignable to, after lifting sum members to their sum.
pub fn best_type(
    view: SymbolView<'_>,
    relation: &EquivalenceRelation,
) -> Result<TypeArg, ConstraintError> {
    let param = &relation.param;
    if param.is_fin() {
        let bounds: Vec<CostExpr> = relation
            .candidates
            .iter()
            .filter_map(|c| c.as_fin().cloned())
            .collect();
        return Ok(TypeArg::Fin(CostExpr::max(bounds)));
    }
    let mut best: Option<Type> = None;
    for candidate in &relation.candidates {
        let Some(ty) = candidate.as_type() else {
            continue;
        };
        best = Some(match best {
            None => ty.clone(),
            Some(current) => join_types(view, &current, ty).ok_or_else(|| ConstraintError::Conflict {
                param: param.name.to_string(),
                first: current.to_string(),
                second: ty.to_string(),
            })?,
        });
    }
    best.map(TypeArg::Type).ok_or_else(|| ConstraintError::Uninferred {
        param: param.name.to_string(),
        owner: String::new(),
    })
}

/// Resolve constraints into a substitution covering all of `params`.
pub fn resolve(
    view: SymbolView<'_>,
    owner: &str,
    params: &[TypeParam],
    constraints: Vec<Constraint>,
) -> Result<Substitution, ConstraintError> {
    let groups = group(constraints);
    let mut subst = Substitution::new();
    for p in params {
        let Some(relation) = groups.get(&p.id) else {
            return Err(ConstraintError::Uninferred {
                param: p.name.to_string(),
                owner: owner.to_string(),
            });
        };
        let best = best_type(view, relation)?;
        tracing::trace!(
            param = %p.name,
            candidates = relation.candidates.len(),
            chosen = %best,
            "resolved equivalence relation"
        );
        subst.insert(p, best);
    }
    Ok(subst)
}

// ── Built-in collections ────────────────────────────────────────────────────

/// Instantiate a built-in collection constructor call.
///
/// Explicit arguments are kind-checked and the literal count is compared
/// against an evaluable bound. Without them, `List`/`Set` take `T` from the
/// arguments and `N` from their count; `Dictionary` takes `K` and `V` from
/// the first `Pair`. Mutable collections never infer.
pub fn builtin_instance(
    platform: &Platform,
    view: SymbolView<'_>,
    kind: BuiltinKind,
    explicit: Option<Vec<TypeArg>>,
    args: &[Type],
) -> Result<Instantiation, ConstraintError> {
    let terminus = platform.builtin_terminus(kind);
    let count = args.len();

    if let Some(targs) = explicit {
        let inst = Instantiation::apply(terminus, targs)?;
        let bound = inst
            .arg(kind.fin_index())
            .and_then(|a| a.as_fin().and_then(CostExpr::evaluate));
        if let Some(bound) = bound {
            if (count as u64) > bound {
                return Err(ConstraintError::TooMany {
                    kind: kind.name(),
                    bound,
                    count,
                });
            }
        }
        return Ok(inst);
    }

    if kind.is_mutable() {
        return Err(ConstraintError::MutableInference(kind.name()));
    }
    let params = terminus.params.clone();
    let n = TypeArg::Fin(CostExpr::Fin(count as u64));
    let uninferred = |p: &TypeParam| ConstraintError::Uninferred {
        param: p.name.to_string(),
        owner: kind.name().to_string(),
    };

    let inst_args = if kind.is_dictionary() {
        let mut first = None;
        for a in args {
            match a.as_instance() {
                Some(inst) if inst.def() == platform.pair => {
                    if first.is_none() {
                        first = Some(inst.args());
                    }
                }
                _ if a.is_error() => {}
                _ => return Err(ConstraintError::NotPair(a.to_string())),
            }
        }
        let mut kv = first.ok_or_else(|| uninferred(&params[0]))?;
        kv.push(n);
        kv
    } else {
        let constraints = args
            .iter()
            .filter(|a| !a.is_error())
            .map(|a| Constraint {
                param: params[0].clone(),
                candidate: TypeArg::Type(a.clone()),
            })
            .collect::<Vec<_>>();
        if constraints.is_empty() {
            return Err(uninferred(&params[0]));
        }
        let relation = EquivalenceRelation {
            param: params[0].clone(),
            candidates: constraints.into_iter().map(|c| c.candidate).collect(),
        };
        vec![best_type(view, &relation)?, n]
    };
    Ok(Instantiation::apply(terminus, inst_args)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{DefId, UnitId};
    use crate::plugin::PluginRegistry;
    use crate::symbols::SymbolTable;

    struct Fixture {
        platform: Platform,
        local: SymbolTable,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                platform: Platform::new(&PluginRegistry::new()).expect("platform"),
                local: SymbolTable::new(UnitId(1)),
            }
        }

        fn view(&self) -> SymbolView<'_> {
            SymbolView {
                local: &self.local,
                imports: &[],
                platform: &self.platform.table,
            }
        }

        fn list(&self, elem: Type, n: u64) -> Type {
            self.platform.instance(
                BuiltinKind::List,
                vec![TypeArg::Type(elem), TypeArg::Fin(CostExpr::Fin(n))],
            )
        }
    }

    fn params() -> Vec<TypeParam> {
        let owner = DefId {
            unit: UnitId(1),
            index: 7,
        };
        vec![
            TypeParam::new(owner, 0, "T", crate::types::ParamKind::Standard),
            TypeParam::new(owner, 1, "N", crate::types::ParamKind::Fin),
        ]
    }

    #[test]
    fn list_literal_infers_count_as_bound() {
        let f = Fixture::new();
        let inst = builtin_instance(
            &f.platform,
            f.view(),
            BuiltinKind::List,
            None,
            &[Type::INT, Type::INT, Type::INT],
        )
        .expect("instance");
        assert_eq!(inst.to_string(), "List<Int, 3>");
    }

    #[test]
    fn explicit_bound_smaller_than_literal_count() {
        let f = Fixture::new();
        let err = builtin_instance(
            &f.platform,
            f.view(),
            BuiltinKind::List,
            Some(vec![TypeArg::Type(Type::INT), TypeArg::Fin(CostExpr::Fin(2))]),
            &[Type::INT, Type::INT, Type::INT],
        )
        .unwrap_err();
        assert_eq!(err.code(), codes::E0205);
        insta::assert_snapshot!(err.to_string(), @"too many elements: List bounded by 2 given 3");
    }

    #[test]
    fn dictionary_entries_must_be_pairs() {
        let f = Fixture::new();
        let err = builtin_instance(
            &f.platform,
            f.view(),
            BuiltinKind::Dictionary,
            None,
            &[Type::INT, Type::INT],
        )
        .unwrap_err();
        assert_eq!(err, ConstraintError::NotPair("Int".into()));
        assert_eq!(err.code(), codes::E0200);
    }

    #[test]
    fn empty_literal_cannot_infer_its_element_type() {
        let f = Fixture::new();
        let err = builtin_instance(&f.platform, f.view(), BuiltinKind::List, None, &[]).unwrap_err();
        assert_eq!(
            err,
            ConstraintError::Uninferred {
                param: "T".into(),
                owner: "List".into()
            }
        );
        assert_eq!(err.code(), codes::E0203);
    }

    #[test]
    fn mutable_collections_refuse_inference() {
        let f = Fixture::new();
        let err = builtin_instance(&f.platform, f.view(), BuiltinKind::MutableSet, None, &[Type::INT])
            .unwrap_err();
        assert_eq!(err, ConstraintError::MutableInference("MutableSet"));
    }

    #[test]
    fn generic_call_collects_and_resolves() {
        let f = Fixture::new();
        let ps = params();
        let declared = f.platform.instance(
            BuiltinKind::List,
            vec![
                TypeArg::Type(Type::Param(ps[0].clone())),
                TypeArg::Fin(CostExpr::Param(ps[1].clone())),
            ],
        );
        let mut constraints = Vec::new();
        collect(&declared, &f.list(Type::CHAR, 4), &ps, &mut constraints).expect("collect");
        collect(&Type::Param(ps[0].clone()), &Type::CHAR, &ps, &mut constraints).expect("collect");
        assert_eq!(constraints.len(), 3);
        let subst = resolve(f.view(), "f", &ps, constraints).expect("resolve");
        assert_eq!(subst.to_string(), "{T := Char, N := 4}");
    }

    #[test]
    fn fin_candidates_take_the_largest_bound() {
        let f = Fixture::new();
        let ps = params();
        let relation = EquivalenceRelation {
            param: ps[1].clone(),
            candidates: vec![
                TypeArg::Fin(CostExpr::Fin(2)),
                TypeArg::Fin(CostExpr::Fin(5)),
                TypeArg::Fin(CostExpr::Fin(3)),
            ],
        };
        assert_eq!(
            best_type(f.view(), &relation).expect("best"),
            TypeArg::Fin(CostExpr::Fin(5))
        );
    }

    #[test]
    fn covariant_lists_join_to_the_wider_bound() {
        let f = Fixture::new();
        let ps = params();
        let relation = EquivalenceRelation {
            param: ps[0].clone(),
            candidates: vec![
                TypeArg::Type(f.list(Type::INT, 2)),
                TypeArg::Type(f.list(Type::INT, 3)),
            ],
        };
        assert_eq!(
            best_type(f.view(), &relation).expect("best").to_string(),
            "List<Int, 3>"
        );
    }

    #[test]
    fn conflicting_and_missing_candidates() {
        let f = Fixture::new();
        let ps = params();
        let mut constraints = Vec::new();
        collect(&Type::Param(ps[0].clone()), &Type::INT, &ps, &mut constraints).expect("collect");
        collect(&Type::Param(ps[0].clone()), &Type::CHAR, &ps, &mut constraints).expect("collect");
        let err = resolve(f.view(), "f", &ps, constraints).unwrap_err();
        assert_eq!(err.code(), codes::E0200);

        let err = resolve(f.view(), "f", &ps[1..], Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "cannot infer type parameter N of f");
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let f = Fixture::new();
        let ps = params();
        let declared = f.list(Type::Param(ps[0].clone()), 2);
        let err = collect(&declared, &Type::INT, &ps, &mut Vec::new()).unwrap_err();
        assert_eq!(err.code(), codes::E0200);
    }

    #[test]
    fn option_members_join_to_the_sum() {
        let f = Fixture::new();
        let some_id = f.platform.table.lookup("Some").expect("Some");
        let none_id = f.platform.table.lookup("None").expect("None");
        let some_def = f.platform.table.def(some_id).expect("def");
        let some = Type::Instance(
            Instantiation::apply(some_def.terminus().expect("terminus"), vec![TypeArg::Type(Type::INT)])
                .expect("apply"),
        );
        let none = f.platform.table.def(none_id).and_then(|d| d.object_type()).expect("None");
        let joined = join_types(f.view(), &some, &none).expect("join");
        assert_eq!(joined.to_string(), "Option<Int>");
    }
}

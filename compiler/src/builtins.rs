// builtins.rs — Platform definitions (unit 0)
//
// Built-in parameterized collections, the platform `Pair` record and
// `Option` sum, host plugins, and the member table for built-in receivers.
// Member signatures are written over the built-in's own parameters and
// replayed through the receiver's instantiation chain.
//
// Preconditions: plugin declarations in the registry parse and resolve.
// Postconditions: `Platform::table` is immutable after construction.
// Failure modes: a plugin signature that fails to resolve → `PluginError`.
// Side effects: none.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::cost::{structural_hash_cost, CostExpr};
use crate::id::{DefId, UnitId};
use crate::plugin::{PluginError, PluginRegistry};
use crate::subst::Instantiation;
use crate::symbols::{DefKind, Field, PluginInfo, RecordInfo, SumInfo, SymbolTable, SymbolView};
use crate::typexpr;
use crate::types::{
    BasicType, FunctionType, ParamKind, Terminus, TerminusKind, Type, TypeArg, TypeParam,
};

// ── Built-in kinds ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinKind {
    String,
    Decimal,
    List,
    MutableList,
    Set,
    MutableSet,
    Dictionary,
    MutableDictionary,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 8] = [
        BuiltinKind::String,
        BuiltinKind::Decimal,
        BuiltinKind::List,
        BuiltinKind::MutableList,
        BuiltinKind::Set,
        BuiltinKind::MutableSet,
        BuiltinKind::Dictionary,
        BuiltinKind::MutableDictionary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::String => "String",
            BuiltinKind::Decimal => "Decimal",
            BuiltinKind::List => "List",
            BuiltinKind::MutableList => "MutableList",
            BuiltinKind::Set => "Set",
            BuiltinKind::MutableSet => "MutableSet",
            BuiltinKind::Dictionary => "Dictionary",
            BuiltinKind::MutableDictionary => "MutableDictionary",
        }
    }

    pub fn is_mutable(self) -> bool {
        matches!(
            self,
            BuiltinKind::MutableList | BuiltinKind::MutableSet | BuiltinKind::MutableDictionary
        )
    }

    /// The read-only counterpart produced by `toList`/`toSet`/`toDictionary`.
    pub fn frozen(self) -> BuiltinKind {
        match self {
            BuiltinKind::MutableList => BuiltinKind::List,
            BuiltinKind::MutableSet => BuiltinKind::Set,
            BuiltinKind::MutableDictionary => BuiltinKind::Dictionary,
            other => other,
        }
    }

    /// Collections can be iterated and constructed from an argument list.
    pub fn is_collection(self) -> bool {
        !matches!(self, BuiltinKind::String | BuiltinKind::Decimal)
    }

    pub fn is_dictionary(self) -> bool {
        matches!(self, BuiltinKind::Dictionary | BuiltinKind::MutableDictionary)
    }

    fn param_names(self) -> &'static [(&'static str, ParamKind)] {
        match self {
            BuiltinKind::String | BuiltinKind::Decimal => &[("N", ParamKind::Fin)],
            BuiltinKind::List
            | BuiltinKind::MutableList
            | BuiltinKind::Set
            | BuiltinKind::MutableSet => &[("T", ParamKind::Standard), ("N", ParamKind::Fin)],
            BuiltinKind::Dictionary | BuiltinKind::MutableDictionary => &[
                ("K", ParamKind::Standard),
                ("V", ParamKind::Standard),
                ("N", ParamKind::Fin),
            ],
        }
    }

    /// Position of the capacity parameter (always last).
    pub fn fin_index(self) -> usize {
        self.param_names().len() - 1
    }

    pub fn params(self, def: DefId) -> Vec<TypeParam> {
        self.param_names()
            .iter()
            .enumerate()
            .map(|(i, (name, kind))| TypeParam::new(def, i as u16, name, *kind))
            .collect()
    }

    fn hash_cost(self, params: &[TypeParam]) -> CostExpr {
        let n = CostExpr::Param(params[self.fin_index()].clone());
        match self {
            BuiltinKind::String | BuiltinKind::Decimal => n,
            BuiltinKind::Dictionary | BuiltinKind::MutableDictionary => CostExpr::product([
                n,
                CostExpr::sum([
                    CostExpr::HashOfParam(params[0].clone()),
                    CostExpr::HashOfParam(params[1].clone()),
                ]),
            ]),
            _ => CostExpr::product([n, CostExpr::HashOfParam(params[0].clone())]),
        }
    }

    pub fn terminus(self, def: DefId) -> Rc<Terminus> {
        self.terminus_with_params(def, &self.params(def))
    }

    pub fn terminus_with_params(self, def: DefId, params: &[TypeParam]) -> Rc<Terminus> {
        Rc::new(Terminus {
            def,
            name: Rc::from(self.name()),
            params: params.to_vec(),
            hash_cost: self.hash_cost(params),
            kind: TerminusKind::Builtin(self),
        })
    }
}

// ── Members ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Member {
    Size,
    Get,
    Contains,
    Add,
    Set,
    Remove,
    RemoveAt,
    ToList,
    ToSet,
    ToDictionary,
    ToString,
}

impl Member {
    pub fn from_name(name: &str) -> Option<Member> {
        Some(match name {
            "size" => Member::Size,
            "get" => Member::Get,
            "contains" => Member::Contains,
            "add" => Member::Add,
            "set" => Member::Set,
            "remove" => Member::Remove,
            "removeAt" => Member::RemoveAt,
            "toList" => Member::ToList,
            "toSet" => Member::ToSet,
            "toDictionary" => Member::ToDictionary,
            "toString" => Member::ToString,
            _ => return None,
        })
    }

    pub fn mutates(self) -> bool {
        matches!(
            self,
            Member::Add | Member::Set | Member::Remove | Member::RemoveAt
        )
    }
}

/// A member signature already replayed for one receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberSig {
    pub member: Member,
    pub signature: FunctionType,
    pub cost: CostExpr,
}

// ── Platform ───────────────────────────────────────────────────────────────

/// The platform symbol table plus quick access to its built-ins.
#[derive(Debug, Clone)]
pub struct Platform {
    pub table: SymbolTable,
    builtins: BTreeMap<BuiltinKind, DefId>,
    pub pair: DefId,
    pub option: DefId,
}

impl Platform {
    pub fn new(plugins: &PluginRegistry) -> Result<Self, PluginError> {
        let mut table = SymbolTable::new(UnitId::PLATFORM);
        let mut builtins = BTreeMap::new();
        for kind in BuiltinKind::ALL {
            let id = table.reserve();
            table.define(id, kind.name(), kind.params(id), DefKind::Builtin(kind), None);
            builtins.insert(kind, id);
        }

        // record Pair<A, B>(first: A, second: B)
        let pair = table.reserve();
        let a = TypeParam::new(pair, 0, "A", ParamKind::Standard);
        let b = TypeParam::new(pair, 1, "B", ParamKind::Standard);
        let pair_info = RecordInfo {
            fields: vec![
                Field {
                    name: "first".into(),
                    ty: Type::Param(a.clone()),
                    mutable: false,
                },
                Field {
                    name: "second".into(),
                    ty: Type::Param(b.clone()),
                    mutable: false,
                },
            ],
            sum: None,
            hash_cost: CostExpr::sum([
                CostExpr::HashOfParam(a.clone()),
                CostExpr::HashOfParam(b.clone()),
            ]),
        };
        table.define(pair, "Pair", vec![a, b], DefKind::Record(pair_info), None);

        // sum Option<T> { record Some(value: T); object None }
        let option = table.reserve();
        let t = TypeParam::new(option, 0, "T", ParamKind::Standard);
        let some = table.reserve();
        let none = table.reserve();
        let some_hash = CostExpr::HashOfParam(t.clone());
        table.define(
            some,
            "Some",
            vec![t.clone()],
            DefKind::Record(RecordInfo {
                fields: vec![Field {
                    name: "value".into(),
                    ty: Type::Param(t.clone()),
                    mutable: false,
                }],
                sum: Some(option),
                hash_cost: some_hash.clone(),
            }),
            None,
        );
        table.define(none, "None", vec![], DefKind::Object { sum: Some(option) }, None);
        table.define(
            option,
            "Option",
            vec![t],
            DefKind::Sum(SumInfo {
                members: vec![some, none],
                hash_cost: CostExpr::max([some_hash, CostExpr::Fin(4)]),
            }),
            None,
        );

        for entry in plugins.iter() {
            let decl = &entry.decl;
            let id = table.reserve();
            let params: Vec<TypeParam> = decl
                .type_params
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let kind = if p.fin {
                        ParamKind::Fin
                    } else {
                        ParamKind::Standard
                    };
                    TypeParam::new(id, i as u16, &p.name.name, kind)
                })
                .collect();
            let info = {
                let view = SymbolView {
                    local: &table,
                    imports: &[],
                    platform: &table,
                };
                let signature_error = |d: crate::diag::Diagnostic| PluginError::Signature {
                    name: decl.name.name.clone(),
                    message: d.message,
                };
                let mut param_types = Vec::new();
                for p in &decl.params {
                    param_types
                        .push(typexpr::resolve_type(&p.ty, &params, view).map_err(signature_error)?);
                }
                let ret = typexpr::resolve_type(&decl.ret, &params, view).map_err(signature_error)?;
                let cost = typexpr::resolve_fin(&decl.cost, &params).map_err(signature_error)?;
                PluginInfo {
                    signature: FunctionType {
                        params: param_types,
                        ret,
                    },
                    cost,
                }
            };
            table.define(id, &decl.name.name, params, DefKind::Plugin(info), None);
        }

        Ok(Self {
            table,
            builtins,
            pair,
            option,
        })
    }

    pub fn builtin_def(&self, kind: BuiltinKind) -> DefId {
        self.builtins[&kind]
    }

    pub fn builtin_terminus(&self, kind: BuiltinKind) -> Rc<Terminus> {
        let id = self.builtin_def(kind);
        match self.table.def(id) {
            Some(def) => kind.terminus_with_params(id, &def.params),
            None => kind.terminus(id),
        }
    }

    /// `kind<args>`; falls back to `Type::Error` on a malformed argument list.
    pub fn instance(&self, kind: BuiltinKind, args: Vec<TypeArg>) -> Type {
        Instantiation::apply(self.builtin_terminus(kind), args)
            .map(Type::Instance)
            .unwrap_or(Type::Error)
    }

    pub fn string(&self, bound: CostExpr) -> Type {
        self.instance(BuiltinKind::String, vec![TypeArg::Fin(bound)])
    }

    pub fn decimal(&self, digits: CostExpr) -> Type {
        self.instance(BuiltinKind::Decimal, vec![TypeArg::Fin(digits)])
    }

    /// The Fin bound of a built-in instance (capacity, length, or digits).
    pub fn fin_bound(ty: &Type) -> Option<CostExpr> {
        let kind = ty.builtin()?;
        ty.as_instance()?.arg(kind.fin_index())?.as_fin().cloned()
    }

    /// Longest printed form of a `toString` result.
    fn display_bound(&self, receiver: &Type) -> Option<CostExpr> {
        match receiver {
            Type::Basic(BasicType::Int) => Some(CostExpr::Fin(20)),
            Type::Basic(BasicType::Boolean) => Some(CostExpr::Fin(5)),
            Type::Basic(BasicType::Char) => Some(CostExpr::ONE),
            _ => match receiver.builtin()? {
                BuiltinKind::String => Self::fin_bound(receiver),
                BuiltinKind::Decimal => Some(Self::fin_bound(receiver)?.plus(CostExpr::Fin(2))),
                _ => None,
            },
        }
    }

    /// Look up `name` on `receiver`, replaying through the receiver's chain.
    pub fn member(&self, receiver: &Type, name: &str) -> Option<MemberSig> {
        let member = Member::from_name(name)?;
        if member == Member::ToString {
            let bound = self.display_bound(receiver)?;
            return Some(MemberSig {
                member,
                signature: FunctionType {
                    params: vec![],
                    ret: self.string(bound),
                },
                cost: structural_hash_cost(receiver),
            });
        }

        let inst = receiver.as_instance()?;
        let kind = receiver.builtin()?;
        if !kind.is_collection() {
            return None;
        }
        let params = &inst.terminus().params;
        let p = |i: usize| Type::Param(params[i].clone());
        let n = CostExpr::Param(params[kind.fin_index()].clone());
        let hash = |i: usize| CostExpr::HashOfParam(params[i].clone());
        let frozen = |k: BuiltinKind| {
            let args = params
                .iter()
                .map(|q| {
                    if q.is_fin() {
                        TypeArg::Fin(CostExpr::Param(q.clone()))
                    } else {
                        TypeArg::Type(Type::Param(q.clone()))
                    }
                })
                .collect();
            self.instance(k, args)
        };

        use BuiltinKind as B;
        let (params_ty, ret, cost) = match (kind, member) {
            (_, Member::Size) => (vec![], Type::INT, CostExpr::ONE),
            (B::List | B::MutableList, Member::Get) => (vec![Type::INT], p(0), CostExpr::ONE),
            (B::List | B::MutableList, Member::Contains) => (
                vec![p(0)],
                Type::BOOLEAN,
                CostExpr::product([n.clone(), hash(0)]),
            ),
            (B::MutableList, Member::Add) => (vec![p(0)], Type::UNIT, CostExpr::ONE),
            (B::MutableList, Member::Set) => (vec![Type::INT, p(0)], Type::UNIT, CostExpr::ONE),
            (B::MutableList, Member::RemoveAt) => (vec![Type::INT], Type::UNIT, n.clone()),
            (B::MutableList, Member::ToList) => (vec![], frozen(B::List), n.clone()),
            (B::Set | B::MutableSet, Member::Contains) => (vec![p(0)], Type::BOOLEAN, hash(0)),
            (B::MutableSet, Member::Add | Member::Remove) => (vec![p(0)], Type::UNIT, hash(0)),
            (B::MutableSet, Member::ToSet) => (vec![], frozen(B::Set), n.clone()),
            (B::Dictionary | B::MutableDictionary, Member::Get) => (vec![p(0)], p(1), hash(0)),
            (B::Dictionary | B::MutableDictionary, Member::Contains) => {
                (vec![p(0)], Type::BOOLEAN, hash(0))
            }
            (B::MutableDictionary, Member::Set) => (vec![p(0), p(1)], Type::UNIT, hash(0)),
            (B::MutableDictionary, Member::Remove) => (vec![p(0)], Type::UNIT, hash(0)),
            (B::MutableDictionary, Member::ToDictionary) => {
                (vec![], frozen(B::Dictionary), n.clone())
            }
            _ => return None,
        };
        Some(MemberSig {
            member,
            signature: FunctionType {
                params: params_ty.iter().map(|t| inst.replay_type(t)).collect(),
                ret: inst.replay_type(&ret),
            },
            cost: inst.replay_cost(&cost),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> Platform {
        Platform::new(&PluginRegistry::standard()).expect("platform")
    }

    fn list(p: &Platform, kind: BuiltinKind, elem: Type, n: u64) -> Type {
        p.instance(kind, vec![TypeArg::Type(elem), TypeArg::Fin(CostExpr::Fin(n))])
    }

    #[test]
    fn platform_names_resolve() {
        let p = platform();
        for name in ["List", "MutableDictionary", "Pair", "Option", "Some", "None", "abs", "total"] {
            assert!(p.table.lookup(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn list_members_replay_through_receiver() {
        let p = platform();
        let receiver = list(&p, BuiltinKind::List, Type::CHAR, 4);
        let get = p.member(&receiver, "get").expect("get");
        assert_eq!(get.signature.ret, Type::CHAR);
        let contains = p.member(&receiver, "contains").expect("contains");
        assert_eq!(contains.cost, CostExpr::Fin(4));
        assert!(p.member(&receiver, "add").is_none());
    }

    #[test]
    fn freeze_member_returns_immutable_counterpart() {
        let p = platform();
        let receiver = list(&p, BuiltinKind::MutableSet, Type::INT, 3);
        let to_set = p.member(&receiver, "toSet").expect("toSet");
        assert_eq!(to_set.signature.ret.to_string(), "Set<Int, 3>");
        assert_eq!(to_set.cost, CostExpr::Fin(3));
    }

    #[test]
    fn to_string_bounds() {
        let p = platform();
        let s = p.member(&Type::INT, "toString").expect("toString");
        assert_eq!(s.signature.ret.to_string(), "String<20>");
        let d = p.member(&p.decimal(CostExpr::Fin(3)), "toString").expect("toString");
        assert_eq!(d.signature.ret.to_string(), "String<5>");
    }

    #[test]
    fn dictionary_hash_cost_is_structural() {
        let p = platform();
        let dict = p.instance(
            BuiltinKind::Dictionary,
            vec![
                TypeArg::Type(p.string(CostExpr::Fin(3))),
                TypeArg::Type(Type::INT),
                TypeArg::Fin(CostExpr::Fin(2)),
            ],
        );
        assert_eq!(structural_hash_cost(&dict), CostExpr::Fin(8));
    }

    #[test]
    fn plugin_signatures_are_resolved() {
        let p = platform();
        let id = p.table.lookup("total").expect("total");
        let info = match &p.table.def(id).expect("def").kind {
            DefKind::Plugin(info) => info.clone(),
            other => panic!("unexpected {:?}", other),
        };
        let text = format!(
            "{} cost {}",
            Type::Function(Rc::new(info.signature)),
            info.cost
        );
        insta::assert_snapshot!(text, @"(List<Int, N>) -> Int cost N");
    }
}

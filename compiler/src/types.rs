// types.rs — Type model for tally
//
// Every type an expression can have, plus the type parameters that
// parameterized definitions declare. Records, sums, and built-in
// collections are never used directly; an expression always sees an
// `Instantiation` of them (possibly with zero arguments).
//
// Preconditions: none (types only).
// Postconditions: `assignable` is reflexive and never fails on `Type::Error`.
// Failure modes: none.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::builtins::BuiltinKind;
use crate::cost::CostExpr;
use crate::id::{DefId, TypeParamId};
use crate::subst::Instantiation;

// ── Type parameters ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Ranges over types.
    Standard,
    /// Ranges over cost expressions (non-negative bounds).
    Fin,
}

/// A declared type parameter. Identity is the owning definition plus the
/// position; the name is only for display.
#[derive(Debug, Clone)]
pub struct TypeParam {
    pub id: TypeParamId,
    pub name: Rc<str>,
    pub kind: ParamKind,
}

impl TypeParam {
    pub fn new(owner: DefId, index: u16, name: &str, kind: ParamKind) -> Self {
        Self {
            id: TypeParamId { owner, index },
            name: Rc::from(name),
            kind,
        }
    }

    pub fn is_fin(&self) -> bool {
        self.kind == ParamKind::Fin
    }
}

impl PartialEq for TypeParam {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeParam {}

impl PartialOrd for TypeParam {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeParam {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for TypeParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParamKind::Standard => write!(f, "{}", self.name),
            ParamKind::Fin => write!(f, "#{}", self.name),
        }
    }
}

// ── Types ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicType {
    Unit,
    Boolean,
    Int,
    Char,
}

impl BasicType {
    pub fn from_name(name: &str) -> Option<BasicType> {
        match name {
            "Unit" => Some(BasicType::Unit),
            "Boolean" => Some(BasicType::Boolean),
            "Int" => Some(BasicType::Int),
            "Char" => Some(BasicType::Char),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BasicType::Unit => "Unit",
            BasicType::Boolean => "Boolean",
            BasicType::Int => "Int",
            BasicType::Char => "Char",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub ret: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Basic(BasicType),
    /// A singleton object, possibly a member of a sum.
    Object {
        def: DefId,
        name: Rc<str>,
        sum: Option<DefId>,
    },
    Function(Rc<FunctionType>),
    /// A standard type parameter of the enclosing definition.
    Param(TypeParam),
    /// A record, sum, or built-in collection with its arguments.
    Instance(Instantiation),
    /// Placeholder after an error has been reported; assignable to anything.
    Error,
}

impl Type {
    pub const UNIT: Type = Type::Basic(BasicType::Unit);
    pub const BOOLEAN: Type = Type::Basic(BasicType::Boolean);
    pub const INT: Type = Type::Basic(BasicType::Int);
    pub const CHAR: Type = Type::Basic(BasicType::Char);

    pub fn function(params: Vec<Type>, ret: Type) -> Type {
        Type::Function(Rc::new(FunctionType { params, ret }))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function(_))
    }

    pub fn as_instance(&self) -> Option<&Instantiation> {
        match self {
            Type::Instance(inst) => Some(inst),
            _ => None,
        }
    }

    /// The built-in collection kind, when this is an instance of one.
    pub fn builtin(&self) -> Option<BuiltinKind> {
        match self.as_instance()?.terminus().kind {
            TerminusKind::Builtin(kind) => Some(kind),
            _ => None,
        }
    }

    /// Every type parameter mentioned anywhere in this type.
    pub fn collect_params(&self, out: &mut BTreeMap<TypeParamId, TypeParam>) {
        match self {
            Type::Basic(_) | Type::Object { .. } | Type::Error => {}
            Type::Param(p) => {
                out.insert(p.id, p.clone());
            }
            Type::Function(f) => {
                for p in &f.params {
                    p.collect_params(out);
                }
                f.ret.collect_params(out);
            }
            Type::Instance(inst) => {
                for arg in inst.args() {
                    arg.collect_params(out);
                }
            }
        }
    }

    pub fn has_params(&self) -> bool {
        let mut out = BTreeMap::new();
        self.collect_params(&mut out);
        !out.is_empty()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic(b) => write!(f, "{}", b.name()),
            Type::Object { name, .. } => write!(f, "{}", name),
            Type::Function(func) => {
                write!(f, "(")?;
                for (i, p) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", func.ret)
            }
            Type::Param(p) => write!(f, "{}", p.name),
            Type::Instance(inst) => write!(f, "{}", inst),
            Type::Error => write!(f, "<error>"),
        }
    }
}

// ── Type arguments ─────────────────────────────────────────────────────────

/// What a type parameter is bound to: a type for standard parameters, a
/// cost expression for Fin parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeArg {
    Type(Type),
    Fin(CostExpr),
}

impl TypeArg {
    pub fn kind(&self) -> ParamKind {
        match self {
            TypeArg::Type(_) => ParamKind::Standard,
            TypeArg::Fin(_) => ParamKind::Fin,
        }
    }

    pub fn as_type(&self) -> Option<&Type> {
        match self {
            TypeArg::Type(t) => Some(t),
            TypeArg::Fin(_) => None,
        }
    }

    pub fn as_fin(&self) -> Option<&CostExpr> {
        match self {
            TypeArg::Fin(c) => Some(c),
            TypeArg::Type(_) => None,
        }
    }

    pub fn collect_params(&self, out: &mut BTreeMap<TypeParamId, TypeParam>) {
        match self {
            TypeArg::Type(t) => t.collect_params(out),
            TypeArg::Fin(c) => c.collect_params(out),
        }
    }
}

impl fmt::Display for TypeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeArg::Type(t) => write!(f, "{}", t),
            TypeArg::Fin(c) => write!(f, "{}", c),
        }
    }
}

// ── Terminus ───────────────────────────────────────────────────────────────

/// What kind of parameterized definition sits at the root of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminusKind {
    Record { sum: Option<DefId> },
    Sum,
    Builtin(BuiltinKind),
    Function,
    Plugin,
}

/// The original parameterized definition at the root of a substitution
/// chain. `hash_cost` is expressed over `params`.
#[derive(Debug, Clone)]
pub struct Terminus {
    pub def: DefId,
    pub name: Rc<str>,
    pub params: Vec<TypeParam>,
    pub hash_cost: CostExpr,
    pub kind: TerminusKind,
}

impl Terminus {
    /// Collections that are read-only accept narrower Fin bounds and
    /// covariant element types.
    pub fn is_covariant(&self) -> bool {
        match self.kind {
            TerminusKind::Builtin(kind) => !kind.is_mutable(),
            _ => false,
        }
    }

    pub fn member_of(&self) -> Option<DefId> {
        match self.kind {
            TerminusKind::Record { sum } => sum,
            _ => None,
        }
    }
}

// ── Assignability ──────────────────────────────────────────────────────────

/// `a <= b` for Fin bounds. Evaluable bounds compare numerically; symbolic
/// ones only when `b` is `a` or a `Max` over it.
pub fn fin_le(a: &CostExpr, b: &CostExpr) -> bool {
    match (a.evaluate(), b.evaluate()) {
        (Some(x), Some(y)) => x <= y,
        (Some(0), None) => true,
        _ => a == b || matches!(b, CostExpr::Max(items) if items.contains(a)),
    }
}

pub fn fin_eq(a: &CostExpr, b: &CostExpr) -> bool {
    match (a.evaluate(), b.evaluate()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Whether a value of type `from` may be stored where `to` is expected.
pub fn assignable(from: &Type, to: &Type) -> bool {
    match (from, to) {
        (Type::Error, _) | (_, Type::Error) => true,
        (Type::Basic(a), Type::Basic(b)) => a == b,
        (Type::Object { def: a, .. }, Type::Object { def: b, .. }) => a == b,
        (Type::Object { sum: Some(s), .. }, Type::Instance(inst)) => inst.def() == *s,
        (Type::Param(a), Type::Param(b)) => a == b,
        (Type::Function(a), Type::Function(b)) => {
            a.params.len() == b.params.len()
                && b.params
                    .iter()
                    .zip(&a.params)
                    .all(|(bp, ap)| assignable(bp, ap))
                && assignable(&a.ret, &b.ret)
        }
        (Type::Instance(a), Type::Instance(b)) => instance_assignable(a, b),
        _ => false,
    }
}

pub fn same_type(a: &Type, b: &Type) -> bool {
    assignable(a, b) && assignable(b, a)
}

fn instance_assignable(from: &Instantiation, to: &Instantiation) -> bool {
    let covariant = if from.def() == to.def() {
        from.terminus().is_covariant()
    } else if from.terminus().member_of() == Some(to.def()) {
        false
    } else {
        return false;
    };
    let from_args = from.args();
    let to_args = to.args();
    from_args.len() == to_args.len()
        && from_args
            .iter()
            .zip(&to_args)
            .all(|(a, b)| match (a, b) {
                (TypeArg::Type(x), TypeArg::Type(y)) => {
                    if covariant {
                        assignable(x, y)
                    } else {
                        same_type(x, y)
                    }
                }
                (TypeArg::Fin(x), TypeArg::Fin(y)) => {
                    if covariant {
                        fin_le(x, y)
                    } else {
                        fin_eq(x, y)
                    }
                }
                _ => false,
            })
}

/// The narrowest of two types that both are assignable to, if one of them
/// already is.
pub fn join(a: &Type, b: &Type) -> Option<Type> {
    if assignable(a, b) {
        Some(b.clone())
    } else if assignable(b, a) {
        Some(a.clone())
    } else {
        None
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BuiltinKind;
    use crate::id::UnitId;

    fn def(index: u32) -> DefId {
        DefId {
            unit: UnitId(1),
            index,
        }
    }

    fn list_of(elem: Type, n: u64) -> Type {
        let terminus = BuiltinKind::List.terminus(def(0));
        Type::Instance(
            Instantiation::apply(terminus, vec![TypeArg::Type(elem), TypeArg::Fin(CostExpr::Fin(n))])
                .expect("arity"),
        )
    }

    fn mutable_list_of(elem: Type, n: u64) -> Type {
        let terminus = BuiltinKind::MutableList.terminus(def(1));
        Type::Instance(
            Instantiation::apply(terminus, vec![TypeArg::Type(elem), TypeArg::Fin(CostExpr::Fin(n))])
                .expect("arity"),
        )
    }

    #[test]
    fn type_params_compare_by_identity() {
        let a = TypeParam::new(def(0), 0, "T", ParamKind::Standard);
        let b = TypeParam::new(def(1), 0, "T", ParamKind::Standard);
        assert_ne!(a, b);
        assert_eq!(a, TypeParam::new(def(0), 0, "Other", ParamKind::Standard));
    }

    #[test]
    fn immutable_lists_are_covariant_in_fin() {
        assert!(assignable(&list_of(Type::INT, 2), &list_of(Type::INT, 3)));
        assert!(!assignable(&list_of(Type::INT, 4), &list_of(Type::INT, 3)));
    }

    #[test]
    fn mutable_lists_need_exact_bound() {
        assert!(assignable(
            &mutable_list_of(Type::INT, 3),
            &mutable_list_of(Type::INT, 3)
        ));
        assert!(!assignable(
            &mutable_list_of(Type::INT, 2),
            &mutable_list_of(Type::INT, 3)
        ));
    }

    #[test]
    fn join_picks_wider_list() {
        let joined = join(&list_of(Type::INT, 2), &list_of(Type::INT, 5)).expect("join");
        assert_eq!(joined.to_string(), "List<Int, 5>");
        assert!(join(&Type::INT, &Type::BOOLEAN).is_none());
    }

    #[test]
    fn function_types_display() {
        let f = Type::function(vec![Type::INT, Type::CHAR], Type::BOOLEAN);
        assert_eq!(f.to_string(), "(Int, Char) -> Boolean");
    }

    #[test]
    fn symbolic_fin_le() {
        let n = CostExpr::Param(TypeParam::new(def(2), 0, "N", ParamKind::Fin));
        let m = CostExpr::Param(TypeParam::new(def(2), 1, "M", ParamKind::Fin));
        assert!(fin_le(&n, &n));
        assert!(fin_le(&n, &CostExpr::max([n.clone(), m.clone()])));
        assert!(!fin_le(&n, &m));
        assert!(fin_le(&CostExpr::Fin(0), &m));
    }
}

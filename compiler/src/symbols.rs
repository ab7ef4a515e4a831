// symbols.rs — Definitions and per-unit symbol tables
//
// Each compilation unit owns one `SymbolTable`. The platform table (unit 0)
// holds built-in collections, platform records, and plugins. A unit sees its
// own table, the tables of the units it imports, and the platform table
// through a `SymbolView`; imported tables are read-only snapshots.
//
// Preconditions: none.
// Postconditions: definitions are stored in allocation (source) order, so
//   dumping a table is deterministic.
// Failure modes: inserting a duplicate name returns the existing `DefId`.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::{FunctionDecl, Span};
use crate::builtins::BuiltinKind;
use crate::cost::CostExpr;
use crate::id::{DefId, IdAllocator, UnitId};
use crate::types::{FunctionType, Terminus, TerminusKind, Type, TypeParam};

// ── Definitions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Field {
    pub name: Rc<str>,
    pub ty: Type,
    pub mutable: bool,
}

#[derive(Debug, Clone)]
pub struct RecordInfo {
    pub fields: Vec<Field>,
    pub sum: Option<DefId>,
    pub hash_cost: CostExpr,
}

impl RecordInfo {
    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| &*f.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct SumInfo {
    pub members: Vec<DefId>,
    pub hash_cost: CostExpr,
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub decl: Rc<FunctionDecl>,
    pub params: Vec<Type>,
    /// `None` until the body has been typed when no return type is declared.
    pub ret: Option<Type>,
    /// Static body cost, over the function's own type parameters.
    pub cost: Option<CostExpr>,
    /// Per formal parameter: how many times a function-typed parameter is
    /// invoked per call. `Fin(0)` for ordinary parameters.
    pub multipliers: Vec<CostExpr>,
}

impl FunctionInfo {
    pub fn signature(&self) -> FunctionType {
        FunctionType {
            params: self.params.clone(),
            ret: self.ret.clone().unwrap_or(Type::Error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub signature: FunctionType,
    pub cost: CostExpr,
}

#[derive(Debug, Clone)]
pub enum DefKind {
    Record(RecordInfo),
    Object { sum: Option<DefId> },
    Sum(SumInfo),
    Function(FunctionInfo),
    Builtin(BuiltinKind),
    Plugin(PluginInfo),
}

#[derive(Debug, Clone)]
pub struct Definition {
    pub id: DefId,
    pub name: Rc<str>,
    pub params: Vec<TypeParam>,
    pub kind: DefKind,
    pub span: Option<Span>,
}

impl Definition {
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            DefKind::Record(_) => "record",
            DefKind::Object { .. } => "object",
            DefKind::Sum(_) => "sum",
            DefKind::Function(_) => "function",
            DefKind::Builtin(_) => "built-in",
            DefKind::Plugin(_) => "plugin",
        }
    }

    pub fn is_generic(&self) -> bool {
        !self.params.is_empty()
    }

    /// The chain root for instantiations of this definition. `None` for
    /// objects, which are never parameterized.
    pub fn terminus(&self) -> Option<Rc<Terminus>> {
        let (kind, hash_cost) = match &self.kind {
            DefKind::Record(r) => (TerminusKind::Record { sum: r.sum }, r.hash_cost.clone()),
            DefKind::Sum(s) => (TerminusKind::Sum, s.hash_cost.clone()),
            DefKind::Builtin(b) => return Some(b.terminus_with_params(self.id, &self.params)),
            DefKind::Function(_) => (TerminusKind::Function, CostExpr::ONE),
            DefKind::Plugin(_) => (TerminusKind::Plugin, CostExpr::ONE),
            DefKind::Object { .. } => return None,
        };
        Some(Rc::new(Terminus {
            def: self.id,
            name: Rc::clone(&self.name),
            params: self.params.clone(),
            hash_cost,
            kind,
        }))
    }

    pub fn object_type(&self) -> Option<Type> {
        match self.kind {
            DefKind::Object { sum } => Some(Type::Object {
                def: self.id,
                name: Rc::clone(&self.name),
                sum,
            }),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordInfo> {
        match &self.kind {
            DefKind::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionInfo> {
        match &self.kind {
            DefKind::Function(f) => Some(f),
            _ => None,
        }
    }
}

// ── Symbol table ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SymbolTable {
    pub unit: UnitId,
    defs: Vec<Definition>,
    names: BTreeMap<String, DefId>,
    alloc: IdAllocator,
}

impl SymbolTable {
    pub fn new(unit: UnitId) -> Self {
        Self {
            unit,
            defs: Vec::new(),
            names: BTreeMap::new(),
            alloc: IdAllocator::new(unit),
        }
    }

    /// Insert a new named definition. Returns the existing ID on a clash.
    pub fn insert(
        &mut self,
        name: &str,
        params: Vec<TypeParam>,
        kind: DefKind,
        span: Option<Span>,
    ) -> Result<DefId, DefId> {
        if let Some(existing) = self.names.get(name) {
            return Err(*existing);
        }
        let id = self.reserve();
        self.define(id, name, params, kind, span);
        Ok(id)
    }

    /// Allocate an ID before its definition is known, for definitions whose
    /// parameters must name their owner.
    pub fn reserve(&mut self) -> DefId {
        self.alloc.alloc_def()
    }

    pub fn define(
        &mut self,
        id: DefId,
        name: &str,
        params: Vec<TypeParam>,
        kind: DefKind,
        span: Option<Span>,
    ) {
        self.names.insert(name.to_string(), id);
        self.defs.push(Definition {
            id,
            name: Rc::from(name),
            params,
            kind,
            span,
        });
        self.defs.sort_by_key(|d| d.id);
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Option<DefId> {
        self.names.get(name).copied()
    }

    pub fn def(&self, id: DefId) -> Option<&Definition> {
        if id.unit != self.unit {
            return None;
        }
        self.defs
            .binary_search_by_key(&id, |d| d.id)
            .ok()
            .map(|i| &self.defs[i])
    }

    pub fn def_mut(&mut self, id: DefId) -> Option<&mut Definition> {
        if id.unit != self.unit {
            return None;
        }
        match self.defs.binary_search_by_key(&id, |d| d.id) {
            Ok(i) => Some(&mut self.defs[i]),
            Err(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// Canonical dump: one line per definition, in ID order.
impl fmt::Display for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for def in &self.defs {
            write!(f, "{} {}", def.kind_name(), def.name)?;
            if !def.params.is_empty() {
                write!(f, "<")?;
                for (i, p) in def.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ">")?;
            }
            match &def.kind {
                DefKind::Record(r) => {
                    write!(f, "(")?;
                    for (i, field) in r.fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        if field.mutable {
                            write!(f, "mutable ")?;
                        }
                        write!(f, "{}: {}", field.name, field.ty)?;
                    }
                    write!(f, ") hash {}", r.hash_cost)?;
                }
                DefKind::Sum(s) => write!(f, " hash {}", s.hash_cost)?,
                DefKind::Function(func) => {
                    write!(f, "(")?;
                    for (i, p) in func.params.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", p)?;
                    }
                    write!(f, ")")?;
                    if let Some(ret) = &func.ret {
                        write!(f, ": {}", ret)?;
                    }
                    if let Some(cost) = &func.cost {
                        write!(f, " cost {}", cost)?;
                    }
                }
                DefKind::Plugin(p) => {
                    write!(f, "{} cost {}", Type::Function(Rc::new(p.signature.clone())), p.cost)?;
                }
                DefKind::Object { .. } | DefKind::Builtin(_) => {}
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ── Symbol view ────────────────────────────────────────────────────────────

/// Read-only lookup across the current unit, its imports, and the platform.
/// Names resolve in that order.
#[derive(Clone, Copy)]
pub struct SymbolView<'a> {
    pub local: &'a SymbolTable,
    pub imports: &'a [Rc<SymbolTable>],
    pub platform: &'a SymbolTable,
}

impl<'a> SymbolView<'a> {
    pub fn def(&self, id: DefId) -> Option<&'a Definition> {
        if id.unit == self.local.unit {
            return self.local.def(id);
        }
        if id.unit == self.platform.unit {
            return self.platform.def(id);
        }
        self.imports.iter().find_map(|t| t.def(id))
    }

    pub fn lookup(&self, name: &str) -> Option<DefId> {
        self.local
            .lookup(name)
            .or_else(|| self.imports.iter().find_map(|t| t.lookup(name)))
            .or_else(|| self.platform.lookup(name))
    }

    pub fn lookup_def(&self, name: &str) -> Option<&'a Definition> {
        self.lookup(name).and_then(|id| self.def(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_rejected() {
        let mut table = SymbolTable::new(UnitId(1));
        let first = table
            .insert("Origin", vec![], DefKind::Object { sum: None }, None)
            .expect("first");
        let second = table.insert("Origin", vec![], DefKind::Object { sum: None }, None);
        assert_eq!(second, Err(first));
    }

    #[test]
    fn view_prefers_local_names() {
        let platform = SymbolTable::new(UnitId::PLATFORM);
        let mut local = SymbolTable::new(UnitId(1));
        let id = local
            .insert("A", vec![], DefKind::Object { sum: None }, None)
            .expect("insert");
        let imports: Vec<Rc<SymbolTable>> = Vec::new();
        let view = SymbolView {
            local: &local,
            imports: &imports,
            platform: &platform,
        };
        assert_eq!(view.lookup("A"), Some(id));
        assert_eq!(view.def(id).map(|d| d.kind_name()), Some("object"));
        assert!(view.lookup("B").is_none());
    }

    #[test]
    fn reserved_ids_keep_source_order() {
        let mut table = SymbolTable::new(UnitId(2));
        let sum = table.reserve();
        let member = table
            .insert("Leaf", vec![], DefKind::Object { sum: Some(sum) }, None)
            .expect("member");
        table.define(
            sum,
            "Tree",
            vec![],
            DefKind::Sum(SumInfo {
                members: vec![member],
                hash_cost: CostExpr::Fin(4),
            }),
            None,
        );
        let names: Vec<&str> = table.iter().map(|d| &*d.name).collect();
        assert_eq!(names, vec!["Tree", "Leaf"]);
        insta::assert_snapshot!(table.to_string(), @r"
        sum Tree hash 4
        object Leaf
        ");
    }
}

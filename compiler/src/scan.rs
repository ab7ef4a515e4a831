// scan.rs — Declaration scans: ParamScan, RecordCycle, SymbolScan
//
// Three passes over the unit's top-level declarations, run before any body
// is typed:
//
//   ParamScan   creates the `TypeParam`s of every generic definition;
//   RecordCycle builds the record/sum dependency graph and rejects cycles;
//   SymbolScan  resolves field and signature types and fills the unit's
//               symbol table, records and sums in dependency order.
//
// Preconditions: Bind succeeded (`Declarations` has reserved IDs).
// Postconditions: after SymbolScan every declaration has a `Definition`;
//   function return types are `None` only where none was written.
// Failure modes: duplicate type parameters (E0101), recursive records
//   (E0300, not located in source), unresolvable types (E01xx/E02xx).
// Side effects: none.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::ast::{FieldDecl, TypeExpr, TypeParamDecl};
use crate::cost::{structural_hash_cost, CostExpr};
use crate::diag::{codes, Diagnostic, Location};
use crate::graph::{DepGraph, Sorted};
use crate::id::DefId;
use crate::resolve::{DeclItem, Declarations};
use crate::symbols::{
    DefKind, Field, FunctionInfo, RecordInfo, SumInfo, SymbolTable, SymbolView,
};
use crate::typexpr::resolve_type;
use crate::types::{ParamKind, Type, TypeParam};

pub type ParamMap = BTreeMap<DefId, Vec<TypeParam>>;

// ── ParamScan ───────────────────────────────────────────────────────────────

fn make_params(owner: DefId, decls: &[TypeParamDecl], diags: &mut Vec<Diagnostic>) -> Vec<TypeParam> {
    let mut params: Vec<TypeParam> = Vec::with_capacity(decls.len());
    for (i, p) in decls.iter().enumerate() {
        if params.iter().any(|q| *q.name == *p.name.name) {
            diags.push(Diagnostic::error(
                codes::E0101,
                p.name.span,
                format!("type parameter '{}' already exists", p.name.name),
            ));
            continue;
        }
        let kind = if p.fin {
            ParamKind::Fin
        } else {
            ParamKind::Standard
        };
        params.push(TypeParam::new(owner, i as u16, &p.name.name, kind));
    }
    params
}

pub fn scan_params(decls: &Declarations) -> (ParamMap, Vec<Diagnostic>) {
    let mut map = ParamMap::new();
    let mut diags = Vec::new();
    for item in &decls.items {
        match item {
            DeclItem::Function { def, decl } => {
                map.insert(*def, make_params(*def, &decl.type_params, &mut diags));
            }
            DeclItem::Record {
                def,
                decl,
                sum: None,
                ..
            } => {
                map.insert(*def, make_params(*def, &decl.type_params, &mut diags));
            }
            DeclItem::Sum { def, decl, .. } => {
                map.insert(*def, make_params(*def, &decl.type_params, &mut diags));
            }
            DeclItem::Record { .. } | DeclItem::Object { .. } => {}
        }
    }
    // Members share their sum's parameters.
    for item in &decls.items {
        match item {
            DeclItem::Record {
                def,
                sum: Some(_),
                params_owner,
                ..
            } => {
                let shared = map.get(params_owner).cloned().unwrap_or_default();
                map.insert(*def, shared);
            }
            DeclItem::Object { def, .. } => {
                map.insert(*def, Vec::new());
            }
            _ => {}
        }
    }
    (map, diags)
}

// ── RecordCycle ─────────────────────────────────────────────────────────────

fn mentioned_names<'e>(ty: &'e TypeExpr, out: &mut Vec<&'e str>) {
    match ty {
        TypeExpr::Named { name, args, .. } => {
            out.push(&name.name);
            for a in args {
                mentioned_names(a, out);
            }
        }
        TypeExpr::Function { params, ret, .. } => {
            for p in params {
                mentioned_names(p, out);
            }
            mentioned_names(ret, out);
        }
        TypeExpr::FinOp { args, .. } => {
            for a in args {
                mentioned_names(a, out);
            }
        }
        TypeExpr::FinLit(..) => {}
    }
}

/// Build the record/sum graph. Edges point from a record to every local
/// record or sum its fields mention, and from a sum to its members.
pub fn record_graph(decls: &Declarations, params: &ParamMap) -> DepGraph<DefId> {
    let mut graph = DepGraph::new();
    for item in &decls.items {
        match item {
            DeclItem::Record { def, decl, .. } => {
                graph.add_node(*def);
                let own = params.get(def).map(Vec::as_slice).unwrap_or(&[]);
                let mut names = Vec::new();
                for field in &decl.fields {
                    mentioned_names(&field.ty, &mut names);
                }
                for name in names {
                    if own.iter().any(|p| *p.name == *name) {
                        continue;
                    }
                    if let Some(target) = decls.by_name.get(name) {
                        if matches!(
                            decls.item(*target),
                            Some(DeclItem::Record { .. } | DeclItem::Sum { .. })
                        ) {
                            graph.add_edge(*def, *target);
                        }
                    }
                }
            }
            DeclItem::Sum { def, members, .. } => {
                graph.add_node(*def);
                for m in members {
                    graph.add_edge(*def, *m);
                }
            }
            DeclItem::Object { def, .. } => graph.add_node(*def),
            DeclItem::Function { .. } => {}
        }
    }
    graph
}

/// Sort the record graph (with imported graphs folded in) and report one
/// error per local record or sum on a cycle.
pub fn check_record_cycles(
    decls: &Declarations,
    graph: &DepGraph<DefId>,
) -> (Sorted<DefId>, Vec<Diagnostic>) {
    let sorted = graph.sorted();
    let mut diags = Vec::new();
    for def in &sorted.cycles {
        if let Some(item) = decls.item(*def) {
            diags.push(Diagnostic::error(
                codes::E0300,
                Location::NotInSource,
                format!("recursive record detected: {}", item.name().name),
            ));
        }
    }
    (sorted, diags)
}

// ── SymbolScan ──────────────────────────────────────────────────────────────

pub struct ScanContext<'a> {
    pub imports: &'a [Rc<SymbolTable>],
    pub platform: &'a SymbolTable,
}

struct Scanner<'a> {
    ctx: &'a ScanContext<'a>,
    table: SymbolTable,
    diags: Vec<Diagnostic>,
}

impl<'a> Scanner<'a> {
    fn view(&self) -> SymbolView<'_> {
        SymbolView {
            local: &self.table,
            imports: self.ctx.imports,
            platform: self.ctx.platform,
        }
    }

    fn resolve(&mut self, ty: &TypeExpr, params: &[TypeParam]) -> Type {
        match resolve_type(ty, params, self.view()) {
            Ok(t) => t,
            Err(d) => {
                self.diags.push(d);
                Type::Error
            }
        }
    }

    fn fields(&mut self, decls: &[FieldDecl], params: &[TypeParam]) -> Vec<Field> {
        let mut fields: Vec<Field> = Vec::with_capacity(decls.len());
        for f in decls {
            if fields.iter().any(|g| *g.name == *f.name.name) {
                self.diags.push(Diagnostic::error(
                    codes::E0101,
                    f.name.span,
                    format!("field '{}' already exists", f.name.name),
                ));
                continue;
            }
            let ty = self.resolve(&f.ty, params);
            fields.push(Field {
                name: Rc::from(f.name.name.as_str()),
                ty,
                mutable: f.mutable,
            });
        }
        fields
    }
}

/// Fill `table` (from Bind) with every local definition.
pub fn scan_symbols(
    table: SymbolTable,
    decls: &Declarations,
    params: &ParamMap,
    record_order: &[DefId],
    ctx: &ScanContext<'_>,
) -> (SymbolTable, Vec<Diagnostic>) {
    let mut scanner = Scanner {
        ctx,
        table,
        diags: Vec::new(),
    };
    let params_of = |def: DefId| params.get(&def).cloned().unwrap_or_default();

    for item in &decls.items {
        if let DeclItem::Object { def, name, sum } = item {
            scanner
                .table
                .define(*def, &name.name, Vec::new(), DefKind::Object { sum: *sum }, Some(name.span));
        }
    }

    for def in record_order {
        match decls.item(*def) {
            Some(DeclItem::Record { decl, sum, .. }) => {
                let ps = params_of(*def);
                let fields = scanner.fields(&decl.fields, &ps);
                let hash_cost = CostExpr::sum(fields.iter().map(|f| structural_hash_cost(&f.ty)));
                scanner.table.define(
                    *def,
                    &decl.name.name,
                    ps,
                    DefKind::Record(RecordInfo {
                        fields,
                        sum: *sum,
                        hash_cost,
                    }),
                    Some(decl.span),
                );
            }
            Some(DeclItem::Sum { decl, members, .. }) => {
                let hashes = members.iter().map(|m| match scanner.table.def(*m) {
                    Some(d) => match &d.kind {
                        DefKind::Record(r) => r.hash_cost.clone(),
                        _ => CostExpr::Fin(d.name.chars().count() as u64),
                    },
                    None => CostExpr::ZERO,
                });
                let hash_cost = CostExpr::max(hashes.collect::<Vec<_>>());
                scanner.table.define(
                    *def,
                    &decl.name.name,
                    params_of(*def),
                    DefKind::Sum(SumInfo {
                        members: members.clone(),
                        hash_cost,
                    }),
                    Some(decl.span),
                );
            }
            _ => {}
        }
    }

    for item in &decls.items {
        let DeclItem::Function { def, decl } = item else {
            continue;
        };
        let ps = params_of(*def);
        let param_types: Vec<Type> = decl
            .params
            .iter()
            .map(|p| scanner.resolve(&p.ty, &ps))
            .collect();
        let ret = decl.ret.as_ref().map(|r| scanner.resolve(r, &ps));
        let multipliers = vec![CostExpr::ZERO; param_types.len()];
        scanner.table.define(
            *def,
            &decl.name.name,
            ps,
            DefKind::Function(FunctionInfo {
                decl: Rc::clone(decl),
                params: param_types,
                ret,
                cost: None,
                multipliers,
            }),
            Some(decl.span),
        );
    }

    (scanner.table, scanner.diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::Platform;
    use crate::id::UnitId;
    use crate::parser::parse;
    use crate::plugin::PluginRegistry;
    use crate::resolve::{bind, ImportContext};

    fn scan(src: &str) -> (SymbolTable, Vec<Diagnostic>) {
        let program = parse(src, UnitId(1)).program.expect("program");
        let platform = Platform::new(&PluginRegistry::new()).expect("platform");
        let ctx = ImportContext {
            own_name: "main",
            available: &[],
            platform: &platform.table,
        };
        let bound = bind(&program, UnitId(1), &ctx);
        assert!(bound.diagnostics.is_empty(), "{:?}", bound.diagnostics);
        let (params, mut diags) = scan_params(&bound.decls);
        let graph = record_graph(&bound.decls, &params);
        let (sorted, cycle_diags) = check_record_cycles(&bound.decls, &graph);
        diags.extend(cycle_diags);
        if !diags.is_empty() {
            return (bound.decls.table.clone(), diags);
        }
        let scan_ctx = ScanContext {
            imports: &[],
            platform: &platform.table,
        };
        let (table, more) = scan_symbols(
            bound.decls.table.clone(),
            &bound.decls,
            &params,
            &sorted.order,
            &scan_ctx,
        );
        diags.extend(more);
        (table, diags)
    }

    #[test]
    fn records_are_defined_after_their_dependencies() {
        let (table, diags) = scan(
            "record Outer(inner: Inner, tag: String<4>)\nrecord Inner(x: Int, y: Int)",
        );
        assert!(diags.is_empty(), "{:?}", diags);
        insta::assert_snapshot!(table.to_string(), @r"
        record Outer(inner: Inner, tag: String<4>) hash 6
        record Inner(x: Int, y: Int) hash 2
        ");
    }

    #[test]
    fn generic_sum_members_share_parameters() {
        let (table, diags) = scan("sum Maybe<T> { record Just(value: T); object Nothing }");
        assert!(diags.is_empty(), "{:?}", diags);
        insta::assert_snapshot!(table.to_string(), @r"
        sum Maybe<T> hash Max(hash(T), 7)
        record Just<T>(value: T) hash hash(T)
        object Nothing
        ");
    }

    #[test]
    fn sum_hash_matches_member_object_hash() {
        let (table, diags) = scan("sum Light { object Red; object Amber }");
        assert!(diags.is_empty(), "{:?}", diags);
        let def = |name: &str| table.lookup(name).and_then(|id| table.def(id)).expect(name);
        let amber = def("Amber").object_type().expect("object");
        let DefKind::Sum(sum) = &def("Light").kind else {
            panic!("Light is not a sum");
        };
        assert_eq!(sum.hash_cost, structural_hash_cost(&amber));
    }

    #[test]
    fn mutually_recursive_records_report_each() {
        let (_, diags) = scan("record A(b: B)\nrecord B(a: A)\nrecord C(x: Int)");
        let messages: Vec<String> = diags.iter().map(|d| d.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "error[E0300]: recursive record detected: A",
                "error[E0300]: recursive record detected: B",
            ]
        );
    }

    #[test]
    fn functions_keep_missing_return_types_open() {
        let (table, diags) = scan("def id<T>(x: T): T { x }\ndef one() { 1 }");
        assert!(diags.is_empty(), "{:?}", diags);
        let one = table.lookup("one").and_then(|id| table.def(id)).expect("one");
        assert!(one.as_function().expect("function").ret.is_none());
        let id = table.lookup("id").and_then(|id| table.def(id)).expect("id");
        assert_eq!(
            id.as_function().expect("function").ret.as_ref().map(|t| t.to_string()),
            Some("T".to_string())
        );
    }
}

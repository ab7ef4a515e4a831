// typexpr.rs — Resolve written type expressions into types
//
// Used wherever source text names a type: field and parameter annotations,
// `val` annotations, explicit type arguments, and plugin signatures.
//
// Preconditions: `params` holds the type parameters in scope (those of the
//   enclosing definition).
// Postconditions: every returned `Instance` has a kind-checked argument list.
// Failure modes: unknown names, wrong arity, or kind mismatches → `Diagnostic`.
// Side effects: none.

use crate::ast::{FinOp, TypeExpr};
use crate::cost::CostExpr;
use crate::diag::{codes, Diagnostic};
use crate::subst::Instantiation;
use crate::symbols::{DefKind, SymbolView};
use crate::types::{BasicType, ParamKind, Type, TypeArg, TypeParam};

pub fn resolve_type(
    expr: &TypeExpr,
    params: &[TypeParam],
    symbols: SymbolView<'_>,
) -> Result<Type, Diagnostic> {
    match expr {
        TypeExpr::Named { name, args, span } => {
            if let Some(p) = params.iter().find(|p| *p.name == *name.name) {
                if !args.is_empty() {
                    return Err(Diagnostic::error(
                        codes::E0202,
                        *span,
                        format!("type parameter '{}' takes no type arguments", name.name),
                    ));
                }
                if p.is_fin() {
                    return Err(Diagnostic::error(
                        codes::E0204,
                        *span,
                        format!("Fin parameter '{}' used where a type is expected", name.name),
                    ));
                }
                return Ok(Type::Param(p.clone()));
            }
            if let Some(basic) = BasicType::from_name(&name.name) {
                if !args.is_empty() {
                    return Err(Diagnostic::error(
                        codes::E0202,
                        *span,
                        format!("'{}' takes no type arguments", name.name),
                    ));
                }
                return Ok(Type::Basic(basic));
            }
            let def = symbols.lookup_def(&name.name).ok_or_else(|| {
                Diagnostic::error(
                    codes::E0100,
                    name.span,
                    format!("type '{}' not found", name.name),
                )
            })?;
            if let Some(obj) = def.object_type() {
                if !args.is_empty() {
                    return Err(Diagnostic::error(
                        codes::E0202,
                        *span,
                        format!("object '{}' takes no type arguments", name.name),
                    ));
                }
                return Ok(obj);
            }
            if matches!(def.kind, DefKind::Function(_) | DefKind::Plugin(_)) {
                return Err(Diagnostic::error(
                    codes::E0200,
                    name.span,
                    format!("'{}' is a {}, not a type", name.name, def.kind_name()),
                ));
            }
            let terminus = def.terminus().ok_or_else(|| {
                Diagnostic::error(codes::E0600, *span, "definition without a terminus")
            })?;
            if args.len() != terminus.params.len() {
                return Err(Diagnostic::error(
                    codes::E0202,
                    *span,
                    format!(
                        "'{}' expects {} type argument(s), got {}",
                        name.name,
                        terminus.params.len(),
                        args.len()
                    ),
                ));
            }
            let mut resolved = Vec::with_capacity(args.len());
            for (arg, slot) in args.iter().zip(&terminus.params) {
                resolved.push(resolve_arg(arg, slot.kind, params, symbols)?);
            }
            Instantiation::apply(terminus, resolved)
                .map(Type::Instance)
                .map_err(|e| Diagnostic::error(codes::E0204, *span, e.to_string()))
        }
        TypeExpr::Function { params: ps, ret, .. } => {
            let mut resolved = Vec::with_capacity(ps.len());
            for p in ps {
                resolved.push(resolve_type(p, params, symbols)?);
            }
            Ok(Type::function(resolved, resolve_type(ret, params, symbols)?))
        }
        TypeExpr::FinLit(_, span) | TypeExpr::FinOp { span, .. } => Err(Diagnostic::error(
            codes::E0204,
            *span,
            "a Fin bound is not a type",
        )),
    }
}

/// Resolve an argument for a slot of the given kind.
pub fn resolve_arg(
    expr: &TypeExpr,
    kind: ParamKind,
    params: &[TypeParam],
    symbols: SymbolView<'_>,
) -> Result<TypeArg, Diagnostic> {
    match kind {
        ParamKind::Standard => resolve_type(expr, params, symbols).map(TypeArg::Type),
        ParamKind::Fin => resolve_fin(expr, params).map(TypeArg::Fin),
    }
}

/// Literal bounds, Fin parameters, and `Sum`/`Mul`/`Max` over them.
pub fn resolve_fin(expr: &TypeExpr, params: &[TypeParam]) -> Result<CostExpr, Diagnostic> {
    match expr {
        TypeExpr::FinLit(n, _) => Ok(CostExpr::Fin(*n)),
        TypeExpr::FinOp { op, args, .. } => {
            let mut items = Vec::with_capacity(args.len());
            for a in args {
                items.push(resolve_fin(a, params)?);
            }
            Ok(match op {
                FinOp::Sum => CostExpr::sum(items),
                FinOp::Mul => CostExpr::product(items),
                FinOp::Max => CostExpr::max(items),
            })
        }
        TypeExpr::Named { name, args, span } if args.is_empty() => {
            match params.iter().find(|p| *p.name == *name.name) {
                Some(p) if p.is_fin() => Ok(CostExpr::Param(p.clone())),
                Some(_) => Err(Diagnostic::error(
                    codes::E0204,
                    *span,
                    format!("type parameter '{}' used where a Fin bound is expected", name.name),
                )),
                None => Err(Diagnostic::error(
                    codes::E0204,
                    *span,
                    format!("'{}' is not a Fin bound", name.name),
                )),
            }
        }
        other => Err(Diagnostic::error(
            codes::E0204,
            other.span(),
            "expected a Fin bound",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::Platform;
    use crate::id::{DefId, UnitId};
    use crate::parser::parse_plugin_decls;
    use crate::plugin::PluginRegistry;
    use crate::symbols::SymbolTable;

    fn type_of(decl: &str) -> TypeExpr {
        let result = parse_plugin_decls(decl);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        result.decls[0].ret.clone()
    }

    fn resolve(text: &str, params: &[TypeParam]) -> Result<Type, Diagnostic> {
        let platform = Platform::new(&PluginRegistry::new()).expect("platform");
        let local = SymbolTable::new(UnitId(1));
        let view = SymbolView {
            local: &local,
            imports: &[],
            platform: &platform.table,
        };
        resolve_type(&type_of(&format!("plugin p(): {} cost 1", text)), params, view)
    }

    #[test]
    fn nested_instances() {
        let ty = resolve("List<Pair<Int, String<3>>, 2>", &[]).expect("type");
        assert_eq!(ty.to_string(), "List<Pair<Int, String<3>>, 2>");
    }

    #[test]
    fn fin_parameters_and_ops() {
        let owner = DefId {
            unit: UnitId(1),
            index: 0,
        };
        let params = vec![
            TypeParam::new(owner, 0, "T", ParamKind::Standard),
            TypeParam::new(owner, 1, "N", ParamKind::Fin),
        ];
        let ty = resolve("List<T, Sum(N, 1)>", &params).expect("type");
        assert_eq!(ty.to_string(), "List<T, Sum(N, 1)>");
    }

    #[test]
    fn kind_and_arity_errors() {
        let err = resolve("List<Int>", &[]).unwrap_err();
        assert_eq!(err.code, Some(codes::E0202));
        let err = resolve("List<3, Int>", &[]).unwrap_err();
        assert_eq!(err.code, Some(codes::E0204));
        let err = resolve("Missing", &[]).unwrap_err();
        assert_eq!(err.code, Some(codes::E0100));
    }
}

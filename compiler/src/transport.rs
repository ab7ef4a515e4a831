// transport.rs — Out-of-band argument values for re-invocation
//
// A `TransportValue` is the JSON-friendly shape of a literal argument. It is
// turned into a literal/constructor expression tree so a compiled function
// can be called again without new source text.
//
// Preconditions: none.
// Postconditions: `to_expr` produces an expression using only literals,
//   constructor calls and object references.
// Failure modes: `TransportError` for names that are not identifiers.
// Side effects: none.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{Expr, ExprKind, Ident, Literal, Span, TypeExpr};
use crate::builtins::BuiltinKind;
use crate::id::NodeIdSource;
use crate::types::{Type, TypeArg};
use crate::value::decimal_digits;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum TransportValue {
    Boolean(bool),
    Int(i64),
    Decimal(Decimal),
    Char(char),
    String(String),
    List(Vec<TransportValue>),
    Set(Vec<TransportValue>),
    Dictionary(Vec<(TransportValue, TransportValue)>),
    Pair(Box<TransportValue>, Box<TransportValue>),
    Record {
        name: String,
        fields: Vec<TransportValue>,
    },
    Object(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("'{0}' is not a valid constructor name")]
    BadName(String),
}

impl TransportValue {
    pub fn from_json(text: &str) -> Result<Vec<TransportValue>, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Build the argument expression. Every node gets a fresh ID from `ids`
    /// and the synthetic `span`.
    ///
    /// `expected` is the declared parameter type, when known. An empty
    /// collection has nothing to infer from, so it is written with explicit
    /// type arguments taken from `expected` and a bound of zero.
    pub fn to_expr(
        &self,
        ids: &NodeIdSource,
        span: Span,
        expected: Option<&Type>,
    ) -> Result<Expr, TransportError> {
        let node = |kind| Expr {
            id: ids.next(),
            kind,
            span,
        };
        let call = |name: &str,
                    type_args: Vec<TypeExpr>,
                    args: &[(&TransportValue, Option<&Type>)]|
         -> Result<Expr, TransportError> {
            let args = args
                .iter()
                .map(|(a, t)| a.to_expr(ids, span, *t))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(node(ExprKind::Call {
                callee: Ident::new(name, span),
                type_args,
                args,
            }))
        };
        let expected_args: Vec<TypeArg> = expected
            .and_then(Type::as_instance)
            .map(|inst| inst.args())
            .unwrap_or_default();
        let type_at = |i: usize| expected_args.get(i).and_then(TypeArg::as_type);
        let empty_args = |kind: BuiltinKind| -> Vec<TypeExpr> {
            if expected.and_then(Type::builtin).map(BuiltinKind::frozen) != Some(kind) {
                return Vec::new();
            }
            empty_type_args(&expected_args, kind, span).unwrap_or_default()
        };
        match self {
            TransportValue::Boolean(b) => Ok(node(ExprKind::Literal(Literal::Boolean(*b)))),
            TransportValue::Int(n) => Ok(node(ExprKind::Literal(Literal::Int(*n)))),
            TransportValue::Decimal(d) => {
                let digits = u32::try_from(decimal_digits(d)).unwrap_or(u32::MAX);
                Ok(node(ExprKind::Literal(Literal::Decimal(*d, digits))))
            }
            TransportValue::Char(c) => Ok(node(ExprKind::Literal(Literal::Char(*c)))),
            TransportValue::String(s) => Ok(node(ExprKind::Literal(Literal::String(s.clone())))),
            TransportValue::List(items) | TransportValue::Set(items) => {
                let kind = match self {
                    TransportValue::List(_) => BuiltinKind::List,
                    _ => BuiltinKind::Set,
                };
                let type_args = if items.is_empty() { empty_args(kind) } else { Vec::new() };
                let elem = type_at(0);
                let args: Vec<_> = items.iter().map(|a| (a, elem)).collect();
                call(kind.name(), type_args, &args)
            }
            TransportValue::Dictionary(entries) => {
                let type_args = if entries.is_empty() {
                    empty_args(BuiltinKind::Dictionary)
                } else {
                    Vec::new()
                };
                let (key, value) = (type_at(0), type_at(1));
                let pairs = entries
                    .iter()
                    .map(|(k, v)| {
                        let first = k.to_expr(ids, span, key)?;
                        let second = v.to_expr(ids, span, value)?;
                        Ok(node(ExprKind::Call {
                            callee: Ident::new("Pair", span),
                            type_args: Vec::new(),
                            args: vec![first, second],
                        }))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(node(ExprKind::Call {
                    callee: Ident::new("Dictionary", span),
                    type_args,
                    args: pairs,
                }))
            }
            TransportValue::Pair(a, b) => {
                let pair = expected
                    .and_then(Type::as_instance)
                    .is_some_and(|inst| &*inst.terminus().name == "Pair");
                let (first, second) = if pair { (type_at(0), type_at(1)) } else { (None, None) };
                call("Pair", Vec::new(), &[(a.as_ref(), first), (b.as_ref(), second)])
            }
            TransportValue::Record { name, fields } => {
                check_name(name)?;
                let args: Vec<_> = fields.iter().map(|f| (f, None)).collect();
                call(name, Vec::new(), &args)
            }
            TransportValue::Object(name) => {
                check_name(name)?;
                Ok(node(ExprKind::Ref(Ident::new(name.as_str(), span))))
            }
        }
    }
}

/// Explicit arguments for an empty `kind` constructor: the expected element
/// types and a zero bound. `None` when an element type cannot be written.
fn empty_type_args(expected: &[TypeArg], kind: BuiltinKind, span: Span) -> Option<Vec<TypeExpr>> {
    if expected.len() != kind.fin_index() + 1 {
        return None;
    }
    expected
        .iter()
        .enumerate()
        .map(|(i, arg)| {
            if i == kind.fin_index() {
                Some(TypeExpr::FinLit(0, span))
            } else {
                type_expr(arg.as_type()?, span)
            }
        })
        .collect()
}

/// Write a concrete type back as a type expression.
fn type_expr(ty: &Type, span: Span) -> Option<TypeExpr> {
    let named = |name: &str, args| TypeExpr::Named {
        name: Ident::new(name, span),
        args,
        span,
    };
    match ty {
        Type::Basic(b) => Some(named(b.name(), Vec::new())),
        Type::Object { name, .. } => Some(named(&**name, Vec::new())),
        Type::Function(f) => Some(TypeExpr::Function {
            params: f
                .params
                .iter()
                .map(|p| type_expr(p, span))
                .collect::<Option<Vec<_>>>()?,
            ret: Box::new(type_expr(&f.ret, span)?),
            span,
        }),
        Type::Instance(inst) => {
            let args = inst
                .args()
                .iter()
                .map(|a| match a {
                    TypeArg::Type(t) => type_expr(t, span),
                    TypeArg::Fin(c) => c.evaluate().map(|n| TypeExpr::FinLit(n, span)),
                })
                .collect::<Option<Vec<_>>>()?;
            Some(named(&*inst.terminus().name, args))
        }
        Type::Param(_) | Type::Error => None,
    }
}

fn check_name(name: &str) -> Result<(), TransportError> {
    let mut chars = name.chars();
    let ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(TransportError::BadName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::Platform;
    use crate::cost::CostExpr;
    use crate::id::UnitId;
    use crate::plugin::PluginRegistry;

    fn span() -> Span {
        (0..0).into()
    }

    #[test]
    fn json_shape_is_tagged() {
        let args = TransportValue::from_json(
            r#"[{"kind":"int","value":4},{"kind":"list","value":[{"kind":"char","value":"a"}]},{"kind":"decimal","value":"3.25"}]"#,
        )
        .expect("json");
        assert_eq!(
            args,
            vec![
                TransportValue::Int(4),
                TransportValue::List(vec![TransportValue::Char('a')]),
                TransportValue::Decimal(Decimal::new(325, 2)),
            ]
        );
    }

    #[test]
    fn dictionary_becomes_pair_constructors() {
        let ids = NodeIdSource::new(UnitId(9));
        let value = TransportValue::Dictionary(vec![(TransportValue::Int(1), TransportValue::Boolean(true))]);
        let expr = value.to_expr(&ids, span(), None).expect("expr");
        let ExprKind::Call { callee, args, .. } = &expr.kind else {
            panic!("expected a call, got {:?}", expr.kind);
        };
        assert_eq!(callee.name, "Dictionary");
        assert!(matches!(&args[0].kind, ExprKind::Call { callee, .. } if callee.name == "Pair"));
    }

    #[test]
    fn empty_collections_take_the_expected_element_type() {
        let platform = Platform::new(&PluginRegistry::new()).expect("platform");
        let ids = NodeIdSource::new(UnitId(9));
        let expected = platform.instance(
            BuiltinKind::List,
            vec![TypeArg::Type(platform.string(CostExpr::Fin(4))), TypeArg::Fin(CostExpr::Fin(7))],
        );
        let expr = TransportValue::List(Vec::new())
            .to_expr(&ids, span(), Some(&expected))
            .expect("expr");
        let ExprKind::Call { type_args, args, .. } = &expr.kind else {
            panic!("expected a call, got {:?}", expr.kind);
        };
        assert!(args.is_empty());
        let [TypeExpr::Named { name, args: elem, .. }, TypeExpr::FinLit(0, _)] = type_args.as_slice() else {
            panic!("unexpected type arguments {:?}", type_args);
        };
        assert_eq!(name.name, "String");
        assert!(matches!(elem.as_slice(), [TypeExpr::FinLit(4, _)]));

        let untyped = TransportValue::Set(Vec::new()).to_expr(&ids, span(), Some(&expected)).expect("expr");
        assert!(matches!(&untyped.kind, ExprKind::Call { type_args, .. } if type_args.is_empty()));
    }

    #[test]
    fn rejects_invalid_names() {
        let ids = NodeIdSource::new(UnitId(9));
        let bad = TransportValue::Object("not a name".into());
        assert_eq!(
            bad.to_expr(&ids, span(), None).map(|_| ()),
            Err(TransportError::BadName("not a name".into()))
        );
    }

    #[test]
    fn decimal_literal_keeps_its_digits() {
        let ids = NodeIdSource::new(UnitId(9));
        let expr = TransportValue::Decimal(Decimal::new(-1050, 2))
            .to_expr(&ids, span(), None)
            .expect("expr");
        assert!(matches!(
            expr.kind,
            ExprKind::Literal(Literal::Decimal(d, 4)) if d == Decimal::new(-1050, 2)
        ));
    }
}

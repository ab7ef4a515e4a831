// Property-based tests for the type and cost invariants.
//
// Four categories:
// 1. Instantiation replay: round-trip and chain composition
// 2. Loop cost: a loop over a bound-n source costs n * body + base
// 3. Fin boundary: filling to the bound succeeds, the next insertion fails
// 4. Freezing: same contents, mutability stripped, second freeze fails
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use proptest::prelude::*;

use tally::arch::Architecture;
use tally::builtins::BuiltinKind;
use tally::cost::CostExpr;
use tally::id::{DefId, UnitId};
use tally::plugin::PluginRegistry;
use tally::session::Session;
use tally::subst::{Instantiation, Substitution};
use tally::types::{ParamKind, Type, TypeArg, TypeParam};
use tally::value::{RuntimeError, Value};

// ── Test helpers ────────────────────────────────────────────────────────────

fn def(index: u32) -> DefId {
    DefId {
        unit: UnitId(1),
        index,
    }
}

fn list_of(n: usize) -> String {
    let items: Vec<String> = (0..n).map(|i| i.to_string()).collect();
    format!("List({})", items.join(", "))
}

fn compiled_cost(source: &str) -> u64 {
    let mut s = Session::new(Architecture::default().with_ceiling(u64::MAX), PluginRegistry::standard())
        .expect("session");
    let artifact = s.compile("main", source).expect("compile");
    artifact.cost().expect("concrete cost")
}

fn arb_bound() -> impl Strategy<Value = u64> {
    1u64..24
}

// ── 1. Replay ───────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn apply_then_replay_round_trips(n in 0u64..10_000) {
        let args = vec![TypeArg::Type(Type::INT), TypeArg::Fin(CostExpr::Fin(n))];
        let inst = Instantiation::apply(BuiltinKind::List.terminus(def(0)), args.clone())
            .expect("apply");
        prop_assert_eq!(inst.args(), args);
    }

    #[test]
    fn chains_compose(k in 0u64..10_000, extra in 0u64..100) {
        // `List<Int, Sum(N, extra)>` written inside `def f<#N>`, then N := k.
        let n = TypeParam::new(def(7), 0, "N", ParamKind::Fin);
        let bound = CostExpr::sum([CostExpr::Param(n.clone()), CostExpr::Fin(extra)]);
        let inner = Instantiation::apply(
            BuiltinKind::List.terminus(def(0)),
            vec![TypeArg::Type(Type::INT), TypeArg::Fin(bound)],
        )
        .expect("inner");
        let outer = Substitution::zip(&[n], vec![TypeArg::Fin(CostExpr::Fin(k))]);
        let composed = inner.extend(outer.clone());
        let stepwise: Vec<TypeArg> = inner.args().iter().map(|a| outer.apply_arg(a)).collect();
        prop_assert_eq!(composed.args(), stepwise);
        prop_assert_eq!(
            composed.arg(1).and_then(|a| a.as_fin().and_then(|c| c.evaluate())),
            Some(k + extra)
        );
    }
}

// ── 2. Loop cost ────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        max_shrink_iters: 50,
        .. ProptestConfig::default()
    })]

    #[test]
    fn loop_cost_is_bound_times_body(n in 1usize..40) {
        // for: 1, source: call 1 + n literals, body block `{ x + 1 }`: 4
        let cost = compiled_cost(&format!("for (x in {}) {{ x + 1 }}", list_of(n)));
        prop_assert_eq!(cost, 1 + (1 + n as u64) + 4 * n as u64);
    }
}

// ── 3. Fin boundary ─────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn insertion_fails_exactly_past_the_bound(bound in arb_bound()) {
        let list = Value::list(Vec::new(), bound, true).expect("empty list");
        for i in 0..bound {
            prop_assert!(list.add(Value::Int(i as i64)).is_ok());
        }
        prop_assert_eq!(
            list.add(Value::Int(-1)),
            Err(RuntimeError::FinViolation {
                kind: "list",
                bound,
                count: bound as usize + 1
            })
        );
    }

    #[test]
    fn evaluated_program_hits_the_same_boundary(bound in 1u64..8) {
        let fill = (0..bound)
            .map(|i| format!("m.add({})", i))
            .collect::<Vec<_>>()
            .join("\n");
        let ok = format!("mutable m = MutableList<Int, {}>()\n{}\nm.size()", bound, fill);
        let mut s = Session::new(Architecture::default(), PluginRegistry::standard()).expect("session");
        prop_assert_eq!(s.run("ok", &ok).expect("fills to bound"), Value::Int(bound as i64));
        let over = format!("{}\nm.add(99)", ok);
        prop_assert!(s.run("over", &over).is_err());
    }
}

// ── 4. Freezing ─────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn freeze_keeps_contents(items in prop::collection::vec(-50i64..50, 0..10)) {
        let values: Vec<Value> = items.iter().map(|n| Value::Int(*n)).collect();
        for original in [
            Value::list(values.clone(), 16, true).expect("list"),
            Value::set(values.clone(), 16, true).expect("set"),
        ] {
            let frozen = original.freeze().expect("freeze");
            prop_assert!(!frozen.is_mutable());
            prop_assert_eq!(frozen.elements().expect("elements"), original.elements().expect("elements"));
            let second = frozen.freeze();
            prop_assert!(
                matches!(second, Err(RuntimeError::ImmutableViolation { .. })),
                "second freeze must fail"
            );
        }
    }
}

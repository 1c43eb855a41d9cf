//! Roster and validator properties for the built-in policies.

use proptest::prelude::*;
use serde_json::{json, Value};

use classmesh_core::validator::ValidatorConfig;
use classmesh_testkit::fuzz::arb_roster_ops;
use classmesh_testkit::strategies::{
    arb_invalid_params, arb_out_of_range_params, arb_signal, arb_undeclared_event, arb_valid_params,
};
use classmesh_testkit::{PolicyHarness, RosterOp};

fn policies() -> Vec<(&'static str, Value)> {
    vec![
        ("ring", json!({})),
        ("mesh", json!({})),
        ("broadcast", json!({})),
        ("broadcast", json!({ "host": "u0" })),
        ("breakout", json!({ "rooms": 2, "room_policy": { "policy": "ring" } })),
        ("breakout", json!({ "rooms": 3, "room_policy": { "policy": "mesh" }, "seed": 7 })),
    ]
}

const VALIDATORS: [&str; 4] = [
    r#"[{"params": {"size": {"type": "int", "min": 2, "max": 40}}}]"#,
    r#"[
        {"params": {"mode": {"type": "string", "values": ["lecture", "seminar"]}, "ratio": {"type": "float", "min": 0, "max": 1}}},
        {"params": {"host": {"type": "option", "inner": {"type": "string"}}, "muted": {"type": "boolean"}}}
    ]"#,
    r#"[{"params": {"room_policy": {"type": "policy", "policies": ["ring", "mesh"]}, "rooms": {"type": "int", "min": 1, "max": 8}}}]"#,
    r#"[
        {"signal": {"events": ["move"], "fields": {"room": {"type": "int", "min": 0, "max": 3}, "user": {"type": "option", "inner": {"type": "string"}}}}},
        {"signal": {"events": ["promote"], "fields": {"user": {"type": "string"}}}}
    ]"#,
];

fn validator(i: usize) -> ValidatorConfig {
    ValidatorConfig::from_json(VALIDATORS[i]).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn links_only_join_members(ops in arb_roster_ops(6, 1..40)) {
        for (policy, params) in policies() {
            let mut h = PolicyHarness::new(policy, params).unwrap();
            for op in &ops {
                h.apply(op).unwrap();
                let checked = h.check_invariants();
                prop_assert!(checked.is_ok(), "{} after {:?}: {:?}", policy, op, checked);
            }
        }
    }

    #[test]
    fn leaving_leaves_no_trace(ops in arb_roster_ops(5, 1..30)) {
        for (policy, params) in policies() {
            let mut h = PolicyHarness::new(policy, params).unwrap();
            for op in &ops {
                h.apply(op).unwrap();
                if let RosterOp::Leave(u) = op {
                    let checked = h.check_left(u);
                    prop_assert!(checked.is_ok(), "{}: {:?}", policy, checked);
                }
            }
        }
    }

    #[test]
    fn restored_networks_issue_the_same_effects(
        prefix in arb_roster_ops(5, 0..20),
        suffix in arb_roster_ops(5, 1..20),
    ) {
        for (policy, params) in policies() {
            let mut original = PolicyHarness::new(policy, params).unwrap();
            for op in &prefix {
                original.apply(op).unwrap();
            }
            let snapshot = original.snapshot().unwrap();
            let mut restored = original.restore(&snapshot).unwrap();
            prop_assert_eq!(restored.snapshot().unwrap(), snapshot);
            original.take_effects();

            for op in &suffix {
                original.apply(op).unwrap();
                restored.apply(op).unwrap();
            }
            prop_assert_eq!(original.take_effects(), restored.take_effects(), "policy {}", policy);
            prop_assert_eq!(original.snapshot().unwrap(), restored.snapshot().unwrap());
        }
    }
}

proptest! {
    #[test]
    fn ranged_sizes_validate(params in arb_valid_params(&validator(0))) {
        prop_assert!(validator(0).validate_params(&params));
    }

    #[test]
    fn alternative_schemas_validate(params in arb_valid_params(&validator(1))) {
        prop_assert!(validator(1).validate_params(&params));
    }

    #[test]
    fn wrong_kinds_never_validate(params in arb_invalid_params(&validator(2)).unwrap()) {
        prop_assert!(!validator(2).validate_params(&params));
    }

    #[test]
    fn out_of_range_sizes_never_validate(params in arb_out_of_range_params(&validator(0)).unwrap()) {
        prop_assert!(!validator(0).validate_params(&params));
    }

    #[test]
    fn out_of_range_rooms_never_validate(params in arb_out_of_range_params(&validator(2)).unwrap()) {
        prop_assert!(!validator(2).validate_params(&params));
    }

    #[test]
    fn sampled_signals_validate((event, payload) in arb_signal(&validator(3)).unwrap()) {
        prop_assert!(validator(3).validate_signal(&event, &payload), "{event} {payload}");
    }

    #[test]
    fn undeclared_events_are_rejected((event, payload) in arb_undeclared_event(&validator(3))) {
        prop_assert!(!validator(3).validate_signal(&event, &payload));
    }

    #[test]
    fn guarded_policies_accept_sampled_params(params in arb_valid_params(&validator(2))) {
        let json = classmesh_core::value::params_to_json(&params);
        let h = PolicyHarness::with_validator("breakout", VALIDATORS[2], json);
        prop_assert!(h.is_ok(), "{:?}", h.err());
    }
}

//! Proptest strategies derived from validator configs.
//!
//! The same [`ValidatorConfig`] that gates parameters and signals at runtime
//! describes what a well-formed input looks like, so it can be sampled:
//!
//! ```rust,no_run
//! use classmesh_core::validator::ValidatorConfig;
//! use classmesh_testkit::strategies::arb_valid_params;
//! use proptest::prelude::*;
//!
//! let cfg = ValidatorConfig::from_json(r#"[{"params": {"size": {"type": "int", "min": 2, "max": 4}}}]"#).unwrap();
//! proptest!(|(params in arb_valid_params(&cfg))| {
//!     prop_assert!(cfg.validate_params(&params));
//! });
//! ```
//!
//! Unsatisfiable constraints (an allowed-value list that contradicts the
//! bounds, an empty range) fall back to unconstrained values of the right
//! kind, which then fail validation.

use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest::strategy::Union;
use serde_json::Value;

use classmesh_core::validator::{Alternative, Constraint, ValidatorConfig};
use classmesh_core::value::{params_to_json, ParamValue, Params, ValueKind};

/// Kinds a present value can have.
pub const SCALAR_KINDS: [ValueKind; 5] =
    [ValueKind::Int, ValueKind::Float, ValueKind::Boolean, ValueKind::String, ValueKind::Policy];

const FLOAT_SPAN: f64 = 1.0e6;

/// Any value of `kind`. Ints mix small values with the full `i128` range.
pub fn arb_of_kind(kind: ValueKind) -> BoxedStrategy<ParamValue> {
    match kind {
        ValueKind::Int => prop_oneof![-1_000i128..1_000, any::<i128>()].prop_map(ParamValue::Int).boxed(),
        ValueKind::Float => (-FLOAT_SPAN..FLOAT_SPAN).prop_map(ParamValue::Float).boxed(),
        ValueKind::Boolean => any::<bool>().prop_map(ParamValue::Boolean).boxed(),
        ValueKind::String => "[a-z][a-z0-9_-]{0,11}".prop_map(ParamValue::String).boxed(),
        ValueKind::Policy => "[a-z]{3,8}"
            .prop_map(|name| ParamValue::Policy { name, params: Params::new() })
            .boxed(),
        ValueKind::Option => prop_oneof![
            Just(ParamValue::Option(None)),
            arb_of_kind(ValueKind::String).prop_map(|v| ParamValue::Option(Some(Box::new(v)))),
        ]
        .boxed(),
    }
}

/// Values that `c` admits.
pub fn arb_admitted(c: &Constraint) -> BoxedStrategy<ParamValue> {
    if c.kind == ValueKind::Option {
        let inner = match c.inner.as_deref() {
            Some(inner) => arb_admitted(inner),
            None => arb_of_kind(ValueKind::String),
        };
        return prop_oneof![
            1 => Just(ParamValue::Option(None)),
            3 => inner.prop_map(|v| ParamValue::Option(Some(Box::new(v)))),
        ]
        .boxed();
    }

    if let Some(values) = &c.values {
        let admitted: Vec<ParamValue> = values.iter().filter(|v| c.admits(Some(v))).cloned().collect();
        if !admitted.is_empty() {
            return proptest::sample::select(admitted).boxed();
        }
    }

    match c.kind {
        ValueKind::Int => int_in_bounds(c),
        ValueKind::Float => float_in_bounds(c),
        ValueKind::Policy => match &c.policies {
            Some(names) if !names.is_empty() => proptest::sample::select(names.clone())
                .prop_map(|name| ParamValue::Policy { name, params: Params::new() })
                .boxed(),
            _ => arb_of_kind(ValueKind::Policy),
        },
        kind => arb_of_kind(kind),
    }
}

fn int_in_bounds(c: &Constraint) -> BoxedStrategy<ParamValue> {
    if c.min.is_none() && c.max.is_none() {
        return arb_of_kind(ValueKind::Int);
    }
    let lo = match &c.min {
        Some(ParamValue::Int(v)) => *v,
        Some(ParamValue::Float(f)) => f.ceil() as i128,
        _ => i128::MIN,
    };
    let hi = match &c.max {
        Some(ParamValue::Int(v)) => *v,
        Some(ParamValue::Float(f)) => f.floor() as i128,
        _ => i128::MAX,
    };
    if lo > hi {
        return arb_of_kind(ValueKind::Int);
    }
    (lo..=hi).prop_map(ParamValue::Int).boxed()
}

fn float_in_bounds(c: &Constraint) -> BoxedStrategy<ParamValue> {
    let bound = |b: &Option<ParamValue>| match b {
        Some(ParamValue::Int(v)) => Some(*v as f64),
        Some(ParamValue::Float(f)) => Some(*f),
        _ => None,
    };
    let (lo, hi) = match (bound(&c.min), bound(&c.max)) {
        (Some(lo), Some(hi)) => (lo, hi),
        (Some(lo), None) => (lo, lo + FLOAT_SPAN),
        (None, Some(hi)) => (hi - FLOAT_SPAN, hi),
        (None, None) => (-FLOAT_SPAN, FLOAT_SPAN),
    };
    if !(lo <= hi) || !lo.is_finite() || !hi.is_finite() {
        return arb_of_kind(ValueKind::Float);
    }
    (lo..=hi).prop_map(ParamValue::Float).boxed()
}

/// Values for a constraint block. Optional names are sometimes left out.
fn arb_block(block: &BTreeMap<String, Constraint>) -> BoxedStrategy<Params> {
    let names: Vec<String> = block.keys().cloned().collect();
    let fields: Vec<BoxedStrategy<Option<ParamValue>>> = block
        .values()
        .map(|c| {
            let present = arb_admitted(c).prop_map(Some);
            if c.is_optional() {
                prop_oneof![1 => Just(None), 3 => present].boxed()
            } else {
                present.boxed()
            }
        })
        .collect();
    fields
        .prop_map(move |values| {
            names
                .iter()
                .cloned()
                .zip(values)
                .filter_map(|(n, v)| v.map(|v| (n, v)))
                .collect()
        })
        .boxed()
}

/// Parameter sets satisfying `alt`. An alternative without a params block
/// accepts anything, so arbitrary small maps are produced.
pub fn arb_alternative_params(alt: &Alternative) -> BoxedStrategy<Params> {
    match &alt.params {
        Some(block) => arb_block(block),
        None => {
            let any_kind = proptest::sample::select(SCALAR_KINDS.to_vec()).prop_flat_map(arb_of_kind);
            proptest::collection::btree_map("[a-z]{1,6}", any_kind, 0..4).boxed()
        }
    }
}

/// Parameter sets satisfying at least one alternative of `cfg`.
pub fn arb_valid_params(cfg: &ValidatorConfig) -> BoxedStrategy<Params> {
    Union::new(cfg.alternatives().iter().map(arb_alternative_params)).boxed()
}

/// Parameter sets that every alternative of `cfg` rejects.
///
/// Each constrained name gets a value whose kind no alternative admits for
/// it. Returns `None` when no such input exists: some alternative leaves
/// params unconstrained, or a name is admitted with every kind.
pub fn arb_invalid_params(cfg: &ValidatorConfig) -> Option<BoxedStrategy<Params>> {
    let mut admitted: BTreeMap<String, Vec<ValueKind>> = BTreeMap::new();
    for alt in cfg.alternatives() {
        let block = alt.params.as_ref()?;
        if block.is_empty() {
            return None;
        }
        for (name, c) in block {
            admitted.entry(name.clone()).or_default().push(present_kind(c));
        }
    }

    let mut names = Vec::with_capacity(admitted.len());
    let mut fields = Vec::with_capacity(admitted.len());
    for (name, kinds) in admitted {
        let wrong: Vec<ValueKind> = SCALAR_KINDS.iter().copied().filter(|k| !kinds.contains(k)).collect();
        if wrong.is_empty() {
            return None;
        }
        names.push(name);
        fields.push(proptest::sample::select(wrong).prop_flat_map(arb_of_kind).boxed());
    }
    Some(fields.prop_map(move |values| names.iter().cloned().zip(values).collect()).boxed())
}

/// Values of the right kind that `c` rejects: below `min`, above `max`,
/// outside the allowed set or naming a policy not on the list. `None` when
/// `c` constrains nothing beyond its kind.
pub fn arb_out_of_range(c: &Constraint) -> Option<BoxedStrategy<ParamValue>> {
    if let (ValueKind::Option, Some(inner)) = (c.kind, c.inner.as_deref()) {
        return arb_out_of_range(inner);
    }

    const STEP: i128 = 1_000;
    let mut variants: Vec<BoxedStrategy<ParamValue>> = Vec::new();
    match c.kind {
        ValueKind::Int => {
            if let Some(ParamValue::Int(min)) = c.min {
                if min > i128::MIN + STEP {
                    variants.push((1..STEP).prop_map(move |d| ParamValue::Int(min - d)).boxed());
                }
            }
            if let Some(ParamValue::Int(max)) = c.max {
                if max < i128::MAX - STEP {
                    variants.push((1..STEP).prop_map(move |d| ParamValue::Int(max + d)).boxed());
                }
            }
        }
        ValueKind::Float => {
            let bound = |b: &Option<ParamValue>| match b {
                Some(ParamValue::Int(v)) => Some(*v as f64),
                Some(ParamValue::Float(f)) => Some(*f),
                _ => None,
            };
            if let Some(min) = bound(&c.min).filter(|m| m.is_finite()) {
                variants.push((0.01..10.0f64).prop_map(move |f| ParamValue::Float(min - (1.0 + min.abs()) * f)).boxed());
            }
            if let Some(max) = bound(&c.max).filter(|m| m.is_finite()) {
                variants.push((0.01..10.0f64).prop_map(move |f| ParamValue::Float(max + (1.0 + max.abs()) * f)).boxed());
            }
        }
        ValueKind::Policy => {
            if let Some(names) = c.policies.clone() {
                variants.push(
                    "[a-z]{3,8}"
                        .prop_filter("policy must not be listed", move |n| !names.contains(n))
                        .prop_map(|name| ParamValue::Policy { name, params: Params::new() })
                        .boxed(),
                );
            }
        }
        _ => {}
    }

    if let Some(allowed) = c.values.clone() {
        if matches!(c.kind, ValueKind::Int | ValueKind::String) {
            variants.push(
                arb_of_kind(c.kind)
                    .prop_filter("value must not be allowed", move |v| !allowed.contains(v))
                    .boxed(),
            );
        }
    }

    if variants.is_empty() {
        return None;
    }
    Some(Union::new(variants).boxed())
}

/// Parameter sets of the right kinds that every alternative of `cfg` rejects.
///
/// Starts from a sample satisfying one alternative and pushes one of its
/// names out of range. Returns `None` when some alternative leaves params
/// unconstrained or no name has a range to leave.
pub fn arb_out_of_range_params(cfg: &ValidatorConfig) -> Option<BoxedStrategy<Params>> {
    let mut variants: Vec<BoxedStrategy<Params>> = Vec::new();
    for alt in cfg.alternatives() {
        let block = alt.params.as_ref()?;
        for (name, c) in block {
            let Some(bad) = arb_out_of_range(c) else { continue };
            let name = name.clone();
            variants.push(
                (arb_block(block), bad)
                    .prop_map(move |(mut params, v)| {
                        params.insert(name.clone(), v);
                        params
                    })
                    .boxed(),
            );
        }
    }
    if variants.is_empty() {
        return None;
    }
    let cfg = cfg.clone();
    Some(
        Union::new(variants)
            .prop_filter("must violate every alternative", move |p| !cfg.validate_params(p))
            .boxed(),
    )
}

/// Kind a present value must have to satisfy `c`.
fn present_kind(c: &Constraint) -> ValueKind {
    match (c.kind, c.inner.as_deref()) {
        (ValueKind::Option, Some(inner)) => present_kind(inner),
        (kind, _) => kind,
    }
}

/// `(event, payload)` pairs accepted by some signal alternative, or `None`
/// when `cfg` declares no signals.
pub fn arb_signal(cfg: &ValidatorConfig) -> Option<BoxedStrategy<(String, Value)>> {
    let shapes: Vec<BoxedStrategy<(String, Value)>> = cfg
        .alternatives()
        .iter()
        .filter_map(|alt| alt.signal.as_ref())
        .map(|shape| {
            let events = proptest::sample::select(shape.events.clone());
            (events, arb_block(&shape.fields))
                .prop_map(|(event, fields)| (event, params_to_json(&fields)))
                .boxed()
        })
        .collect();
    if shapes.is_empty() {
        return None;
    }
    Some(Union::new(shapes).boxed())
}

/// Events no alternative declares, paired with arbitrary payloads.
pub fn arb_undeclared_event(cfg: &ValidatorConfig) -> BoxedStrategy<(String, Value)> {
    let declared: Vec<String> = cfg
        .alternatives()
        .iter()
        .filter_map(|a| a.signal.as_ref())
        .flat_map(|s| s.events.iter().cloned())
        .collect();
    "[a-z]{1,10}"
        .prop_filter("event must be undeclared", move |e| !declared.contains(e))
        .prop_map(|e| (e, Value::Object(Default::default())))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::test_runner::TestRunner;

    fn cfg(s: &str) -> ValidatorConfig {
        ValidatorConfig::from_json(s).unwrap()
    }

    #[test]
    fn unconstrained_alternative_has_no_invalid_inputs() {
        let c = cfg(r#"[{"params": {"n": {"type": "int"}}}, {}]"#);
        assert!(arb_invalid_params(&c).is_none());
    }

    #[test]
    fn bounded_ints_stay_in_range() {
        let c = Constraint::int_range(-3, 3);
        let mut runner = TestRunner::default();
        runner
            .run(&arb_admitted(&c), |v| {
                prop_assert!(matches!(v, ParamValue::Int(i) if (-3..=3).contains(&i)));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn out_of_range_ints_miss_both_ends() {
        let c = Constraint::int_range(2, 40);
        let mut runner = TestRunner::default();
        runner
            .run(&arb_out_of_range(&c).unwrap(), |v| {
                prop_assert!(matches!(v, ParamValue::Int(i) if i < 2 || i > 40));
                prop_assert!(!c.admits(Some(&v)));
                Ok(())
            })
            .unwrap();
        assert!(arb_out_of_range(&Constraint::of(ValueKind::Boolean)).is_none());
    }

    #[test]
    fn signal_strategy_requires_signals() {
        assert!(arb_signal(&cfg(r#"[{"params": {}}]"#)).is_none());
    }
}

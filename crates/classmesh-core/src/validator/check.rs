//! Any-of-one-alternative matching.
//!
//! Kinds are matched exactly: an int never satisfies a float constraint and
//! vice versa. Numeric bounds may be written as either kind.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{Constraint, ValidatorConfig};
use crate::value::{ParamValue, Params, ValueKind};

/// Outcome of checking a parameter set or signal against a config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Index of the first alternative that matched.
    pub matched: Option<usize>,
    /// Per-alternative rejection reasons, in alternative order.
    pub failures: Vec<String>,
    /// Non-fatal findings (unlisted params/fields).
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.matched.is_some()
    }

    /// Single-line summary of why nothing matched.
    pub fn reason(&self) -> String {
        if self.failures.is_empty() {
            return "no alternative applies".into();
        }
        self.failures.join("; ")
    }
}

impl Constraint {
    /// Check one value. `None` means the name was not supplied.
    pub fn check(&self, value: Option<&ParamValue>) -> Result<(), String> {
        if self.kind == ValueKind::Option {
            let present = value.and_then(ParamValue::unwrap_option);
            return match (present, &self.inner) {
                (None, _) => Ok(()),
                (Some(v), Some(inner)) => inner.check(Some(v)),
                (Some(_), None) => Ok(()),
            };
        }

        let v = match value.map(|v| v.unwrap_option()) {
            None => return Err("missing".into()),
            Some(None) => return Err("absent".into()),
            Some(Some(v)) => v,
        };
        if v.kind() != self.kind {
            return Err(format!("expected {}, got {}", self.kind, v.kind()));
        }

        if let Some(allowed) = &self.values {
            if !allowed.iter().any(|a| a == v) {
                return Err(format!("{} not in allowed set", v.to_json()));
            }
        }

        if let Some(min) = &self.min {
            if compare(v, min).is_some_and(|o| o.is_lt()) {
                return Err(format!("{} below min {}", v.to_json(), min.to_json()));
            }
        }
        if let Some(max) = &self.max {
            if compare(v, max).is_some_and(|o| o.is_gt()) {
                return Err(format!("{} above max {}", v.to_json(), max.to_json()));
            }
        }

        if let (Some(names), ParamValue::Policy { name, .. }) = (&self.policies, v) {
            if !names.iter().any(|n| n == name) {
                return Err(format!("policy {name:?} not allowed"));
            }
        }

        Ok(())
    }

    pub fn admits(&self, value: Option<&ParamValue>) -> bool {
        self.check(value).is_ok()
    }
}

fn compare(v: &ParamValue, bound: &ParamValue) -> Option<std::cmp::Ordering> {
    match (v, bound) {
        (ParamValue::Int(a), ParamValue::Int(b)) => Some(a.cmp(b)),
        (ParamValue::Float(a), ParamValue::Float(b)) => a.partial_cmp(b),
        (ParamValue::Int(a), ParamValue::Float(b)) => int_vs_float(*a, *b),
        (ParamValue::Float(a), ParamValue::Int(b)) => int_vs_float(*b, *a).map(std::cmp::Ordering::reverse),
        _ => None,
    }
}

/// Orders an int against a float without rounding the int through f64.
fn int_vs_float(a: i128, b: f64) -> Option<std::cmp::Ordering> {
    // 2^127 is exact in f64; integral floats strictly inside it fit an i128.
    const LIMIT: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0;
    if b.is_nan() {
        return None;
    }
    if b >= LIMIT {
        return Some(std::cmp::Ordering::Less);
    }
    if b < -LIMIT {
        return Some(std::cmp::Ordering::Greater);
    }
    let floor = b.floor();
    let whole = floor as i128;
    match a.cmp(&whole) {
        std::cmp::Ordering::Equal if b > floor => Some(std::cmp::Ordering::Less),
        ord => Some(ord),
    }
}

fn check_block(
    constraints: &BTreeMap<String, Constraint>,
    lookup: impl Fn(&str) -> Option<ParamValue>,
) -> Result<(), String> {
    for (name, c) in constraints {
        let actual = lookup(name);
        c.check(actual.as_ref()).map_err(|e| format!("{name}: {e}"))?;
    }
    Ok(())
}

fn payload_field(payload: &Value, name: &str) -> Option<ParamValue> {
    let raw = payload.get(name)?;
    // Unparseable shapes (arrays, foreign objects) are reported as a kind mismatch.
    Some(ParamValue::from_json(raw).unwrap_or(ParamValue::Option(None)))
}

impl ValidatorConfig {
    /// Detailed parameter check, including warnings for unlisted params.
    pub fn check_params(&self, params: &Params) -> ValidationReport {
        let mut report = ValidationReport::default();
        for (i, alt) in self.alternatives.iter().enumerate() {
            let Some(block) = &alt.params else {
                report.matched = Some(i);
                break;
            };
            match check_block(block, |n| params.get(n).cloned()) {
                Ok(()) => {
                    report.matched = Some(i);
                    break;
                }
                Err(e) => report.failures.push(format!("alternative {i}: {e}")),
            }
        }

        let listed = |name: &str| match report.matched {
            Some(i) => self.alternatives[i]
                .params
                .as_ref()
                .is_some_and(|b| b.contains_key(name)),
            None => self
                .alternatives
                .iter()
                .any(|a| a.params.as_ref().is_some_and(|b| b.contains_key(name))),
        };
        let extras: Vec<String> = params
            .keys()
            .filter(|k| !listed(k.as_str()))
            .map(|k| format!("unlisted param `{k}` ignored"))
            .collect();
        report.warnings = extras;
        report
    }

    /// Any-of-one-alternative parameter validation.
    pub fn validate_params(&self, params: &Params) -> bool {
        self.check_params(params).is_ok()
    }

    /// Detailed signal check; only alternatives declaring `event` apply.
    pub fn check_signal(&self, event: &str, payload: &Value) -> ValidationReport {
        let mut report = ValidationReport::default();
        let empty = Value::Object(Default::default());
        let payload = if payload.is_null() { &empty } else { payload };
        if !payload.is_object() {
            report.failures.push("payload must be an object".into());
            return report;
        }

        for (i, alt) in self.alternatives.iter().enumerate() {
            let Some(shape) = &alt.signal else { continue };
            if !shape.events.iter().any(|e| e == event) {
                continue;
            }
            match check_block(&shape.fields, |n| payload_field(payload, n)) {
                Ok(()) => {
                    report.matched = Some(i);
                    report.warnings = payload
                        .as_object()
                        .into_iter()
                        .flat_map(|m| m.keys())
                        .filter(|k| !shape.fields.contains_key(k.as_str()))
                        .map(|k| format!("unlisted field `{k}` ignored"))
                        .collect();
                    break;
                }
                Err(e) => report.failures.push(format!("alternative {i}: {e}")),
            }
        }
        if report.matched.is_none() && report.failures.is_empty() {
            report.failures.push(format!("no alternative accepts event {event:?}"));
        }
        report
    }

    pub fn validate_signal(&self, event: &str, payload: &Value) -> bool {
        self.check_signal(event, payload).is_ok()
    }
}

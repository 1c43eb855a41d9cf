//! Declarative parameter/signal schemas.
//!
//! A [`ValidatorConfig`] is a non-empty list of alternatives. Satisfying any
//! single alternative is enough. The same config drives runtime validation in
//! the policy runtime and the property strategies in `classmesh-testkit`.

mod check;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, Result};
use crate::value::{ParamValue, ValueKind};

pub use check::ValidationReport;

/// Constraint on one named parameter or signal field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Constraint {
    #[serde(rename = "type")]
    pub kind: ValueKind,
    /// Explicit allowed values (int/float/string/boolean).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<ParamValue>>,
    /// Inclusive lower bound (int/float).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<ParamValue>,
    /// Inclusive upper bound (int/float).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<ParamValue>,
    /// Allowed policy names for `policy` constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies: Option<Vec<String>>,
    /// Wrapped constraint for `option`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<Constraint>>,
}

impl Constraint {
    /// Bare constraint of the given kind (no value set, no range).
    pub fn of(kind: ValueKind) -> Self {
        Self { kind, values: None, min: None, max: None, policies: None, inner: None }
    }

    pub fn int_range(min: i128, max: i128) -> Self {
        Self {
            min: Some(ParamValue::Int(min)),
            max: Some(ParamValue::Int(max)),
            ..Self::of(ValueKind::Int)
        }
    }

    pub fn optional(inner: Constraint) -> Self {
        Self { inner: Some(Box::new(inner)), ..Self::of(ValueKind::Option) }
    }

    /// True when a missing value satisfies this constraint.
    pub fn is_optional(&self) -> bool {
        self.kind == ValueKind::Option
    }

    fn well_formed(&self, path: &str) -> Result<()> {
        let bad = |msg: &str| Err(MeshError::Configuration(format!("validator {path}: {msg}")));
        match self.kind {
            ValueKind::Option => match &self.inner {
                Some(inner) => return inner.well_formed(path),
                None => return bad("option constraint requires `inner`"),
            },
            ValueKind::Int | ValueKind::Float => {}
            _ if self.min.is_some() || self.max.is_some() => {
                return bad("min/max only apply to int and float");
            }
            _ => {}
        }
        for bound in [&self.min, &self.max].into_iter().flatten() {
            if !matches!(bound, ParamValue::Int(_) | ParamValue::Float(_)) {
                return bad("min/max must be numbers");
            }
        }
        if self.policies.is_some() && self.kind != ValueKind::Policy {
            return bad("`policies` only applies to policy constraints");
        }
        if self.inner.is_some() {
            return bad("`inner` only applies to option constraints");
        }
        Ok(())
    }
}

/// Accepted signal shape: a set of event names plus field constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalShape {
    pub events: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Constraint>,
}

/// One alternative requirement block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Alternative {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, Constraint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<SignalShape>,
}

/// Non-empty set of alternatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Alternative>", into = "Vec<Alternative>")]
pub struct ValidatorConfig {
    alternatives: Vec<Alternative>,
}

impl ValidatorConfig {
    pub fn new(alternatives: Vec<Alternative>) -> Result<Self> {
        if alternatives.is_empty() {
            return Err(MeshError::Configuration(
                "validator config needs at least one alternative".into(),
            ));
        }
        for (i, alt) in alternatives.iter().enumerate() {
            for (name, c) in alt.params.iter().flatten() {
                c.well_formed(&format!("alternatives[{i}].params.{name}"))?;
            }
            if let Some(sig) = &alt.signal {
                if sig.events.is_empty() {
                    return Err(MeshError::Configuration(format!(
                        "validator alternatives[{i}].signal.events must not be empty"
                    )));
                }
                for (name, c) in &sig.fields {
                    c.well_formed(&format!("alternatives[{i}].signal.fields.{name}"))?;
                }
            }
        }
        Ok(Self { alternatives })
    }

    /// Parse the persisted JSON form (a JSON array of alternatives).
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| MeshError::Configuration(format!("invalid validator config: {e}")))
    }

    pub fn alternatives(&self) -> &[Alternative] {
        &self.alternatives
    }
}

impl TryFrom<Vec<Alternative>> for ValidatorConfig {
    type Error = MeshError;

    fn try_from(alternatives: Vec<Alternative>) -> Result<Self> {
        Self::new(alternatives)
    }
}

impl From<ValidatorConfig> for Vec<Alternative> {
    fn from(cfg: ValidatorConfig) -> Self {
        cfg.alternatives
    }
}

//! Parameter values shared by policies, validators and configuration.
//!
//! Integers are `i128` and floats are `f64`; the two never convert into each
//! other. JSON numbers written without a fraction or exponent decode as ints,
//! everything else numeric decodes as a float. Integers outside the `i64`/`u64`
//! range travel as `{"int": "<decimal>"}`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::{MeshError, Result};

/// Named parameter set handed to a policy.
pub type Params = BTreeMap<String, ParamValue>;

/// Tagged parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i128),
    Float(f64),
    Boolean(bool),
    String(String),
    /// Reference to another policy, resolved lazily when a group is created.
    Policy { name: String, params: Params },
    /// `None` is an explicitly absent optional value.
    Option(Option<Box<ParamValue>>),
}

/// Kind tag of a [`ParamValue`], used by schemas and validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Int,
    Float,
    Boolean,
    String,
    Policy,
    Option,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::String => "string",
            ValueKind::Policy => "policy",
            ValueKind::Option => "option",
        };
        f.write_str(s)
    }
}

impl ParamValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ParamValue::Int(_) => ValueKind::Int,
            ParamValue::Float(_) => ValueKind::Float,
            ParamValue::Boolean(_) => ValueKind::Boolean,
            ParamValue::String(_) => ValueKind::String,
            ParamValue::Policy { .. } => ValueKind::Policy,
            ParamValue::Option(_) => ValueKind::Option,
        }
    }

    /// Strip any number of `Option(Some(..))` wrappers. `Option(None)` yields `None`.
    pub fn unwrap_option(&self) -> Option<&ParamValue> {
        match self {
            ParamValue::Option(None) => None,
            ParamValue::Option(Some(inner)) => inner.unwrap_option(),
            other => Some(other),
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self.unwrap_option()? {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.unwrap_option()? {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.unwrap_option()? {
            ParamValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.unwrap_option()? {
            ParamValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_policy(&self) -> Option<(&str, &Params)> {
        match self.unwrap_option()? {
            ParamValue::Policy { name, params } => Some((name.as_str(), params)),
            _ => None,
        }
    }

    /// Decode from the JSON form described in the module docs.
    pub fn from_json(v: &Value) -> Result<Self> {
        match v {
            Value::Null => Ok(ParamValue::Option(None)),
            Value::Bool(b) => Ok(ParamValue::Boolean(*b)),
            Value::String(s) => Ok(ParamValue::String(s.clone())),
            Value::Number(_) => number_to_param(v)
                .ok_or_else(|| MeshError::BadRequest(format!("unsupported number: {v}"))),
            Value::Object(map) => {
                if let Some(raw) = map.get("int") {
                    if map.len() == 1 {
                        return wide_int(raw).map(ParamValue::Int);
                    }
                }
                if let Some(name) = map.get("policy") {
                    let name = name
                        .as_str()
                        .ok_or_else(|| MeshError::BadRequest("policy name must be a string".into()))?;
                    let params = match map.get("params") {
                        None | Some(Value::Null) => Params::new(),
                        Some(p) => params_from_json(p)?,
                    };
                    return Ok(ParamValue::Policy { name: name.to_string(), params });
                }
                Err(MeshError::BadRequest(
                    "object params must be {\"policy\": ..} or {\"int\": ..}".into(),
                ))
            }
            Value::Array(_) => Err(MeshError::BadRequest("array params are not supported".into())),
        }
    }

    /// Encode into the JSON form accepted by [`ParamValue::from_json`].
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Int(v) => int_to_json(*v),
            ParamValue::Float(v) => json!(v),
            ParamValue::Boolean(v) => Value::Bool(*v),
            ParamValue::String(v) => Value::String(v.clone()),
            ParamValue::Policy { name, params } => json!({
                "policy": name,
                "params": params_to_json(params),
            }),
            ParamValue::Option(None) => Value::Null,
            ParamValue::Option(Some(inner)) => inner.to_json(),
        }
    }
}

/// Decode a JSON object into [`Params`].
pub fn params_from_json(v: &Value) -> Result<Params> {
    let map = v
        .as_object()
        .ok_or_else(|| MeshError::BadRequest("params must be an object".into()))?;
    map.iter()
        .map(|(k, v)| Ok((k.clone(), ParamValue::from_json(v)?)))
        .collect()
}

pub fn params_to_json(params: &Params) -> Value {
    let map: Map<String, Value> = params
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    Value::Object(map)
}

/// Integer-or-float view of a JSON number, preserving the int/float split.
///
/// Integer literals wider than 64 bits are read from the number's text and
/// never fall back to a float; `None` when they overflow `i128`.
pub(crate) fn number_to_param(v: &Value) -> Option<ParamValue> {
    let Value::Number(n) = v else { return None; };
    if let Some(i) = n.as_i64() {
        return Some(ParamValue::Int(i128::from(i)));
    }
    if let Some(u) = n.as_u64() {
        return Some(ParamValue::Int(i128::from(u)));
    }
    let text = n.to_string();
    if !text.contains(|c: char| matches!(c, '.' | 'e' | 'E')) {
        return text.parse::<i128>().ok().map(ParamValue::Int);
    }
    n.as_f64().map(ParamValue::Float)
}

/// Read a wide integer: a JSON integer or a decimal string.
pub(crate) fn wide_int(v: &Value) -> Result<i128> {
    match v {
        Value::String(s) => s
            .parse::<i128>()
            .map_err(|e| MeshError::BadRequest(format!("invalid wide int {s:?}: {e}"))),
        Value::Number(_) => match number_to_param(v) {
            Some(ParamValue::Int(i)) => Ok(i),
            _ => Err(MeshError::BadRequest(format!("expected integer, got {v}"))),
        },
        _ => Err(MeshError::BadRequest(format!("expected integer, got {v}"))),
    }
}

pub(crate) fn int_to_json(v: i128) -> Value {
    if let Ok(i) = i64::try_from(v) {
        return Value::from(i);
    }
    if let Ok(u) = u64::try_from(v) {
        return Value::from(u);
    }
    json!({ "int": v.to_string() })
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(s)
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let v = Value::deserialize(d)?;
        ParamValue::from_json(&v).map_err(serde::de::Error::custom)
    }
}

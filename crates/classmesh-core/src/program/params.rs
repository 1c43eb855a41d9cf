//! Parameter schema and binding.

use std::collections::BTreeMap;

use crate::error::{MeshError, Result};
use crate::value::{ParamValue, Params, ValueKind};

/// Declared kind of a program parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
    Boolean,
    String,
    /// Reference to another policy; bound lazily as name + params.
    Policy,
    Option(Box<ParamKind>),
}

impl ParamKind {
    pub fn optional(inner: ParamKind) -> Self {
        ParamKind::Option(Box::new(inner))
    }

    fn value_kind(&self) -> ValueKind {
        match self {
            ParamKind::Int => ValueKind::Int,
            ParamKind::Float => ValueKind::Float,
            ParamKind::Boolean => ValueKind::Boolean,
            ParamKind::String => ValueKind::String,
            ParamKind::Policy => ValueKind::Policy,
            ParamKind::Option(_) => ValueKind::Option,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub name: String,
    pub kind: ParamKind,
}

impl ParamDecl {
    pub fn new(name: &str, kind: ParamKind) -> Self {
        Self { name: name.to_string(), kind }
    }
}

/// Parameters bound against a program's schema.
///
/// Every declared name is present. Optional names that were not supplied hold
/// `Option(None)`. Policy references are kept as-is and only resolved when a
/// group is created from them, so cyclic references cost nothing until used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundParams {
    values: BTreeMap<String, ParamValue>,
}

impl BoundParams {
    pub fn materialize(schema: &[ParamDecl], supplied: &Params) -> Result<Self> {
        let mut values = BTreeMap::new();
        for decl in schema {
            let v = bind(&decl.kind, supplied.get(&decl.name), &decl.name)?;
            values.insert(decl.name.clone(), v);
        }
        for extra in supplied.keys().filter(|k| !values.contains_key(*k)) {
            tracing::debug!(param = %extra, "undeclared parameter ignored");
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn int(&self, name: &str) -> Option<i128> {
        self.get(name)?.as_int()
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name)?.as_float()
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.get(name)?.as_bool()
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name)?.as_str()
    }

    pub fn policy(&self, name: &str) -> Option<(&str, &Params)> {
        self.get(name)?.as_policy()
    }
}

fn bind(kind: &ParamKind, value: Option<&ParamValue>, name: &str) -> Result<ParamValue> {
    let present = value.and_then(ParamValue::unwrap_option);
    if let ParamKind::Option(inner) = kind {
        return match present {
            None => Ok(ParamValue::Option(None)),
            Some(v) => Ok(ParamValue::Option(Some(Box::new(bind(inner, Some(v), name)?)))),
        };
    }

    let v = present
        .ok_or_else(|| MeshError::Configuration(format!("missing required parameter `{name}`")))?;
    if v.kind() != kind.value_kind() {
        return Err(MeshError::Configuration(format!(
            "parameter `{name}` expects {}, got {}",
            kind.value_kind(),
            v.kind()
        )));
    }
    Ok(v.clone())
}

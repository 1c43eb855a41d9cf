//! Typed view of a validated signal payload.

use serde_json::Value;

use crate::value::{number_to_param, wide_int, ParamValue};

/// Read-only accessors over a signal's JSON object.
///
/// Every getter returns `None` when the field is missing or has a different
/// kind; there is no coercion between ints and floats.
#[derive(Debug, Clone, Copy)]
pub struct SignalPayload<'a> {
    raw: &'a Value,
}

impl<'a> SignalPayload<'a> {
    pub fn new(raw: &'a Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &'a Value {
        self.raw
    }

    pub fn get_int(&self, field: &str) -> Option<i128> {
        match self.raw.get(field)? {
            v @ Value::Number(_) => match number_to_param(v)? {
                ParamValue::Int(i) => Some(i),
                _ => None,
            },
            Value::Object(m) if m.len() == 1 => m.get("int").and_then(|v| wide_int(v).ok()),
            _ => None,
        }
    }

    pub fn get_float(&self, field: &str) -> Option<f64> {
        match number_to_param(self.raw.get(field)?)? {
            ParamValue::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn get_boolean(&self, field: &str) -> Option<bool> {
        self.raw.get(field)?.as_bool()
    }

    pub fn get_string(&self, field: &str) -> Option<&'a str> {
        self.raw.get(field)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn accessors_return_none_on_kind_mismatch() {
        let v = json!({"n": 4, "f": 0.25, "b": true, "s": "x", "big": {"int": "1000000000000000000000"}});
        let p = SignalPayload::new(&v);
        assert_eq!(p.get_int("n"), Some(4));
        assert_eq!(p.get_float("n"), None);
        assert_eq!(p.get_float("f"), Some(0.25));
        assert_eq!(p.get_int("f"), None);
        assert_eq!(p.get_boolean("b"), Some(true));
        assert_eq!(p.get_string("s"), Some("x"));
        assert_eq!(p.get_string("n"), None);
        assert_eq!(p.get_int("big"), Some(1_000_000_000_000_000_000_000));
        assert_eq!(p.get_int("missing"), None);
    }
}

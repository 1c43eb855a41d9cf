//! Text lane envelope (JSON).
//!
//! Inbound `data` is kept as `RawValue` so each service parses only its own
//! request shape.

use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{json, Value};

use crate::error::{MeshError, Result};

pub const PROTOCOL_VERSION: u8 = 1;

/// Inbound envelope (text frame).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Protocol version.
    pub v: u8,
    /// Service name (`net`, `relay`).
    pub svc: String,
    /// Message type (field name is `type` in JSON).
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Optional client sequence number, echoed on errors.
    #[serde(default)]
    pub seq: Option<u64>,
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

impl Envelope {
    pub fn parse(s: &str) -> Result<Self> {
        let env: Envelope = serde_json::from_str(s)
            .map_err(|e| MeshError::BadRequest(format!("invalid envelope json: {e}")))?;
        if env.v != PROTOCOL_VERSION {
            return Err(MeshError::UnsupportedVersion);
        }
        Ok(env)
    }

    /// Parse `data` into a service request type.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let raw = self.data.as_ref().ok_or_else(|| {
            MeshError::BadRequest(format!("{}.{} requires data", self.svc, self.msg_type))
        })?;
        serde_json::from_str(raw.get())
            .map_err(|e| MeshError::BadRequest(format!("{}.{} invalid data: {e}", self.svc, self.msg_type)))
    }
}

/// Outbound envelope text.
pub fn outbound(svc: &str, msg_type: &str, data: Value) -> String {
    json!({
        "v": PROTOCOL_VERSION,
        "svc": svc,
        "type": msg_type,
        "data": data,
    })
    .to_string()
}

/// `sys/error` text for `err`.
pub fn error_frame(err: &MeshError, seq: Option<u64>) -> String {
    let mut data = json!({ "code": err.client_code().as_str(), "msg": err.to_string() });
    if let (Some(seq), Some(obj)) = (seq, data.as_object_mut()) {
        obj.insert("seq".into(), json!(seq));
    }
    outbound("sys", "error", data)
}

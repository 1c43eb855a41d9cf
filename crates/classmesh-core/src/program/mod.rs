//! Contract between the policy runtime and a compiled policy program.
//!
//! A program is a deterministic reducer over an opaque JSON state. The runtime
//! looks listeners up by name (`join`, `leave`, `signal`), calls them with the
//! current state, and stores whatever state they return. Listeners reach the
//! outside world only through [`Effects`]: link/unlink and group delegation.

pub mod native;
mod params;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{MeshError, Result};
use crate::signal::SignalPayload;
use crate::value::{params_from_json, params_to_json, Params};

pub use params::{BoundParams, ParamDecl, ParamKind};

/// Listener names.
pub const JOIN: &str = "join";
pub const LEAVE: &str = "leave";
pub const SIGNAL: &str = "signal";

/// Opaque handle to a nested coordinator owned by the calling runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

/// Persisted form of a group: restored by policy name, never by identity.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDescriptor {
    pub policy: String,
    pub params: Params,
    /// The nested coordinator's own `get_state()` string.
    pub state: String,
}

impl GroupDescriptor {
    pub const TAG: &'static str = "$group";

    pub fn to_json(&self) -> Value {
        let inner = json!({
            "policy": self.policy,
            "params": params_to_json(&self.params),
            "state": self.state,
        });
        let mut outer = serde_json::Map::new();
        outer.insert(Self::TAG.to_string(), inner);
        Value::Object(outer)
    }

    pub fn from_json(v: &Value) -> Result<Self> {
        let inner = v
            .get(Self::TAG)
            .ok_or_else(|| MeshError::BadRequest("group descriptor missing `$group`".into()))?;
        let policy = inner
            .get("policy")
            .and_then(Value::as_str)
            .ok_or_else(|| MeshError::BadRequest("group descriptor missing policy".into()))?;
        let params = match inner.get("params") {
            None | Some(Value::Null) => Params::new(),
            Some(p) => params_from_json(p)?,
        };
        let state = inner
            .get("state")
            .and_then(Value::as_str)
            .ok_or_else(|| MeshError::BadRequest("group descriptor missing state".into()))?;
        Ok(Self { policy: policy.to_string(), params, state: state.to_string() })
    }
}

/// Signal-specific listener arguments.
#[derive(Debug, Clone, Copy)]
pub struct SignalArgs<'a> {
    pub event: &'a str,
    pub payload: SignalPayload<'a>,
}

/// Arguments passed to every listener call.
#[derive(Debug, Clone, Copy)]
pub struct ListenerArgs<'a> {
    pub user: &'a str,
    /// Present only for the `signal` listener.
    pub signal: Option<SignalArgs<'a>>,
}

/// Side effects a program may issue while reducing an event.
pub trait Effects {
    fn link(&mut self, a: &str, b: &str) -> Result<()>;

    /// Unlinking a pair that is not linked is logged, not fatal.
    fn unlink(&mut self, a: &str, b: &str) -> Result<()>;

    /// Create a group from the Policy-typed parameter `param`.
    fn create_group(&mut self, param: &str) -> Result<GroupId>;

    fn deserialize_group(&mut self, descriptor: &GroupDescriptor) -> Result<GroupId>;

    fn group_join(&mut self, group: GroupId, user: &str) -> Result<()>;

    fn group_leave(&mut self, group: GroupId, user: &str) -> Result<()>;

    fn group_has(&self, group: GroupId, user: &str) -> Result<bool>;
}

/// Read-only access used by a program's serialize primitive.
pub trait GroupSerializer {
    fn serialize_group(&self, group: GroupId) -> Result<GroupDescriptor>;
}

/// `(effects, state, args, params) -> next state`
pub type Listener =
    Arc<dyn Fn(&mut dyn Effects, &Value, &ListenerArgs<'_>, &BoundParams) -> Result<Value> + Send + Sync>;

/// A loaded policy program.
pub trait CompiledProgram: Send + Sync {
    fn name(&self) -> &str;

    /// Declared parameter schema.
    fn params(&self) -> &[ParamDecl];

    fn initial_state(&self) -> Value;

    /// Listener by name; `None` makes the event a pure membership change.
    fn listener(&self, name: &str) -> Option<Listener>;

    /// Convert runtime state (holding group handles) into persisted form.
    fn serialize(&self, state: &Value, _groups: &dyn GroupSerializer) -> Result<Value> {
        Ok(state.clone())
    }

    /// Inverse of [`CompiledProgram::serialize`]; may restore groups.
    fn deserialize(&self, raw: &Value, _fx: &mut dyn Effects) -> Result<Value> {
        Ok(raw.clone())
    }
}

/// Turns persisted bytecode into a program.
pub trait ProgramLoader: Send + Sync {
    fn load(&self, bytecode: &[u8]) -> Result<Arc<dyn CompiledProgram>>;
}

//! Native programs: built-in policies shipped as Rust code.
//!
//! Their "bytecode" is a small JSON manifest naming the entry point, so they
//! travel through the same store → loader → runtime path as externally
//! compiled programs:
//!
//! ```json
//! {"format": "classmesh-native/1", "entry": "ring"}
//! ```

mod breakout;
mod broadcast;
mod mesh;
mod ring;

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    BoundParams, CompiledProgram, Effects, GroupSerializer, Listener, ListenerArgs, ParamDecl,
    ParamKind, ProgramLoader,
};
use crate::error::{MeshError, Result};

pub const NATIVE_FORMAT: &str = "classmesh-native/1";

/// Plain function form of a listener.
pub type ListenerFn = fn(&mut dyn Effects, &Value, &ListenerArgs<'_>, &BoundParams) -> Result<Value>;
pub type SerializeFn = fn(&Value, &dyn GroupSerializer) -> Result<Value>;
pub type DeserializeFn = fn(&Value, &mut dyn Effects) -> Result<Value>;

/// Program assembled from Rust functions.
pub struct NativeProgram {
    name: String,
    params: Vec<ParamDecl>,
    initial: Value,
    listeners: HashMap<&'static str, Listener>,
    serialize: Option<SerializeFn>,
    deserialize: Option<DeserializeFn>,
}

impl NativeProgram {
    pub fn new(name: &str, initial: Value) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            initial,
            listeners: HashMap::new(),
            serialize: None,
            deserialize: None,
        }
    }

    pub fn param(mut self, name: &str, kind: ParamKind) -> Self {
        self.params.push(ParamDecl::new(name, kind));
        self
    }

    pub fn on(mut self, event: &'static str, f: ListenerFn) -> Self {
        self.listeners.insert(event, Arc::new(f));
        self
    }

    pub fn codec(mut self, serialize: SerializeFn, deserialize: DeserializeFn) -> Self {
        self.serialize = Some(serialize);
        self.deserialize = Some(deserialize);
        self
    }
}

impl CompiledProgram for NativeProgram {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    fn initial_state(&self) -> Value {
        self.initial.clone()
    }

    fn listener(&self, name: &str) -> Option<Listener> {
        self.listeners.get(name).cloned()
    }

    fn serialize(&self, state: &Value, groups: &dyn GroupSerializer) -> Result<Value> {
        match self.serialize {
            Some(f) => f(state, groups),
            None => Ok(state.clone()),
        }
    }

    fn deserialize(&self, raw: &Value, fx: &mut dyn Effects) -> Result<Value> {
        match self.deserialize {
            Some(f) => f(raw, fx),
            None => Ok(raw.clone()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    format: String,
    entry: String,
}

/// Bytecode for a native program entry.
pub fn manifest(entry: &str) -> Vec<u8> {
    let m = Manifest { format: NATIVE_FORMAT.to_string(), entry: entry.to_string() };
    serde_json::to_vec(&m).unwrap_or_default()
}

/// Loader resolving native manifests against a table of programs.
#[derive(Default)]
pub struct NativeLoader {
    programs: HashMap<String, Arc<dyn CompiledProgram>>,
}

impl NativeLoader {
    pub fn new() -> Self {
        Self { programs: HashMap::new() }
    }

    /// Loader preloaded with `ring`, `mesh`, `broadcast` and `breakout`.
    pub fn builtin() -> Self {
        let mut loader = Self::new();
        loader.register(ring::program());
        loader.register(mesh::program());
        loader.register(broadcast::program());
        loader.register(breakout::program());
        loader
    }

    pub fn register(&mut self, program: impl CompiledProgram + 'static) {
        self.programs.insert(program.name().to_string(), Arc::new(program));
    }

    pub fn entries(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.programs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ProgramLoader for NativeLoader {
    fn load(&self, bytecode: &[u8]) -> Result<Arc<dyn CompiledProgram>> {
        let m: Manifest = serde_json::from_slice(bytecode)
            .map_err(|e| MeshError::Configuration(format!("unreadable program manifest: {e}")))?;
        if m.format != NATIVE_FORMAT {
            return Err(MeshError::Configuration(format!(
                "unsupported program format {:?}",
                m.format
            )));
        }
        self.programs
            .get(&m.entry)
            .cloned()
            .ok_or_else(|| MeshError::Configuration(format!("unknown native program {:?}", m.entry)))
    }
}

pub(crate) fn decode<T: DeserializeOwned>(state: &Value) -> Result<T> {
    serde_json::from_value(state.clone())
        .map_err(|e| MeshError::Internal(format!("corrupt program state: {e}")))
}

pub(crate) fn encode<T: Serialize>(state: &T) -> Result<Value> {
    Ok(serde_json::to_value(state)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_loader_resolves_manifests() {
        let loader = NativeLoader::builtin();
        assert_eq!(loader.entries(), vec!["breakout", "broadcast", "mesh", "ring"]);
        let ring = loader.load(&manifest("ring")).unwrap();
        assert_eq!(ring.name(), "ring");
        assert!(ring.listener(super::super::JOIN).is_some());
    }

    #[test]
    fn bad_manifests_are_configuration_errors() {
        let loader = NativeLoader::builtin();
        let rejected = |bytes: &[u8]| loader.load(bytes).err().is_some_and(|e| e.is_configuration());
        assert!(rejected(b"not json"));
        assert!(rejected(&manifest("spiral")));
        assert!(rejected(br#"{"format": "wasm/1", "entry": "ring"}"#));
    }
}

//! Shared fixture: a local session directory, a broker and a registry backed
//! by the built-in native programs.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;

use classmesh_core::broker::{events, ConnectionBroker, LocalDirectory};
use classmesh_core::program::native::{manifest, NativeLoader};
use classmesh_core::registry::{MemoryPolicyStore, PolicyRecord, PolicyRegistry};
use classmesh_core::value::params_from_json;
use classmesh_core::{Network, NetworkConfig, Result};

pub type Pair = (String, String);

pub fn pair(a: &str, b: &str) -> Pair {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

pub struct Fixture {
    pub dir: Arc<LocalDirectory>,
    pub broker: Arc<ConnectionBroker>,
    pub store: Arc<MemoryPolicyStore>,
    pub registry: Arc<PolicyRegistry>,
}

impl Fixture {
    pub fn new(users: &[&str]) -> Self {
        let dir = Arc::new(LocalDirectory::new());
        for u in users {
            dir.connect(u);
        }
        let broker = Arc::new(ConnectionBroker::new(dir.clone()));
        let store = Arc::new(MemoryPolicyStore::new());
        for entry in ["ring", "mesh", "broadcast", "breakout"] {
            store.insert(entry, record(entry, None));
        }
        let registry = Arc::new(PolicyRegistry::new(store.clone(), Arc::new(NativeLoader::builtin())));
        Self { dir, broker, store, registry }
    }

    /// Register `id` as `entry` guarded by `validator`.
    pub fn policy(&self, id: &str, entry: &str, validator: &str) {
        self.store.insert(id, record(entry, Some(validator)));
    }

    pub fn network(&self, id: &str, policy: &str, params: Value) -> Result<Network> {
        let config = NetworkConfig { policy_name: policy.to_string(), params: params_from_json(&params)? };
        Network::create(id, self.broker.clone(), self.registry.clone(), &config)
    }

    /// link id -> pair, for every `created` notice seen so far.
    fn created_links(&self) -> BTreeMap<String, Pair> {
        let mut out = BTreeMap::new();
        for ep in self.dir.endpoints() {
            let s = self.dir.session(&ep).unwrap();
            for e in s.events() {
                if e.event == events::LINK_CREATED && e.data["initiator"] == Value::Bool(true) {
                    let peer = e.data["peer"].as_str().unwrap();
                    let link = e.data["link"].as_str().unwrap().to_string();
                    out.insert(link, pair(&ep, peer));
                }
            }
        }
        out
    }

    /// Number of links created so far.
    pub fn created_count(&self) -> usize {
        self.created_links().len()
    }

    pub fn created_pairs(&self) -> Vec<Pair> {
        self.created_links().into_values().collect()
    }

    pub fn destroyed_pairs(&self) -> BTreeSet<Pair> {
        let created = self.created_links();
        let mut out = BTreeSet::new();
        for ep in self.dir.endpoints() {
            let s = self.dir.session(&ep).unwrap();
            for e in s.events() {
                if e.event == events::LINK_DESTROYED {
                    let link = e.data["link"].as_str().unwrap();
                    out.insert(created[link].clone());
                }
            }
        }
        out
    }
}

pub fn record(entry: &str, validator: Option<&str>) -> PolicyRecord {
    PolicyRecord {
        compiled_bytecode: manifest(entry),
        validator_config_json: validator.map(str::to_string),
        plugin_id: "classmesh-builtin".into(),
        plugin_version: "1.0.0".into(),
    }
}

pub fn sorted(mut pairs: Vec<Pair>) -> Vec<Pair> {
    pairs.sort();
    pairs
}

//! Activities hosted by the gateway.
//!
//! Every activity and its networks are built once at boot from config. A
//! network's coordinator is never driven concurrently: each [`Network`] sits
//! behind a mutex held only for one synchronous call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde_json::Value;

use classmesh_core::broker::ConnectionBroker;
use classmesh_core::coordinator::PolicyResolver;
use classmesh_core::error::{MeshError, Result};
use classmesh_core::program::native::{manifest, NativeLoader};
use classmesh_core::registry::{MemoryPolicyStore, PolicyRecord};
use classmesh_core::{Network, NetworkConfig};

use crate::config::{ActivityConfig, GatewayConfig};
use crate::realtime::Presence;

pub const BUILTIN_PLUGIN: &str = "classmesh-builtin";

/// Policy store seeded with every built-in program under its own name, then
/// the policies declared in config (which may shadow a built-in).
pub fn policy_store(cfg: &GatewayConfig) -> Result<MemoryPolicyStore> {
    let store = MemoryPolicyStore::new();
    for entry in NativeLoader::builtin().entries() {
        store.insert(
            entry,
            PolicyRecord {
                compiled_bytecode: manifest(entry),
                validator_config_json: None,
                plugin_id: BUILTIN_PLUGIN.to_string(),
                plugin_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        );
    }
    for p in &cfg.policies {
        let validator_config_json = p.validator.as_ref().map(serde_json::to_string).transpose()?;
        store.insert(
            &p.id,
            PolicyRecord {
                compiled_bytecode: manifest(&p.program),
                validator_config_json,
                plugin_id: p.plugin.clone(),
                plugin_version: p.plugin_version.clone(),
            },
        );
    }
    Ok(store)
}

/// One live classroom session and its networks.
pub struct Activity {
    id: String,
    networks: HashMap<String, Mutex<Network>>,
    presence: Presence,
}

impl Activity {
    pub fn build(
        cfg: &ActivityConfig,
        broker: &Arc<ConnectionBroker>,
        resolver: &Arc<dyn PolicyResolver>,
    ) -> Result<Self> {
        let mut networks = HashMap::with_capacity(cfg.networks.len());
        for spec in &cfg.networks {
            let config = NetworkConfig { policy_name: spec.policy.clone(), params: spec.params.clone() };
            let network = Network::create(&spec.id, Arc::clone(broker), Arc::clone(resolver), &config)
                .map_err(|e| match e {
                    MeshError::Configuration(msg) => {
                        MeshError::Configuration(format!("activity {} network {}: {msg}", cfg.id, spec.id))
                    }
                    other => other,
                })?;
            networks.insert(spec.id.clone(), Mutex::new(network));
        }
        tracing::info!(activity = %cfg.id, networks = networks.len(), "activity started");
        Ok(Self { id: cfg.id.clone(), networks, presence: Presence::new() })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn network_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.networks.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    fn slot(&self, network: &str) -> Result<&Mutex<Network>> {
        self.networks
            .get(network)
            .ok_or_else(|| MeshError::BadRequest(format!("unknown network: {network}")))
    }

    /// Run `f` with exclusive access to one network.
    pub fn with_network<T>(&self, network: &str, f: impl FnOnce(&mut Network) -> Result<T>) -> Result<T> {
        let mut guard = self
            .slot(network)?
            .lock()
            .map_err(|_| MeshError::Internal(format!("network {network} lock poisoned")))?;
        f(&mut guard)
    }

    pub fn join(&self, network: &str, user: &str) -> Result<()> {
        // Presence first: a failed join still leaves the user on the roster.
        self.slot(network)?;
        self.presence.join(network, user);
        self.with_network(network, |n| n.on_user_join(user))
    }

    pub fn leave(&self, network: &str, user: &str) -> Result<()> {
        self.presence.leave(network, user);
        self.with_network(network, |n| n.on_user_leave(user))
    }

    pub fn signal(&self, network: &str, user: &str, event: &str, payload: &Value) -> Result<()> {
        self.with_network(network, |n| n.signal(user, event, payload))
    }

    /// Leave every network `user` joined. Failures are logged; the runtime
    /// sweeps the user's links regardless.
    pub fn disconnect(&self, user: &str) {
        for network in self.presence.cleanup_user(user) {
            if let Err(e) = self.with_network(&network, |n| n.on_user_leave(user)) {
                tracing::warn!(activity = %self.id, %network, %user, error = %e, "leave on disconnect failed");
            }
        }
    }

    /// Tear down every network.
    pub fn close(&self) {
        for (id, slot) in &self.networks {
            match slot.lock() {
                Ok(mut n) => n.close(),
                Err(_) => tracing::warn!(activity = %self.id, network = %id, "network lock poisoned on close"),
            }
        }
    }
}

/// Activities by id.
#[derive(Default)]
pub struct ActivityHost {
    activities: DashMap<String, Arc<Activity>>,
}

impl ActivityHost {
    pub fn build(
        cfg: &GatewayConfig,
        broker: &Arc<ConnectionBroker>,
        resolver: &Arc<dyn PolicyResolver>,
    ) -> Result<Self> {
        let activities = DashMap::new();
        for a in &cfg.activities {
            activities.insert(a.id.clone(), Arc::new(Activity::build(a, broker, resolver)?));
        }
        Ok(Self { activities })
    }

    pub fn get(&self, id: &str) -> Option<Arc<Activity>> {
        self.activities.get(id).map(|a| Arc::clone(a.value()))
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn close_all(&self) {
        for a in self.activities.iter() {
            a.value().close();
            tracing::info!(activity = %a.key(), "activity closed");
        }
    }
}

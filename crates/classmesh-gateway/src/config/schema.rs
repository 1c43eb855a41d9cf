use std::collections::HashSet;

use serde::Deserialize;

use classmesh_core::error::{MeshError, Result};
use classmesh_core::validator::ValidatorConfig;
use classmesh_core::value::Params;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    /// Policies in addition to the built-in ones (`ring`, `mesh`, ...).
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,

    #[serde(default)]
    pub activities: Vec<ActivityConfig>,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MeshError::UnsupportedVersion);
        }
        if self.activities.is_empty() {
            return Err(invalid("activities must not be empty"));
        }

        self.gateway.validate()?;

        let mut policy_ids = HashSet::new();
        for p in &self.policies {
            p.validate()?;
            if !policy_ids.insert(p.id.as_str()) {
                return Err(invalid(format!("duplicate policy id: {}", p.id)));
            }
        }

        let mut activity_ids = HashSet::new();
        for a in &self.activities {
            a.validate()?;
            if !activity_ids.insert(a.id.as_str()) {
                return Err(invalid(format!("duplicate activity id: {}", a.id)));
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> MeshError {
    MeshError::Configuration(msg.into())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Largest inbound frame (text or binary) accepted from a client.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Per-session outbound queue depth; notices beyond it are dropped.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(invalid("gateway.ping_interval_ms must be between 5000 and 120000"));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(invalid("gateway.idle_timeout_ms must be between 10000 and 600000"));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(invalid("gateway.idle_timeout_ms must be greater than ping_interval_ms"));
        }
        if !(256..=1_048_576).contains(&self.max_frame_bytes) {
            return Err(invalid("gateway.max_frame_bytes must be between 256 and 1048576"));
        }
        if !(1..=65536).contains(&self.outbound_queue) {
            return Err(invalid("gateway.outbound_queue must be between 1 and 65536"));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
fn default_max_frame_bytes() -> usize {
    16384
}
fn default_outbound_queue() -> usize {
    1024
}

/// A stored policy record: which program it runs and how its inputs are checked.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub id: String,
    pub plugin: String,
    pub plugin_version: String,
    /// Native program entry (`ring`, `mesh`, `broadcast`, `breakout`).
    pub program: String,
    #[serde(default)]
    pub validator: Option<ValidatorConfig>,
}

impl PolicyConfig {
    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(invalid("policies[].id must not be empty"));
        }
        if self.program.trim().is_empty() {
            return Err(invalid(format!("policy {}: program must not be empty", self.id)));
        }
        if self.plugin.trim().is_empty() || self.plugin_version.trim().is_empty() {
            return Err(invalid(format!("policy {}: plugin and plugin_version are required", self.id)));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityConfig {
    pub id: String,
    pub networks: Vec<NetworkSpec>,
}

impl ActivityConfig {
    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(invalid("activities[].id must not be empty"));
        }
        if self.networks.is_empty() {
            return Err(invalid(format!("activity {}: networks must not be empty", self.id)));
        }
        let mut seen = HashSet::new();
        for n in &self.networks {
            if n.id.trim().is_empty() {
                return Err(invalid(format!("activity {}: network id must not be empty", self.id)));
            }
            if !seen.insert(n.id.as_str()) {
                return Err(invalid(format!("activity {}: duplicate network id {}", self.id, n.id)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSpec {
    pub id: String,
    pub policy: String,
    #[serde(default)]
    pub params: Params,
}

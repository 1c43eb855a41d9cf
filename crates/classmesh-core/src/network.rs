//! A named network inside a live activity, bound to one coordinator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::ConnectionBroker;
use crate::coordinator::{instantiate, Coordinator, CoordinatorContext, PolicyResolver};
use crate::error::Result;
use crate::value::Params;

/// Which policy a network runs, and with what parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub policy_name: String,
    #[serde(default)]
    pub params: Params,
}

pub struct Network {
    id: String,
    policy: String,
    coordinator: Box<dyn Coordinator>,
}

impl Network {
    /// Resolve the policy and build its coordinator. A missing policy or
    /// rejected parameters surface as [`MeshError::Configuration`](crate::MeshError::Configuration).
    pub fn create(
        network_id: &str,
        broker: Arc<ConnectionBroker>,
        resolver: Arc<dyn PolicyResolver>,
        config: &NetworkConfig,
    ) -> Result<Self> {
        let ctx = CoordinatorContext::new(network_id, broker, resolver);
        let coordinator = instantiate(&ctx, &config.policy_name, &config.params)?;
        tracing::info!(network = %network_id, policy = %config.policy_name, "network started");
        Ok(Self { id: network_id.to_string(), policy: config.policy_name.clone(), coordinator })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn policy(&self) -> &str {
        &self.policy
    }

    pub fn on_user_join(&mut self, user: &str) -> Result<()> {
        self.coordinator.on_user_join(user)
    }

    pub fn on_user_leave(&mut self, user: &str) -> Result<()> {
        self.coordinator.on_user_leave(user)
    }

    pub fn signal(&mut self, user: &str, event: &str, payload: &Value) -> Result<()> {
        self.coordinator.signal(user, event, payload)
    }

    pub fn has_user(&self, user: &str) -> bool {
        self.coordinator.has_user(user)
    }

    pub fn members(&self) -> Vec<String> {
        self.coordinator.members()
    }

    pub fn linked_pairs(&self) -> Vec<(String, String)> {
        self.coordinator.linked_pairs()
    }

    pub fn get_state(&self) -> Result<String> {
        self.coordinator.get_state()
    }

    pub fn load_state(&mut self, state: &str) -> Result<()> {
        self.coordinator.load_state(state)
    }

    pub fn close(&mut self) {
        tracing::info!(network = %self.id, policy = %self.policy, "network closed");
        self.coordinator.close();
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("members", &self.coordinator.members())
            .finish()
    }
}

//! The policy coordinator contract.
//!
//! Every policy implementation, compiled or native, is driven through
//! [`Coordinator`]. Factories are looked up by name through a
//! [`PolicyResolver`] so nested policies can be resolved at the moment a group
//! is created.

use std::sync::Arc;

use serde_json::Value;

use crate::broker::ConnectionBroker;
use crate::error::{MeshError, Result};
use crate::value::Params;

/// One live, policy-governed roster.
pub trait Coordinator: Send {
    /// Idempotent add.
    fn on_user_join(&mut self, user: &str) -> Result<()>;

    /// Idempotent remove. On return no link or group membership of `user`
    /// remains, even if the policy's own leave handling failed.
    fn on_user_leave(&mut self, user: &str) -> Result<()>;

    /// Deliver an application signal. Non-members are ignored.
    fn signal(&mut self, user: &str, event: &str, payload: &Value) -> Result<()>;

    fn has_user(&self, user: &str) -> bool;

    /// Current roster, sorted.
    fn members(&self) -> Vec<String>;

    /// Endpoint pairs with a live link, including those owned by nested groups.
    fn linked_pairs(&self) -> Vec<(String, String)>;

    fn get_state(&self) -> Result<String>;

    /// Replace the current state. Existing links are torn down, not restored.
    fn load_state(&mut self, state: &str) -> Result<()>;

    /// Tear down every link and nested group. Called when the activity ends.
    fn close(&mut self);
}

/// Builds coordinators for one policy.
pub trait CoordinatorFactory: Send + Sync {
    fn policy_name(&self) -> &str;

    /// Static parameter check, run before any instance is built.
    fn validate(&self, params: &Params) -> bool;

    fn create(&self, ctx: CoordinatorContext, params: &Params) -> Result<Box<dyn Coordinator>>;
}

/// Name → factory lookup. `Ok(None)` means "no such policy".
pub trait PolicyResolver: Send + Sync {
    fn resolve(&self, policy: &str) -> Result<Option<Arc<dyn CoordinatorFactory>>>;
}

/// What a coordinator needs from its surroundings.
#[derive(Clone)]
pub struct CoordinatorContext {
    pub network: Arc<str>,
    pub broker: Arc<ConnectionBroker>,
    pub resolver: Arc<dyn PolicyResolver>,
}

impl CoordinatorContext {
    pub fn new(network: &str, broker: Arc<ConnectionBroker>, resolver: Arc<dyn PolicyResolver>) -> Self {
        Self { network: Arc::from(network), broker, resolver }
    }
}

/// Resolve `policy`, check `params` against it and build an instance.
pub fn instantiate(ctx: &CoordinatorContext, policy: &str, params: &Params) -> Result<Box<dyn Coordinator>> {
    let factory = ctx
        .resolver
        .resolve(policy)?
        .ok_or_else(|| MeshError::Configuration(format!("policy {policy:?} not found")))?;
    if !factory.validate(params) {
        return Err(MeshError::Configuration(format!(
            "parameters rejected by policy {policy:?}"
        )));
    }
    factory.create(ctx.clone(), params)
}

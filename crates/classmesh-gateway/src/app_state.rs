//! Shared application state for the classmesh gateway.
//!
//! Boot wires, in order: session registry -> broker -> policy registry ->
//! activities -> dispatcher. Every step returns `Result` so a bad config
//! fails startup instead of the first join.

use std::sync::Arc;

use classmesh_core::broker::{ConnectionBroker, SessionDirectory};
use classmesh_core::coordinator::PolicyResolver;
use classmesh_core::error::{MeshError, Result};
use classmesh_core::program::native::NativeLoader;
use classmesh_core::registry::PolicyRegistry;

use crate::activity::{policy_store, Activity, ActivityHost};
use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::realtime::SessionRegistry;
use crate::services::{NetService, RelayService};

/// Development tickets look like `dev:<user>`.
const DEV_TICKET_PREFIX: &str = "dev:";

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    sessions: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    activities: ActivityHost,
}

impl AppState {
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        // 1) Sessions double as the broker's directory
        let sessions = Arc::new(SessionRegistry::new());
        let broker = Arc::new(ConnectionBroker::new(
            Arc::clone(&sessions) as Arc<dyn SessionDirectory>
        ));

        // 2) Policies: built-ins plus config, loaded lazily by the registry
        let store = policy_store(&cfg)?;
        let resolver: Arc<dyn PolicyResolver> = Arc::new(PolicyRegistry::new(
            Arc::new(store),
            Arc::new(NativeLoader::builtin()),
        ));

        // 3) Activities resolve every network policy now
        let activities = ActivityHost::build(&cfg, &broker, &resolver)?;

        // 4) Services
        let dispatcher = Dispatcher::new();
        dispatcher.register_text(Arc::new(NetService::new()));
        let relay = Arc::new(RelayService::new());
        dispatcher.register_text(relay.clone());
        if !dispatcher.register_binary(relay) {
            return Err(MeshError::Internal("binary lane registered twice".into()));
        }
        tracing::debug!(svcs = ?dispatcher.registered_text_svcs(), "services registered");

        Ok(Self {
            inner: Arc::new(AppStateInner { cfg, activities }),
            sessions,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn activity(&self, id: &str) -> Option<Arc<Activity>> {
        self.inner.activities.get(id)
    }

    pub fn activities(&self) -> &ActivityHost {
        &self.inner.activities
    }

    pub fn resolve_ticket(&self, ticket: &str) -> Result<String> {
        match ticket.strip_prefix(DEV_TICKET_PREFIX) {
            Some(user) if !user.is_empty() => Ok(user.to_string()),
            _ => Err(MeshError::AuthFailed),
        }
    }

    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }
}

use std::sync::Arc;

use classmesh_core::error::{MeshError, Result};

use crate::activity::Activity;
use crate::realtime::core::{GatewaySession, SessionRegistry};

/// Per-message context passed to services (borrow tools instead of owning).
#[derive(Clone)]
pub struct RealtimeCtx {
    activity: Arc<Activity>,
    user: Arc<str>,
    sessions: Arc<SessionRegistry>,
}

impl RealtimeCtx {
    pub fn new(activity: Arc<Activity>, user: impl Into<Arc<str>>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            activity,
            user: user.into(),
            sessions,
        }
    }

    pub fn activity(&self) -> &Activity { &self.activity }
    pub fn user(&self) -> &str { &self.user }

    /// The caller's own live session.
    pub fn session(&self) -> Result<Arc<GatewaySession>> {
        self.sessions
            .get(self.user())
            .ok_or_else(|| MeshError::Internal(format!("session for {} is gone", self.user)))
    }
}

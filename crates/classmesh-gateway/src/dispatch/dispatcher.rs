use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;

use classmesh_core::error::{MeshError, Result};
use classmesh_core::protocol::relay::RelayFrame;
use classmesh_core::protocol::text::Envelope;

use crate::realtime::RealtimeCtx;

/// Text services, addressed by the envelope's `svc`.
#[async_trait]
pub trait TextService: Send + Sync {
    fn svc(&self) -> &'static str;
    async fn handle(&self, ctx: RealtimeCtx, env: Envelope) -> Result<()>;
}

/// Binary lane: relay frames carry no service id, so there is one handler.
#[async_trait]
pub trait BinaryService: Send + Sync {
    async fn handle_binary(&self, ctx: RealtimeCtx, frame: RelayFrame) -> Result<()>;
}

/// Registry and dispatcher for text services and the binary lane.
#[derive(Default)]
pub struct Dispatcher {
    text: DashMap<&'static str, Arc<dyn TextService>>,
    binary: OnceLock<Arc<dyn BinaryService>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            text: DashMap::new(),
            binary: OnceLock::new(),
        }
    }

    pub fn register_text(&self, svc: Arc<dyn TextService>) {
        self.text.insert(svc.svc(), svc);
    }

    /// Returns false if a binary handler is already installed.
    pub fn register_binary(&self, svc: Arc<dyn BinaryService>) -> bool {
        self.binary.set(svc).is_ok()
    }

    pub fn registered_text_svcs(&self) -> Vec<&'static str> {
        let mut svcs: Vec<&'static str> = self.text.iter().map(|e| *e.key()).collect();
        svcs.sort_unstable();
        svcs
    }

    pub async fn dispatch_text(&self, ctx: RealtimeCtx, env: Envelope) -> Result<()> {
        let svc = env.svc.as_str();
        let handler = self
            .text
            .get(svc)
            .ok_or_else(|| MeshError::BadRequest(format!("unknown svc: {svc}")))?
            .value()
            .clone();
        handler.handle(ctx, env).await
    }

    pub async fn dispatch_binary(&self, ctx: RealtimeCtx, frame: RelayFrame) -> Result<()> {
        let handler = self
            .binary
            .get()
            .ok_or_else(|| MeshError::BadRequest("binary frames are not accepted".into()))?
            .clone();
        handler.handle_binary(ctx, frame).await
    }
}

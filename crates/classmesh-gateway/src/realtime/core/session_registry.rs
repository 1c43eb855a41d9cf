use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use classmesh_core::broker::{
    events, DisconnectHook, HookId, RelayHandler, RelayPayload, SessionDirectory, SessionHandle,
};
use classmesh_core::error::{MeshError, Result};
use classmesh_core::protocol::relay::encode_relay_frame;
use classmesh_core::protocol::text::outbound;

/// One connected client as seen by the broker.
///
/// Emission is `try_send` into the session's outbound queue: a full or
/// closed queue drops the notice.
pub struct GatewaySession {
    endpoint: String,
    session_id: u64,
    meta: Value,
    tx: mpsc::Sender<Message>,
    closed: AtomicBool,
    handlers: DashMap<String, RelayHandler>,
    hooks: DashMap<u64, DisconnectHook>,
    hook_seq: AtomicU64,
}

impl GatewaySession {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Hand a client-sent payload to whatever is subscribed on `channel`.
    /// Returns false when nothing is.
    pub fn deliver(&self, channel: &str, payload: RelayPayload) -> bool {
        let handler = self.handlers.get(channel).map(|h| Arc::clone(h.value()));
        match handler {
            Some(h) => {
                h(payload);
                true
            }
            None => false,
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.handlers.len()
    }

    fn push(&self, msg: Message) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.tx.try_send(msg) {
            tracing::debug!(endpoint = %self.endpoint, error = %e, "outbound queue rejected notice");
        }
    }

    /// Mark closed, drop subscriptions and run disconnect hooks once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.handlers.clear();
        let ids: Vec<u64> = self.hooks.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, hook)) = self.hooks.remove(&id) {
                hook();
            }
        }
    }
}

impl SessionHandle for GatewaySession {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn meta(&self) -> Value {
        self.meta.clone()
    }

    fn emit(&self, event: &str, data: Value) {
        self.push(Message::Text(outbound("link", event, data)));
    }

    fn emit_relay(&self, channel: &str, payload: &RelayPayload) {
        match payload {
            RelayPayload::Json(v) => {
                let data = json!({ "channel": channel, "payload": v });
                self.push(Message::Text(outbound("link", events::LINK_RELAY, data)));
            }
            RelayPayload::Binary(b) => match encode_relay_frame(channel, b) {
                Ok(frame) => self.push(Message::Binary(frame.to_vec())),
                Err(e) => tracing::warn!(endpoint = %self.endpoint, %channel, error = %e, "relay frame dropped"),
            },
        }
    }

    fn on(&self, channel: &str, handler: RelayHandler) {
        if !self.is_closed() {
            self.handlers.insert(channel.to_string(), handler);
        }
    }

    fn off(&self, channel: &str) {
        self.handlers.remove(channel);
    }

    fn on_disconnect(&self, hook: DisconnectHook) -> HookId {
        let id = self.hook_seq.fetch_add(1, Ordering::Relaxed);
        if !self.is_closed() {
            self.hooks.insert(id, hook);
        }
        HookId(id)
    }

    fn off_disconnect(&self, id: HookId) {
        self.hooks.remove(&id.0);
    }
}

/// Session registry: `endpoint -> session`, one live session per endpoint.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<GatewaySession>>,
    seq: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            seq: AtomicU64::new(1),
        }
    }

    /// Register a session for `endpoint`. A second concurrent session for the
    /// same endpoint is refused.
    pub fn open(&self, endpoint: &str, meta: Value, tx: mpsc::Sender<Message>) -> Result<Arc<GatewaySession>> {
        use dashmap::mapref::entry::Entry;

        match self.sessions.entry(endpoint.to_string()) {
            Entry::Occupied(_) => Err(MeshError::BadRequest(format!("{endpoint} is already connected"))),
            Entry::Vacant(slot) => {
                let session = Arc::new(GatewaySession {
                    endpoint: endpoint.to_string(),
                    session_id: self.seq.fetch_add(1, Ordering::Relaxed),
                    meta,
                    tx,
                    closed: AtomicBool::new(false),
                    handlers: DashMap::new(),
                    hooks: DashMap::new(),
                    hook_seq: AtomicU64::new(1),
                });
                slot.insert(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    /// Remove `endpoint` if it is still bound to `session_id`, then close it.
    pub fn close(&self, endpoint: &str, session_id: u64) -> bool {
        // Remove first so hooks never observe the map guard.
        let Some((_, session)) = self
            .sessions
            .remove_if(endpoint, |_, s| s.session_id == session_id)
        else {
            return false;
        };
        session.close();
        true
    }

    pub fn get(&self, endpoint: &str) -> Option<Arc<GatewaySession>> {
        self.sessions.get(endpoint).map(|s| Arc::clone(s.value()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionDirectory for SessionRegistry {
    fn lookup(&self, endpoint: &str) -> Option<Arc<dyn SessionHandle>> {
        let s = self.get(endpoint)?;
        Some(s as Arc<dyn SessionHandle>)
    }
}

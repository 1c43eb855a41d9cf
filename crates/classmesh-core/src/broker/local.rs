//! In-process session directory.
//!
//! Sessions record everything emitted to them, which makes this directory the
//! backing store for tests, the testkit fuzz harness and embedders that drive
//! networks without a socket layer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde_json::{json, Value};

use super::{events, DisconnectHook, HookId, RelayHandler, RelayPayload, SessionDirectory, SessionHandle};

/// One recorded emission.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub event: String,
    pub data: Value,
}

/// Recording session.
pub struct LocalSession {
    endpoint: String,
    meta: Value,
    connected: AtomicBool,
    handlers: DashMap<String, RelayHandler>,
    hooks: DashMap<u64, DisconnectHook>,
    hook_seq: AtomicU64,
    log: Mutex<Vec<Emitted>>,
}

impl LocalSession {
    fn new(endpoint: &str, meta: Value) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            meta,
            connected: AtomicBool::new(true),
            handlers: DashMap::new(),
            hooks: DashMap::new(),
            hook_seq: AtomicU64::new(1),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the client sending a relay payload on `channel`.
    /// Returns false when nothing is subscribed.
    pub fn send(&self, channel: &str, payload: RelayPayload) -> bool {
        let handler = self.handlers.get(channel).map(|h| h.value().clone());
        match handler {
            Some(h) => {
                h(payload);
                true
            }
            None => false,
        }
    }

    pub fn events(&self) -> Vec<Emitted> {
        self.log.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn take_events(&self) -> Vec<Emitted> {
        self.log
            .lock()
            .map(|mut g| std::mem::take(&mut *g))
            .unwrap_or_default()
    }

    pub fn subscription_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn record(&self, event: &str, data: Value) {
        if !self.is_connected() {
            return;
        }
        if let Ok(mut g) = self.log.lock() {
            g.push(Emitted { event: event.to_string(), data });
        }
    }

    fn close(&self) {
        self.connected.store(false, Ordering::Release);
        self.handlers.clear();
        let ids: Vec<u64> = self.hooks.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, hook)) = self.hooks.remove(&id) {
                hook();
            }
        }
    }
}

impl SessionHandle for LocalSession {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn meta(&self) -> Value {
        self.meta.clone()
    }

    fn emit(&self, event: &str, data: Value) {
        self.record(event, data);
    }

    fn emit_relay(&self, channel: &str, payload: &RelayPayload) {
        let payload = match payload {
            RelayPayload::Json(v) => v.clone(),
            RelayPayload::Binary(b) => json!({ "binary_len": b.len() }),
        };
        self.record(events::LINK_RELAY, json!({ "channel": channel, "payload": payload }));
    }

    fn on(&self, channel: &str, handler: RelayHandler) {
        if self.is_connected() {
            self.handlers.insert(channel.to_string(), handler);
        }
    }

    fn off(&self, channel: &str) {
        self.handlers.remove(channel);
    }

    fn on_disconnect(&self, hook: DisconnectHook) -> HookId {
        let id = self.hook_seq.fetch_add(1, Ordering::Relaxed);
        if self.is_connected() {
            self.hooks.insert(id, hook);
        }
        HookId(id)
    }

    fn off_disconnect(&self, id: HookId) {
        self.hooks.remove(&id.0);
    }
}

/// Directory of [`LocalSession`]s keyed by endpoint id.
#[derive(Default)]
pub struct LocalDirectory {
    sessions: DashMap<String, Arc<LocalSession>>,
}

impl LocalDirectory {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    pub fn connect(&self, endpoint: &str) -> Arc<LocalSession> {
        self.connect_with_meta(endpoint, json!({ "name": endpoint }))
    }

    pub fn connect_with_meta(&self, endpoint: &str, meta: Value) -> Arc<LocalSession> {
        let session = Arc::new(LocalSession::new(endpoint, meta));
        self.sessions.insert(endpoint.to_string(), Arc::clone(&session));
        session
    }

    /// Remove the session and run its disconnect hooks.
    pub fn disconnect(&self, endpoint: &str) -> bool {
        // Remove first so hooks never observe the guard.
        let Some((_, session)) = self.sessions.remove(endpoint) else { return false; };
        session.close();
        true
    }

    pub fn session(&self, endpoint: &str) -> Option<Arc<LocalSession>> {
        self.sessions.get(endpoint).map(|s| Arc::clone(s.value()))
    }

    pub fn endpoints(&self) -> Vec<String> {
        let mut out: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        out.sort();
        out
    }
}

impl SessionDirectory for LocalDirectory {
    fn lookup(&self, endpoint: &str) -> Option<Arc<dyn SessionHandle>> {
        let s = self.sessions.get(endpoint)?;
        let handle: Arc<dyn SessionHandle> = Arc::clone(s.value()) as Arc<dyn SessionHandle>;
        Some(handle)
    }
}

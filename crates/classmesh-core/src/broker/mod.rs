//! Connection broker: per-pair signaling links between live sessions.
//!
//! The broker never owns sessions. It reads them from a [`SessionDirectory`]
//! owned by the host, wires relay subscriptions between two endpoints and
//! hands back a [`Link`] whose `destroy()` undoes the wiring.
//!
//! Join/leave and policy transitions race with disconnects, so:
//! - creating a link to an endpoint that is not connected yields a dead link,
//! - emitting to or unsubscribing from a vanished session is a silent no-op.

mod local;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use serde_json::{json, Value};

use crate::error::{MeshError, Result};

pub use local::{Emitted, LocalDirectory, LocalSession};

/// Notification names emitted to endpoints.
pub mod events {
    pub const LINK_CREATED: &str = "created";
    pub const LINK_DESTROYED: &str = "destroyed";
    pub const LINK_RELAY: &str = "relay";
}

/// Opaque signaling payload relayed between the two ends of a link.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayPayload {
    Json(Value),
    Binary(Bytes),
}

/// Callback invoked when an endpoint sends on a subscribed relay channel.
pub type RelayHandler = Arc<dyn Fn(RelayPayload) + Send + Sync>;

/// Callback invoked once when an endpoint disconnects.
pub type DisconnectHook = Box<dyn FnOnce() + Send + Sync>;

/// Registration handle for a disconnect hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(pub u64);

/// Live session as seen by the broker.
pub trait SessionHandle: Send + Sync {
    fn endpoint(&self) -> &str;

    /// Opaque display metadata forwarded to link peers.
    fn meta(&self) -> Value {
        Value::Null
    }

    /// Fire-and-forget notification to the client.
    fn emit(&self, event: &str, data: Value);

    /// Fire-and-forget relay of a peer payload on `channel`.
    fn emit_relay(&self, channel: &str, payload: &RelayPayload);

    /// Subscribe to payloads this client sends on `channel`.
    fn on(&self, channel: &str, handler: RelayHandler);

    fn off(&self, channel: &str);

    fn on_disconnect(&self, hook: DisconnectHook) -> HookId;

    fn off_disconnect(&self, id: HookId);
}

/// Lookup of currently connected sessions by endpoint id.
pub trait SessionDirectory: Send + Sync {
    fn lookup(&self, endpoint: &str) -> Option<Arc<dyn SessionHandle>>;
}

/// Creates links between sessions of one directory.
pub struct ConnectionBroker {
    directory: Arc<dyn SessionDirectory>,
    seq: AtomicU64,
}

impl ConnectionBroker {
    pub fn new(directory: Arc<dyn SessionDirectory>) -> Self {
        Self { directory, seq: AtomicU64::new(1) }
    }

    /// Wire a link between `initiator` and `recipient`.
    ///
    /// Empty ids are an error. An endpoint that is not connected is not: the
    /// link comes back dead (`is_alive() == false`) and nothing is emitted.
    pub fn create_link(&self, network: &str, initiator: &str, recipient: &str) -> Result<Link> {
        if initiator.is_empty() || recipient.is_empty() {
            return Err(MeshError::ProgramInvariant(format!(
                "link endpoints must be set (initiator={initiator:?}, recipient={recipient:?})"
            )));
        }

        let id = format!("L{}", self.seq.fetch_add(1, Ordering::Relaxed));
        let mut link = Link {
            id,
            network: network.to_string(),
            initiator: initiator.to_string(),
            recipient: recipient.to_string(),
            state: LinkState::Detached,
        };

        let (Some(a), Some(b)) = (self.directory.lookup(initiator), self.directory.lookup(recipient))
        else {
            tracing::debug!(%network, %initiator, %recipient, link = %link.id, "endpoint offline, link created dead");
            return Ok(link);
        };

        let up = link.channel(0);
        let down = link.channel(1);

        a.on(&up, forward_to(Arc::downgrade(&b), up.clone()));
        b.on(&down, forward_to(Arc::downgrade(&a), down.clone()));

        // A disconnecting end takes its own subscriptions with it; the peer's
        // subscription is dropped here.
        let hook_a = {
            let peer = Arc::downgrade(&b);
            let channel = down.clone();
            a.on_disconnect(Box::new(move || {
                if let Some(peer) = peer.upgrade() {
                    peer.off(&channel);
                }
            }))
        };
        let hook_b = {
            let peer = Arc::downgrade(&a);
            let channel = up.clone();
            b.on_disconnect(Box::new(move || {
                if let Some(peer) = peer.upgrade() {
                    peer.off(&channel);
                }
            }))
        };

        a.emit(events::LINK_CREATED, link.created_notice(true, &up, &down, b.as_ref()));
        b.emit(events::LINK_CREATED, link.created_notice(false, &down, &up, a.as_ref()));

        tracing::debug!(%network, %initiator, %recipient, link = %link.id, "link created");
        link.state = LinkState::Alive(Wiring {
            initiator: Arc::downgrade(&a),
            recipient: Arc::downgrade(&b),
            hooks: [hook_a, hook_b],
        });
        Ok(link)
    }
}

fn forward_to(peer: Weak<dyn SessionHandle>, channel: String) -> RelayHandler {
    Arc::new(move |payload: RelayPayload| match peer.upgrade() {
        Some(peer) => peer.emit_relay(&channel, &payload),
        None => tracing::debug!(%channel, "relay target vanished, payload dropped"),
    })
}

struct Wiring {
    initiator: Weak<dyn SessionHandle>,
    recipient: Weak<dyn SessionHandle>,
    hooks: [HookId; 2],
}

enum LinkState {
    /// Never wired (an endpoint was offline). Destroy is a no-op.
    Detached,
    Alive(Wiring),
    Destroyed,
}

/// Handle to one brokered connection between two endpoints.
pub struct Link {
    id: String,
    network: String,
    initiator: String,
    recipient: String,
    state: LinkState,
}

impl Link {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn initiator(&self) -> &str {
        &self.initiator
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.state, LinkState::Alive(_))
    }

    /// True if `endpoint` is either end of this link.
    pub fn touches(&self, endpoint: &str) -> bool {
        self.initiator == endpoint || self.recipient == endpoint
    }

    /// Per-direction relay channel id: `0` initiator→recipient, `1` back.
    pub fn channel(&self, direction: u8) -> String {
        format!("{}/{}", self.id, direction)
    }

    /// Tear the link down. Single use: destroying twice is an error.
    pub fn destroy(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, LinkState::Destroyed) {
            LinkState::Detached => {
                self.state = LinkState::Detached;
                Ok(())
            }
            LinkState::Destroyed => Err(MeshError::ProgramInvariant(format!(
                "link {} ({} - {}) already destroyed",
                self.id, self.initiator, self.recipient
            ))),
            LinkState::Alive(w) => {
                let notice = json!({ "network": self.network, "link": self.id });
                let ends = [(&w.initiator, self.channel(0), w.hooks[0]), (&w.recipient, self.channel(1), w.hooks[1])];
                for (end, channel, hook) in ends {
                    // Vanished sessions already dropped their subscriptions.
                    if let Some(s) = end.upgrade() {
                        s.off(&channel);
                        s.off_disconnect(hook);
                        s.emit(events::LINK_DESTROYED, notice.clone());
                    }
                }
                tracing::debug!(network = %self.network, link = %self.id, "link destroyed");
                Ok(())
            }
        }
    }

    fn created_notice(&self, initiator: bool, send: &str, recv: &str, peer: &dyn SessionHandle) -> Value {
        json!({
            "network": self.network,
            "link": self.id,
            "initiator": initiator,
            "send": send,
            "recv": recv,
            "peer": peer.endpoint(),
            "peer_meta": peer.meta(),
        })
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("network", &self.network)
            .field("initiator", &self.initiator)
            .field("recipient", &self.recipient)
            .field("alive", &self.is_alive())
            .finish()
    }
}

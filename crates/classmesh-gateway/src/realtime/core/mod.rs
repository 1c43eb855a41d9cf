//! Realtime core components for the gateway runtime.

mod presence;
mod realtime;
mod session_registry;

pub use presence::Presence;
pub use realtime::RealtimeCtx;
pub use session_registry::{GatewaySession, SessionRegistry};

//! Realtime runtime for the classmesh gateway.
//!
//! Session registry (the broker's session directory), per-activity network
//! presence and the per-message context handed to services.

pub mod core;

pub use self::core::{GatewaySession, Presence, RealtimeCtx, SessionRegistry};

//! classmesh gateway library entry.
//!
//! Hosts activities over WebSocket: sessions register with the broker,
//! `net` messages drive each network's coordinator, and `relay` traffic
//! flows over the links the coordinators create. Consumed by the binary
//! (`main.rs`) and by integration tests.

pub mod activity;
pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod realtime;
pub mod router;
pub mod serve;
pub mod services;
pub mod transport;

//! classmesh core: peer-to-peer topology coordination for live classrooms.
//!
//! A [`Network`] binds a policy to one logical channel of an activity. The
//! policy is a compiled program run by the [`runtime`]; it decides which
//! pairs of participants are linked, and the [`broker`] wires those links
//! between live sessions so they can exchange signaling payloads.
//!
//! This crate carries no transport or async runtime dependencies. Hosts plug
//! in through [`broker::SessionDirectory`], [`registry::PolicyStore`] and
//! [`program::ProgramLoader`].
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths surface as `MeshError`/`Result` so a misbehaving policy
//! or malformed client input cannot take the host process down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod broker;
pub mod coordinator;
pub mod error;
pub mod network;
pub mod program;
pub mod protocol;
pub mod registry;
pub mod runtime;
pub mod signal;
pub mod validator;
pub mod value;

/// Shared result type.
pub use error::{ClientCode, MeshError, Result};
pub use network::{Network, NetworkConfig};
pub use value::{ParamValue, Params};

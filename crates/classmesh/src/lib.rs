//! Top-level facade crate for classmesh.
//!
//! Re-exports core types and the gateway library so users can depend on a single crate.

pub mod core {
    pub use classmesh_core::*;
}

pub mod gateway {
    pub use classmesh_gateway::*;
}

pub use classmesh_core::{MeshError, Network, NetworkConfig, ParamValue, Params, Result};

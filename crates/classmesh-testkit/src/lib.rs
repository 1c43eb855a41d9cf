//! Testing tools for classmesh policies.
//!
//! - [`strategies`]: proptest strategies derived from a [`ValidatorConfig`],
//!   producing parameter sets and signals that satisfy (or violate) it.
//! - [`fuzz`]: a harness that drives a policy through join/leave sequences on
//!   a local session directory and checks the roster invariants after every
//!   step.
//!
//! [`ValidatorConfig`]: classmesh_core::validator::ValidatorConfig

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod fuzz;
pub mod strategies;

pub use fuzz::{EffectCall, PolicyHarness, RosterOp};

// Re-export proptest for convenience
pub use proptest;

//! Wire formats shared by hosts and client tooling.
//!
//! - Text lane: JSON envelopes with lazily parsed `RawValue` payloads.
//! - Relay lane: binary frames carrying opaque signaling bytes for one link
//!   direction.
//!
//! All parsers are panic-free: malformed input is reported as `MeshError`
//! instead of panicking or indexing raw buffers.

pub mod relay;
pub mod text;

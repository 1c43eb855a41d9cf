//! Built-in services.

pub mod net;
pub mod relay;

pub use net::NetService;
pub use relay::RelayService;

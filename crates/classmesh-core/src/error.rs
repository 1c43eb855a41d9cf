//! Shared error type across classmesh crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed message.
    BadRequest,
    /// Auth failed.
    AuthFailed,
    /// Policy missing or parameters rejected at setup.
    Configuration,
    /// Signal payload failed schema validation.
    SignalRejected,
    /// Unsupported protocol version.
    UnsupportedVersion,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::AuthFailed => "AUTH_FAILED",
            ClientCode::Configuration => "CONFIGURATION",
            ClientCode::SignalRejected => "SIGNAL_REJECTED",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("auth failed")]
    AuthFailed,
    /// Policy not found, parameters failed `validate()`, bad bytecode.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A signal did not match any alternative of the policy's validator.
    #[error("signal rejected: {0}")]
    SignalRejected(String),
    /// A policy program broke a link/group bookkeeping rule.
    #[error("program invariant violated: {0}")]
    ProgramInvariant(String),
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl MeshError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            MeshError::BadRequest(_) => ClientCode::BadRequest,
            MeshError::AuthFailed => ClientCode::AuthFailed,
            MeshError::Configuration(_) => ClientCode::Configuration,
            MeshError::SignalRejected(_) => ClientCode::SignalRejected,
            MeshError::ProgramInvariant(_) => ClientCode::Internal,
            MeshError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            MeshError::Internal(_) => ClientCode::Internal,
        }
    }

    /// True for errors a caller should surface as "the activity cannot start".
    pub fn is_configuration(&self) -> bool {
        matches!(self, MeshError::Configuration(_))
    }
}

impl From<serde_json::Error> for MeshError {
    fn from(e: serde_json::Error) -> Self {
        MeshError::Internal(format!("json: {e}"))
    }
}

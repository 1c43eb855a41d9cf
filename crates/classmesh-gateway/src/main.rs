//! classmesh gateway binary.
//!
//! - WebSocket endpoint: /v1/ws?activity=...&ticket=dev:<user>
//! - Config path: first argument, else `CLASSMESH_CONFIG`, else `classmesh.yaml`

use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use classmesh_gateway::serve;

const DEFAULT_CONFIG: &str = "classmesh.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CLASSMESH_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    match serve::serve_file(&path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(config = %path, error = %e, "gateway stopped");
            ExitCode::FAILURE
        }
    }
}

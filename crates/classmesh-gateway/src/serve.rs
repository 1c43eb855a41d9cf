//! Process lifecycle: load config, bind, serve until ctrl-c, close activities.

use std::net::SocketAddr;

use thiserror::Error;

use classmesh_core::error::MeshError;

use crate::app_state::AppState;
use crate::config::{self, GatewayConfig};
use crate::router;

/// Why the gateway could not start or stopped abnormally.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("config: {0}")]
    Config(#[from] MeshError),
    #[error("gateway.listen {addr:?} is not a socket address")]
    Listen { addr: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub fn listen_addr(cfg: &GatewayConfig) -> Result<SocketAddr, ServeError> {
    cfg.gateway
        .listen
        .parse()
        .map_err(|_| ServeError::Listen { addr: cfg.gateway.listen.clone() })
}

pub async fn serve_file(path: &str) -> Result<(), ServeError> {
    let cfg = config::load_from_file(path)?;
    serve(cfg).await
}

pub async fn serve(cfg: GatewayConfig) -> Result<(), ServeError> {
    let listen = listen_addr(&cfg)?;
    let state = AppState::new(cfg)?;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, activities = state.activities().len(), "classmesh-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "ctrl-c handler failed");
            }
            tracing::info!("shutdown requested");
        })
        .await?;

    state.activities().close_all();
    Ok(())
}

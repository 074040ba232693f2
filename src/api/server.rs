//! HTTP server startup and graceful shutdown.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use super::routes::build_router;
use super::state::AppState;
use crate::errors::{Error, Result};

/// Bind the configured address and serve until SIGINT/SIGTERM.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::io(e, format!("bind API server to {addr}")))?;
    info!(addr = %addr, "herald listening");

    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::io(e, "API server error"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "shutdown listener failed");
        }
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => warn!(error = %e, "SIGTERM listener failed"),
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}

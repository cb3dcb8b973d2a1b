//! Liveness endpoint for the hosting platform.

use std::net::SocketAddr;

use axum::{http::StatusCode, routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::BotError;

/// Always answers 200 while the process is up. It does not check the store or the gateway.
async fn liveness() -> (StatusCode, &'static str) {
    (StatusCode::OK, "online")
}

pub fn router() -> Router {
    Router::new().route("/", get(liveness))
}

/// Serves the liveness endpoint on `port` until `shutdown` is cancelled.
pub async fn serve(port: u16, shutdown: CancellationToken) -> Result<(), BotError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Liveness endpoint listening on {}", addr);

    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

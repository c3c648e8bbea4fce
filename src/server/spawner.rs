// src/server/spawner.rs

//! Spawns the server's long-running background tasks: the scoring
//! auto-update loop and the Prometheus metrics listener, the latter on
//! its own dedicated port.

use super::state::ServerState;
use crate::core::metrics::gather_metrics;
use crate::core::scoring::ScoringLoop;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use tracing::{error, info};

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

async fn run_metrics_server(port: u16) {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("prometheus metrics listening on http://{addr}/metrics");

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app).await {
                error!("metrics server exited: {e}");
            }
        }
        Err(e) => error!("failed to bind metrics server on port {port}: {e}"),
    }
}

/// Spawns the metrics listener and the scoring loop, returning the
/// scoring loop handle so the caller can shut it down on exit.
pub fn spawn_all(state: &ServerState) -> ScoringLoop {
    let metrics_port = state.config.metrics.port;
    tokio::spawn(run_metrics_server(metrics_port));

    ScoringLoop::spawn(state.scoring_engine.clone())
}

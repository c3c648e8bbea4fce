// src/server/mod.rs

//! Top-level server orchestration: builds state, spawns background
//! tasks, and serves the HTTP control plane, optionally over TLS.

use crate::config::Config;
use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use tracing::info;

pub mod http;
mod initialization;
mod spawner;
mod state;

pub use state::ServerState;

/// Runs the control plane until shutdown: rebuilds state from the
/// store, spawns the scoring loop and metrics listener, and serves the
/// HTTP API on the configured host/port (TLS when `WEB_TLS_DIR` is set).
pub async fn run(config: Config) -> Result<()> {
    let state = initialization::setup(config).await?;
    let scoring_loop = spawner::spawn_all(&state);

    let addr: SocketAddr = format!("{}:{}", state.config.web_server.host, state.config.web_server.port)
        .parse()
        .context("invalid WEB_HOST/WEB_PORT")?;
    let router = http::router(state.clone());

    let result = match &state.config.web_server.tls_dir {
        Some(dir) => {
            let cert_path = format!("{dir}/fullchain.pem");
            let key_path = format!("{dir}/privkey.pem");
            let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .with_context(|| format!("failed to load TLS material from {dir}"))?;

            info!("control plane listening on https://{addr}");
            axum_server::bind_rustls(addr, tls_config)
                .serve(router.into_make_service())
                .await
                .context("control plane server exited")
        }
        None => {
            info!("control plane listening on http://{addr}");
            axum_server::bind(addr)
                .serve(router.into_make_service())
                .await
                .context("control plane server exited")
        }
    };

    scoring_loop.shutdown();
    result
}

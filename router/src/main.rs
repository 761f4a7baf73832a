//! # Tunnel Router
//!
//! Rendezvous server for the port-forwarding tunnel. Runs two listeners:
//!
//! ```text
//! Agent  ──QUIC (new-transport)──►┐
//!                                  ├─► Router ──► paired & spliced
//! User   ──QUIC (new-transport)──►┘
//!
//! Agent  ──WebSocket (legacy control)──► Router ──notifies──► Agent
//! ```
//!
//! ## Modules
//!
//! - [`tunnel_router::quic_endpoint`] — new-transport rendezvous accept loop
//! - [`tunnel_router::legacy`]        — legacy control-channel WebSocket + notify API
//! - [`tunnel_router::api`]           — REST status endpoints
//! - [`tunnel_router::tls`]           — self-signed QUIC certificate

use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing::info;
use tunnel_router::{api, legacy, tls, AppState};

fn env_addr(key: &str, default: &str) -> SocketAddr {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| default.parse().unwrap())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tunnel_router=info".into()),
        )
        .init();

    let _ = rustls::crypto::ring::default_provider().install_default();

    let state = AppState::new();

    let quic_addr = env_addr("ROUTER_QUIC_ADDR", "0.0.0.0:7071");
    let (server_config, _cert_der) = tls::self_signed_server_config(vec!["localhost".into()])?;
    let endpoint = quinn::Endpoint::server(server_config, quic_addr)?;
    info!("🚇 Tunnel Router (QUIC rendezvous) listening on {quic_addr}");

    let quic_state = state.clone();
    let quic_task = tokio::spawn(tunnel_router::quic_endpoint::run(endpoint, quic_state));

    let http_addr = env_addr("ROUTER_HTTP_ADDR", "0.0.0.0:7070");
    let app = Router::new()
        .route("/legacy/control", get(legacy::control_ws))
        .route("/api/legacy/notify", post(legacy::notify))
        .route("/api/sessions", get(api::list_sessions))
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("🚇 Tunnel Router (HTTP + legacy control) listening on {http_addr}");
    let listener = tokio::net::TcpListener::bind(http_addr).await?;

    tokio::select! {
        res = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()) => {
            res?;
        }
        _ = quic_task => {
            info!("quic accept loop exited");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining connections");
}

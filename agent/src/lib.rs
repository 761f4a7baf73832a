//! # Agent Forwarder
//!
//! A library within a host binary (§6.4): dials the router, authenticates,
//! and runs per-session bridging loops for TCP, UDP, raw connection, and
//! WebSocket traffic (§2.4), plus the legacy control-channel forwarder kept
//! for rollback parity during migration (§2.5, §4.7).
//!
//! The host binary owns configuration, the authorization sidecar, and the
//! command runner (§1 Non-goals); this crate exposes only the operation
//! surface in §6.2 through [`Forwarder`].
//!
//! ## Modules
//!
//! - [`tcp`] / [`udp`] / [`ws`] / [`raw`] — the four bridge modes (§4.3–§4.6)
//! - [`legacy`] — the legacy control-channel forwarder (§4.7)
//! - [`token`] — the process-wide JWT cache (§2.6)
//! - [`telemetry`] — byte-count metric emission (§2.7)
//! - [`dial`] — the new-transport QUIC dial (§4.2/§6.3)
//! - [`config`] / [`error`] — the configuration and error surfaces (§6.1, §7)

pub mod config;
pub mod dial;
pub mod error;
mod init;
pub mod legacy;
pub mod raw;
pub mod tcp;
pub mod telemetry;
pub mod token;
pub mod udp;
pub mod ws;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use config::ForwarderConfig;
use error::Result;
use telemetry::TelemetrySink;
use token::TokenManager;

/// The operation a [`Forwarder::serve_port_forward`] call should run, in
/// new-transport mode (§6.2 `ServePortForward`). In legacy mode (§4.7) this
/// is ignored: the control channel discovers sub-connections dynamically.
#[derive(Debug, Clone)]
pub enum PortForwardSession {
    Tcp { session_key: String, local_port: u16 },
    Udp { session_key: String, local_port: u16 },
    WebSocket {
        session_key: String,
        local_port: u16,
        path: String,
    },
}

/// The agent forwarder (§2.4/§6.2): the single handle a host binary holds
/// to dial the router, authenticate, and run bridges.
///
/// Cloning is cheap — every field is an `Arc` or a plain value — so the
/// same handle can be shared across concurrently running sessions.
#[derive(Clone)]
pub struct Forwarder {
    config: ForwarderConfig,
    token_manager: Arc<TokenManager>,
    telemetry: TelemetrySink,
    closed: Arc<AtomicBool>,
}

impl Forwarder {
    pub fn new(config: ForwarderConfig, telemetry: TelemetrySink) -> Self {
        let token_manager = Arc::new(TokenManager::new(config.token_refresher.clone()));
        Self {
            config,
            token_manager,
            telemetry,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `ServePortForward(scope, session)` (§6.2): long-running. In
    /// new-transport mode, runs the single bridge `session` names and
    /// returns when it completes or `cancel` fires. In legacy mode, runs
    /// the persistent control-channel loop (§4.7), which produces many
    /// bridged connections over the lifetime of the call; `session` is
    /// unused there since sub-connections are discovered dynamically.
    #[instrument(skip(self, cancel, session))]
    pub async fn serve_port_forward(
        &self,
        cancel: CancellationToken,
        session: PortForwardSession,
    ) -> Result<()> {
        if self.config.use_new_transport {
            match session {
                PortForwardSession::Tcp {
                    session_key,
                    local_port,
                } => self.forward_tcp(cancel, session_key, local_port).await,
                PortForwardSession::Udp {
                    session_key,
                    local_port,
                } => self.forward_udp(cancel, session_key, local_port).await,
                PortForwardSession::WebSocket {
                    session_key,
                    local_port,
                    path,
                } => {
                    self.forward_websocket(cancel, session_key, local_port, &path)
                        .await
                }
            }
        } else {
            legacy::run_control_loop(
                &self.config,
                &self.token_manager,
                &self.telemetry,
                cancel,
                &session,
            )
            .await
        }
    }

    /// `ForwardTCP(scope, key, cookie, local_port, options)` (§6.2),
    /// minus `cookie`/`options` which are legacy-mode-only concerns (§4.7)
    /// carried by [`legacy::run_control_loop`] instead.
    #[instrument(skip(self, cancel))]
    pub async fn forward_tcp(
        &self,
        cancel: CancellationToken,
        session_key: String,
        local_port: u16,
    ) -> Result<()> {
        let token = self.token_manager.token().await?;
        tcp::forward_tcp(
            &self.config,
            session_key,
            local_port,
            &token,
            &self.telemetry,
            cancel,
        )
        .await
    }

    /// `ForwardUDP(scope, key, cookie, local_port)` (§6.2).
    #[instrument(skip(self, cancel))]
    pub async fn forward_udp(
        &self,
        cancel: CancellationToken,
        session_key: String,
        local_port: u16,
    ) -> Result<()> {
        let token = self.token_manager.token().await?;
        udp::forward_udp(
            &self.config,
            session_key,
            local_port,
            &token,
            &self.telemetry,
            cancel,
        )
        .await
    }

    /// `ForwardConn(scope, key, cookie, local_conn)` (§6.2).
    #[instrument(skip(self, cancel, local_conn))]
    pub async fn forward_conn<C>(
        &self,
        cancel: CancellationToken,
        session_key: String,
        local_conn: C,
        supports_half_close: bool,
    ) -> Result<()>
    where
        C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let token = self.token_manager.token().await?;
        raw::forward_conn(
            &self.config,
            session_key,
            local_conn,
            supports_half_close,
            &token,
            &self.telemetry,
            cancel,
        )
        .await
    }

    /// `ForwardWebSocket(scope, key, cookie, local_port, payload)` (§6.2).
    #[instrument(skip(self, cancel))]
    pub async fn forward_websocket(
        &self,
        cancel: CancellationToken,
        session_key: String,
        local_port: u16,
        path: &str,
    ) -> Result<()> {
        let token = self.token_manager.token().await?;
        ws::forward_websocket(
            &self.config,
            session_key,
            local_port,
            path,
            &token,
            &self.telemetry,
            cancel,
        )
        .await
    }

    /// `Close()` (§6.2): releases transport resources. Idempotent — a
    /// second call is a no-op, matching §8's idempotence law for tunnels
    /// and forwarders alike. Does not itself cancel in-flight bridges
    /// (callers hold their own `CancellationToken` per §5 for that); this
    /// only marks the forwarder unusable for new dials and drops the
    /// token manager's cached credential.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("forwarder closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

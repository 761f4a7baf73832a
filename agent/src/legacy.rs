//! Legacy WebSocket Forwarder (§2.5, §4.7).
//!
//! Retained for rollback parity during migration: the agent opens one
//! persistent control WebSocket to the router's legacy endpoint; the
//! router pushes JSON notifications of newly arrived user connections, and
//! the agent spawns a fresh TCP or WebSocket bridge for each one, keyed by
//! its sub-key. Unlike new-transport mode — where one session is exactly
//! one tunnel — a single legacy session can produce many bridged
//! connections over its lifetime (§4.7).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tunnel_protocol::legacy::{LegacyMessage, LegacyOperation};

use crate::config::ForwarderConfig;
use crate::error::{ForwarderError, Result};
use crate::telemetry::TelemetrySink;
use crate::token::TokenManager;
use crate::PortForwardSession;
use crate::{tcp, ws};

/// Runs the legacy control-channel loop until `cancel` fires, the peer
/// closes the channel, or the control-channel dial's retry budget is
/// exhausted (§4.8: up to 10 attempts, 1s apart).
///
/// `session` supplies the local target (`local_port`, and `path` for
/// WebSocket sub-connections) that every notification on this control
/// channel bridges to — only the per-notification sub-key varies; in
/// legacy mode one control channel stands in for many individually keyed
/// data connections rather than the one-tunnel-per-session new-transport
/// model (§6.2).
pub async fn run_control_loop(
    config: &ForwarderConfig,
    token_manager: &Arc<TokenManager>,
    telemetry: &TelemetrySink,
    cancel: CancellationToken,
    session: &PortForwardSession,
) -> Result<()> {
    let base_url = config.legacy_router_url.as_deref().ok_or_else(|| {
        ForwarderError::Protocol("legacy_router_url is not configured".to_string())
    })?;
    let mut url = url::Url::parse(base_url)
        .map_err(|e| ForwarderError::Protocol(format!("invalid legacy_router_url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("workflow_id", &config.workflow_id);

    let (local_port, default_path) = match session {
        PortForwardSession::Tcp { local_port, .. } => (*local_port, None),
        PortForwardSession::Udp { local_port, .. } => (*local_port, None),
        PortForwardSession::WebSocket {
            local_port, path, ..
        } => (*local_port, Some(path.clone())),
    };

    let ws_stream = dial_control_channel(url.as_str(), &config.legacy_control_retry).await?;
    let (_sink, mut stream) = ws_stream.split();

    // `None` preserves the teacher's unbounded-spawn behavior (§9 open
    // question); `Some(n)` caps how many sub-connections run at once.
    let semaphore = config
        .max_concurrent_legacy_sessions
        .map(|n| Arc::new(Semaphore::new(n)));

    info!("legacy control channel connected");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = stream.next() => msg,
        };
        let text = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!("legacy control channel error: {e}");
                break;
            }
        };

        let notification = match LegacyMessage::from_json(&text) {
            Ok(n) => n,
            Err(e) => {
                warn!("malformed legacy notification: {e}");
                continue;
            }
        };

        if let Some(payload) = &notification.payload {
            if let Ok(decoded) = BASE64.decode(payload) {
                debug!(bytes = decoded.len(), "legacy notification payload");
            }
        }

        spawn_sub_connection(
            config.clone(),
            token_manager.clone(),
            telemetry.clone(),
            cancel.clone(),
            semaphore.clone(),
            local_port,
            default_path.clone(),
            notification,
        );
    }

    info!("legacy control channel disconnected");
    Ok(())
}

/// Spawns one sub-connection's bridge in the background. Its outcome is
/// logged, never propagated — a single bad sub-connection must not bring
/// down the whole control-channel loop (§7 propagation rules).
#[allow(clippy::too_many_arguments)]
fn spawn_sub_connection(
    config: ForwarderConfig,
    token_manager: Arc<TokenManager>,
    telemetry: TelemetrySink,
    cancel: CancellationToken,
    semaphore: Option<Arc<Semaphore>>,
    local_port: u16,
    default_path: Option<String>,
    notification: LegacyMessage,
) {
    tokio::spawn(async move {
        let _permit = match &semaphore {
            Some(sem) => match sem.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return,
            },
            None => None,
        };

        let key = notification.key.clone();
        let token = match token_manager.token().await {
            Ok(t) => t,
            Err(e) => {
                warn!(sub_key = %key, "token refresh failed for legacy sub-connection: {e}");
                return;
            }
        };

        let result = match notification.msg_type {
            LegacyOperation::PortForwardTcp => {
                tcp::forward_tcp(&config, key.clone(), local_port, &token, &telemetry, cancel)
                    .await
            }
            LegacyOperation::PortForwardWs => {
                let path = default_path.as_deref().unwrap_or("/");
                ws::forward_websocket(
                    &config, key.clone(), local_port, path, &token, &telemetry, cancel,
                )
                .await
            }
        };

        if let Err(e) = result {
            warn!(sub_key = %key, "legacy sub-connection ended with error: {e}");
        }
    });
}

async fn dial_control_channel(
    url: &str,
    retry: &crate::config::RetryPolicy,
) -> Result<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>>
{
    let mut last_err = None;
    for attempt in 0..retry.attempts {
        match tokio_tungstenite::connect_async(url).await {
            Ok((stream, _)) => return Ok(stream),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < retry.attempts {
                    tokio::time::sleep(retry.delay).await;
                }
            }
        }
    }
    Err(ForwarderError::dial(
        crate::error::DialTarget::LegacyControl,
        last_err.unwrap(),
    ))
}

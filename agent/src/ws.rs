//! Agent Forwarder — WebSocket Mode (§4.5).

use futures::{SinkExt, StreamExt};
use std::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use tunnel_protocol::message::InitMessage;

use crate::config::{ForwarderConfig, RetryPolicy};
use crate::dial::dial_router;
use crate::error::{DialTarget, ForwarderError, Result};
use crate::init::agent_init;
use crate::telemetry::{Metric, TelemetrySink};

/// Runs a single WebSocket bridge: dials the router, dials a local
/// WebSocket server, and bridges the two (§4.5).
#[instrument(skip(config, telemetry, cancel), fields(session_key = %session_key))]
pub async fn forward_websocket(
    config: &ForwarderConfig,
    session_key: String,
    local_port: u16,
    path: &str,
    token: &str,
    telemetry: &TelemetrySink,
    cancel: CancellationToken,
) -> Result<()> {
    let (insecure, router_addr) = config.parsed_router_address();
    let init = InitMessage::Agent(agent_init(config, session_key, token));
    let tunnel = dial_router(router_addr, insecure, &init).await?;

    let url = format!("ws://127.0.0.1:{local_port}{path}");
    let ws = dial_local_ws(&url, &config.local_ws_retry).await?;
    let (mut ws_sink, mut ws_stream) = ws.split();
    let (mut send, mut recv) = tunnel.into_split();

    let start = Instant::now();

    let ws_to_tunnel = {
        let cancel = cancel.clone();
        async move {
            let mut bytes = 0u64;
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = send.close().await;
                        break;
                    }
                    msg = ws_stream.next() => msg,
                };
                match next {
                    Some(Ok(Message::Binary(payload))) => {
                        if send.write_all(&payload).await.is_err() {
                            break;
                        }
                        bytes += payload.len() as u64;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            let _ = send.close_send().await;
            bytes
        }
    };

    let tunnel_to_ws = async {
        let mut buf = vec![0u8; 16 * 1024];
        let mut bytes = 0u64;
        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                r = recv.read(&mut buf) => r,
            };
            match read {
                Ok(0) => break,
                Ok(n) => {
                    if ws_sink
                        .send(Message::Binary(buf[..n].to_vec().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                    bytes += n as u64;
                }
                Err(_) => break,
            }
        }
        let _ = ws_sink.send(Message::Close(None)).await;
        bytes
    };

    let (received, sent) = tokio::join!(ws_to_tunnel, tunnel_to_ws);

    telemetry.emit(Metric::new("port_forward_ws_OUTPUT", start, sent));
    telemetry.emit(Metric::new("port_forward_ws_INPUT", start, received));

    Ok(())
}

async fn dial_local_ws(
    url: &str,
    retry: &RetryPolicy,
) -> Result<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>> {
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
        DialTarget::LocalWebSocket,
        last_err.unwrap(),
    ))
}

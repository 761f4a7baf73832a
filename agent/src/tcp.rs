//! Agent Forwarder — TCP Mode (§4.3).

use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use tunnel_protocol::message::InitMessage;

use crate::config::ForwarderConfig;
use crate::dial::dial_router;
use crate::error::{DialTarget, ForwarderError, Result};
use crate::init::agent_init;
use crate::telemetry::{Metric, TelemetrySink};

/// Runs a single TCP bridge: dials the router, dials the local port, and
/// bridges the two until both directions have completed (§4.3 step 5).
///
/// `cancel` is the caller's cancellation scope (§5): when fired, both
/// workers are torn down immediately via a full tunnel close rather than
/// the graceful half-close sequence, and the bridge returns as soon as
/// both have unwound.
#[instrument(skip(config, telemetry, cancel), fields(session_key = %session_key))]
pub async fn forward_tcp(
    config: &ForwarderConfig,
    session_key: String,
    local_port: u16,
    token: &str,
    telemetry: &TelemetrySink,
    cancel: CancellationToken,
) -> Result<()> {
    let (insecure, router_addr) = config.parsed_router_address();
    let init = InitMessage::Agent(agent_init(config, session_key, token));
    let tunnel = dial_router(router_addr, insecure, &init).await?;

    let local = dial_local_port(local_port, &config.local_port_retry).await?;
    let (mut local_read, mut local_write) = local.into_split();
    let (mut send, mut recv) = tunnel.into_split();

    let start = Instant::now();

    let local_to_tunnel = {
        let cancel = cancel.clone();
        async move {
            let mut buf = vec![0u8; 16 * 1024];
            let mut bytes = 0u64;
            loop {
                let read = tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = send.close().await;
                        break;
                    }
                    r = local_read.read(&mut buf) => r,
                };
                match read {
                    Ok(0) => break,
                    Ok(n) => {
                        if send.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                        bytes += n as u64;
                    }
                    Err(_) => break,
                }
            }
            let _ = send.close_send().await;
            bytes
        }
    };

    let tunnel_to_local = async {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = local_write.shutdown().await;
                0
            }
            bytes = recv.copy_to(&mut local_write) => {
                let bytes = bytes.unwrap_or(0);
                let _ = local_write.shutdown().await;
                bytes
            }
        }
    };

    let (sent, received) = tokio::join!(local_to_tunnel, tunnel_to_local);

    telemetry.emit(Metric::new("port_forward_tcp_OUTPUT", start, sent));
    telemetry.emit(Metric::new("port_forward_tcp_INPUT", start, received));

    Ok(())
}

async fn dial_local_port(
    local_port: u16,
    retry: &crate::config::RetryPolicy,
) -> Result<TcpStream> {
    let addr = format!("127.0.0.1:{local_port}");
    let mut last_err = None;
    for attempt in 0..retry.attempts {
        match TcpStream::connect(&addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < retry.attempts {
                    tokio::time::sleep(retry.delay).await;
                }
            }
        }
    }
    Err(ForwarderError::dial(
        DialTarget::LocalPort,
        last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "no connection attempts made")
        }),
    ))
}

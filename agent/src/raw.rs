//! Agent Forwarder — Raw Connection Mode (§4.6).
//!
//! Given a pre-existing local connection (e.g. a Unix socket to a PTY
//! supervisor for `Exec`), runs the same symmetric bridge as TCP mode, but
//! without dialing: the caller supplies the local end. Generic over any
//! `AsyncRead + AsyncWrite` local connection, since half-close support
//! varies by connection type.

use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use tunnel_protocol::message::InitMessage;

use crate::config::ForwarderConfig;
use crate::dial::dial_router;
use crate::error::Result;
use crate::init::agent_init;
use crate::telemetry::{Metric, TelemetrySink};

/// Bridges `local_conn` to a freshly dialed tunnel. `local_conn` must
/// support splitting into independent read/write halves (`tokio::io::split`
/// works for any `AsyncRead + AsyncWrite` type); if the underlying
/// connection doesn't support a real half-close, the bridge falls back to
/// closing both directions on the first EOF it observes (§4.6).
///
/// `cancel` behaves as in [`crate::tcp::forward_tcp`]: firing it tears the
/// bridge down via a full tunnel close rather than waiting on either side's
/// own EOF.
#[instrument(skip(config, local_conn, telemetry, cancel), fields(session_key = %session_key))]
pub async fn forward_conn<C>(
    config: &ForwarderConfig,
    session_key: String,
    local_conn: C,
    supports_half_close: bool,
    token: &str,
    telemetry: &TelemetrySink,
    cancel: CancellationToken,
) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (insecure, router_addr) = config.parsed_router_address();
    let init = InitMessage::Agent(agent_init(config, session_key, token));
    let tunnel = dial_router(router_addr, insecure, &init).await?;

    let (mut local_read, mut local_write) = tokio::io::split(local_conn);
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
        let bytes = tokio::select! {
            _ = cancel.cancelled() => 0,
            bytes = recv.copy_to(&mut local_write) => bytes.unwrap_or(0),
        };
        if supports_half_close {
            let _ = local_write.shutdown().await;
        }
        bytes
    };

    let (sent, received) = tokio::join!(local_to_tunnel, tunnel_to_local);

    if !supports_half_close {
        // Neither direction supports half-close: fall back to closing
        // both ends once the bridge has finished (documented, not silent).
        let _ = local_write.shutdown().await;
    }

    telemetry.emit(Metric::new("exec_OUTPUT", start, sent));
    telemetry.emit(Metric::new("exec_INPUT", start, received));

    Ok(())
}

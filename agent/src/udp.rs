//! Agent Forwarder — UDP Mode (§4.4).
//!
//! UDP is datagram-oriented and cannot ride `io::copy`-style streaming, so
//! each datagram is carried as one length-delimited frame on the tunnel,
//! with its body prefixed by a 6-byte [`UdpHeader`] identifying the remote
//! peer on the user side. A local socket is opened per distinct peer the
//! main read loop observes; each socket gets its own reverse-reader task
//! writing replies back onto the tunnel.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use tunnel_protocol::frame::DEFAULT_MAX_FRAME_BYTES;
use tunnel_protocol::message::InitMessage;
use tunnel_protocol::tunnel::TunnelSendHalf;
use tunnel_protocol::udp::{decode_udp_body, encode_udp_body, UdpHeader};

use crate::config::ForwarderConfig;
use crate::dial::dial_router;
use crate::error::Result;
use crate::init::agent_init;
use crate::telemetry::{Metric, TelemetrySink};

/// Serializes writes onto the tunnel's send half: the main read loop never
/// writes, but multiple reverse readers do, and their frames must not
/// interleave (§4.4 step 4, §5 shared-resource policy).
type SharedSend = Arc<AsyncMutex<TunnelSendHalf<quinn::SendStream>>>;

#[instrument(skip(config, telemetry, cancel), fields(session_key = %session_key))]
pub async fn forward_udp(
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
    let (send, mut recv) = tunnel.into_split();
    let shared_send: SharedSend = Arc::new(AsyncMutex::new(send));

    let peer_sockets: Arc<DashMap<[u8; 6], Arc<UdpSocket>>> = Arc::new(DashMap::new());
    let mut reverse_tasks = Vec::new();
    // Signals every reverse reader to stop once the main loop exits; a
    // dropped Arc<UdpSocket> alone wouldn't stop a reader still holding
    // its own clone, so an explicit shutdown signal is needed instead.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let start = Instant::now();
    let bytes_in = Arc::new(AtomicU64::new(0));
    let bytes_out = Arc::new(AtomicU64::new(0));

    loop {
        let body = tokio::select! {
            _ = cancel.cancelled() => break,
            result = recv.read_frame(DEFAULT_MAX_FRAME_BYTES) => match result {
                Ok(body) => body,
                Err(_) => break,
            },
        };
        // Frame shorter than the header is dropped silently (§4.4 step 3,
        // §8 boundary behavior).
        let Some((header, payload)) = decode_udp_body(&body) else {
            continue;
        };
        let header_bytes = header.0;
        let payload = payload.to_vec();
        bytes_in.fetch_add(payload.len() as u64, Ordering::Relaxed);

        let socket = match peer_sockets.get(&header_bytes) {
            Some(existing) => existing.clone(),
            None => {
                let socket = match open_peer_socket(local_port).await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("failed to open local udp socket: {e}");
                        continue;
                    }
                };
                peer_sockets.insert(header_bytes, socket.clone());
                reverse_tasks.push(tokio::spawn(reverse_reader(
                    socket.clone(),
                    UdpHeader(header_bytes),
                    shared_send.clone(),
                    shutdown_rx.clone(),
                    bytes_out.clone(),
                )));
                socket
            }
        };

        if let Err(e) = socket.send(&payload).await {
            warn!("local udp send failed: {e}");
        }
    }

    // Shutdown: tell every reverse reader to stop, then await all of them.
    peer_sockets.clear();
    let _ = shutdown_tx.send(true);
    for task in reverse_tasks {
        let _ = task.await;
    }
    if cancel.is_cancelled() {
        let mut send = shared_send.lock().await;
        let _ = send.close().await;
    }

    telemetry.emit(Metric::new(
        "port_forward_udp_INPUT",
        start,
        bytes_in.load(Ordering::Relaxed),
    ));
    telemetry.emit(Metric::new(
        "port_forward_udp_OUTPUT",
        start,
        bytes_out.load(Ordering::Relaxed),
    ));

    Ok(())
}

async fn open_peer_socket(local_port: u16) -> std::io::Result<Arc<UdpSocket>> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.connect(("127.0.0.1", local_port)).await?;
    Ok(Arc::new(socket))
}

/// Reads datagrams from `socket`, prefixes the header they arrived under,
/// and writes the framed datagram back onto the shared tunnel send half.
/// Exits on shutdown signal or on any socket/tunnel error.
async fn reverse_reader(
    socket: Arc<UdpSocket>,
    header: UdpHeader,
    shared_send: SharedSend,
    mut shutdown_rx: watch::Receiver<bool>,
    bytes_out: Arc<AtomicU64>,
) {
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = tokio::select! {
            result = socket.recv(&mut buf) => match result {
                Ok(n) => n,
                Err(_) => return,
            },
            _ = shutdown_rx.changed() => return,
        };
        bytes_out.fetch_add(n as u64, Ordering::Relaxed);
        let body = encode_udp_body(header, &buf[..n]);
        let mut send = shared_send.lock().await;
        if send.write_frame(&body).await.is_err() {
            return;
        }
    }
}

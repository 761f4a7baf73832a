//! Shared harness for the agent integration tests: an in-process router
//! plus small local TCP/UDP echo servers, grounded on the same loopback
//! rendezvous pattern the router crate's own dev-dependency on
//! `tunnel-protocol` already implies for its own tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, UdpSocket};

use tunnel_agent::config::{
    ForwarderConfig, RefresherFuture, RefreshedToken, RetryPolicy, TlsConfig, TokenRefresher,
};
use tunnel_agent::dial::{dial_router, QuicTunnel};
use tunnel_protocol::message::{InitMessage, Operation, UserInit};

pub const TEST_WORKFLOW: &str = "test-workflow";
pub const TEST_TOKEN: &str = "test-token";

struct FixedToken;

impl TokenRefresher for FixedToken {
    fn refresh(&self) -> RefresherFuture {
        Box::pin(async {
            Ok(RefreshedToken {
                token: TEST_TOKEN.to_string(),
                expires_at: Instant::now() + Duration::from_secs(3600),
            })
        })
    }
}

/// Starts a router QUIC endpoint on an ephemeral loopback port and runs its
/// accept loop in the background for the rest of the test process.
pub async fn start_router() -> SocketAddr {
    // `try_init` rather than `init`: every test binary calls this once per
    // test, and a second `init` call would panic on the already-set global
    // subscriber. Run with `RUST_LOG=debug cargo test` to see it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();

    // Only the first call in a test binary actually installs the provider;
    // later calls across other tests in the same binary are harmless no-ops.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (server_config, _cert_der) =
        tunnel_router::tls::self_signed_server_config(vec!["localhost".into()])
            .expect("self-signed cert generation failed");
    let endpoint = quinn::Endpoint::server(server_config, "127.0.0.1:0".parse().unwrap())
        .expect("failed to bind router quic endpoint");
    let addr = endpoint.local_addr().expect("router endpoint has no local addr");

    let state = tunnel_router::AppState::new();
    tokio::spawn(tunnel_router::quic_endpoint::run(endpoint, state));
    addr
}

/// Builds an agent config dialing `quic_addr` with certificate verification
/// skipped, matching the `insecure:`-prefixed local-dev path (§6.1).
pub fn test_config(quic_addr: SocketAddr) -> ForwarderConfig {
    let fast_retry = RetryPolicy::new(5, Duration::from_millis(50));
    ForwarderConfig {
        router_address: format!("insecure:{quic_addr}"),
        legacy_router_url: None,
        use_new_transport: true,
        workflow_id: TEST_WORKFLOW.to_string(),
        token_header_name: "authorization".to_string(),
        token_refresher: Arc::new(FixedToken),
        tls: TlsConfig { insecure: true },
        local_port_retry: fast_retry,
        local_ws_retry: fast_retry,
        legacy_control_retry: fast_retry,
        max_concurrent_legacy_sessions: None,
    }
}

/// Dials the router directly as the user side of a session, bypassing the
/// agent's own dial helper (which only ever sends `AgentInit`).
pub async fn dial_user(quic_addr: SocketAddr, session_key: &str, operation: Operation) -> QuicTunnel {
    let init = InitMessage::User(UserInit {
        session_key: session_key.to_string(),
        workflow_id: TEST_WORKFLOW.to_string(),
        operation,
    });
    dial_router(&quic_addr.to_string(), true, &init)
        .await
        .expect("user dial failed")
}

/// Spawns a loopback TCP echo server, returning the port it listens on.
pub async fn spawn_tcp_echo() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let (mut read_half, mut write_half) = socket.split();
                let _ = tokio::io::copy(&mut read_half, &mut write_half).await;
            });
        }
    });
    port
}

/// Spawns a loopback UDP echo server, returning the port it listens on.
pub async fn spawn_udp_echo() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let _ = socket.send_to(&buf[..n], peer).await;
        }
    });
    port
}

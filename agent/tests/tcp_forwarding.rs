//! TCP bridge end-to-end scenarios (spec.md §8, scenarios 1-4).

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tunnel_agent::telemetry::TelemetrySink;
use tunnel_protocol::message::{Operation, PortForwardProtocol};

use common::{dial_user, spawn_tcp_echo, start_router, test_config, TEST_TOKEN};

#[tokio::test]
async fn tcp_echo_round_trips_byte_exact() {
    let quic_addr = start_router().await;
    let local_port = spawn_tcp_echo().await;
    let config = test_config(quic_addr);
    let telemetry = TelemetrySink::disabled();
    let cancel = CancellationToken::new();
    let session_key = "tcp-echo".to_string();

    let agent_task = tokio::spawn({
        let config = config.clone();
        let telemetry = telemetry.clone();
        let cancel = cancel.clone();
        let session_key = session_key.clone();
        async move {
            tunnel_agent::tcp::forward_tcp(
                &config,
                session_key,
                local_port,
                TEST_TOKEN,
                &telemetry,
                cancel,
            )
            .await
        }
    });

    let tunnel = dial_user(
        quic_addr,
        &session_key,
        Operation::PortForward {
            protocol: PortForwardProtocol::Tcp,
            port: local_port,
        },
    )
    .await;
    let (mut send, mut recv) = tunnel.into_split();

    let payload = "grpc-test".repeat(1000).into_bytes();
    assert_eq!(payload.len(), 9000);
    send.write_all(&payload).await.unwrap();
    send.close_send().await.unwrap();

    let out = read_all(&mut recv).await;
    assert_eq!(out, payload);

    cancel.cancel();
    let _ = agent_task.await;
}

#[tokio::test]
async fn tcp_100kib_burst_completes_within_ten_seconds() {
    let quic_addr = start_router().await;
    let local_port = spawn_tcp_echo().await;
    let config = test_config(quic_addr);
    let telemetry = TelemetrySink::disabled();
    let cancel = CancellationToken::new();
    let session_key = "tcp-burst".to_string();

    let agent_task = tokio::spawn({
        let config = config.clone();
        let telemetry = telemetry.clone();
        let cancel = cancel.clone();
        let session_key = session_key.clone();
        async move {
            tunnel_agent::tcp::forward_tcp(
                &config,
                session_key,
                local_port,
                TEST_TOKEN,
                &telemetry,
                cancel,
            )
            .await
        }
    });

    let payload: Vec<u8> = (0..102_400).map(|i| (i % 256) as u8).collect();

    let result = tokio::time::timeout(Duration::from_secs(10), async {
        let tunnel = dial_user(
            quic_addr,
            &session_key,
            Operation::PortForward {
                protocol: PortForwardProtocol::Tcp,
                port: local_port,
            },
        )
        .await;
        let (mut send, mut recv) = tunnel.into_split();
        send.write_all(&payload).await.unwrap();
        send.close_send().await.unwrap();
        read_all(&mut recv).await
    })
    .await
    .expect("burst did not complete within 10 seconds");

    assert_eq!(result, payload);

    cancel.cancel();
    let _ = agent_task.await;
}

#[tokio::test]
async fn ten_concurrent_tunnels_see_no_cross_talk() {
    let quic_addr = start_router().await;
    let local_port = spawn_tcp_echo().await;
    let config = test_config(quic_addr);
    let telemetry = TelemetrySink::disabled();
    let cancel = CancellationToken::new();

    let mut agent_tasks = Vec::new();
    for id in 0u8..10 {
        let session_key = format!("concurrent-{id}");
        let config = config.clone();
        let telemetry = telemetry.clone();
        let cancel = cancel.clone();
        agent_tasks.push(tokio::spawn(async move {
            tunnel_agent::tcp::forward_tcp(
                &config,
                session_key,
                local_port,
                TEST_TOKEN,
                &telemetry,
                cancel,
            )
            .await
        }));
    }

    let mut user_tasks = Vec::new();
    for id in 0u8..10 {
        user_tasks.push(tokio::spawn(async move {
            let session_key = format!("concurrent-{id}");
            let tunnel = dial_user(
                quic_addr,
                &session_key,
                Operation::PortForward {
                    protocol: PortForwardProtocol::Tcp,
                    port: local_port,
                },
            )
            .await;
            let (mut send, mut recv) = tunnel.into_split();
            let payload = vec![id; 1000];
            send.write_all(&payload).await.unwrap();
            send.close_send().await.unwrap();
            let out = read_all(&mut recv).await;
            assert_eq!(out, payload, "cross-talk on session {session_key}");
        }));
    }

    for task in user_tasks {
        task.await.unwrap();
    }

    cancel.cancel();
    for task in agent_tasks {
        let _ = task.await;
    }
}

#[tokio::test]
async fn half_close_lets_the_other_direction_keep_flowing() {
    let quic_addr = start_router().await;
    let local_port = spawn_tcp_echo().await;
    let config = test_config(quic_addr);
    let telemetry = TelemetrySink::disabled();
    let cancel = CancellationToken::new();
    let session_key = "half-close".to_string();

    let agent_task = tokio::spawn({
        let config = config.clone();
        let telemetry = telemetry.clone();
        let cancel = cancel.clone();
        let session_key = session_key.clone();
        async move {
            tunnel_agent::tcp::forward_tcp(
                &config,
                session_key,
                local_port,
                TEST_TOKEN,
                &telemetry,
                cancel,
            )
            .await
        }
    });

    let payload = vec![0xABu8; 64 * 1024];

    let out = tokio::time::timeout(Duration::from_secs(15), async {
        let tunnel = dial_user(
            quic_addr,
            &session_key,
            Operation::PortForward {
                protocol: PortForwardProtocol::Tcp,
                port: local_port,
            },
        )
        .await;
        let (mut send, mut recv) = tunnel.into_split();
        send.write_all(&payload).await.unwrap();
        send.close_send().await.unwrap();
        read_all(&mut recv).await
    })
    .await
    .expect("half-close scenario exceeded 15 seconds");

    assert_eq!(out.len(), payload.len());
    assert_eq!(out, payload);

    cancel.cancel();
    let _ = agent_task.await;
}

async fn read_all(recv: &mut tunnel_protocol::tunnel::TunnelRecvHalf<quinn::RecvStream>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 16 * 1024];
    loop {
        let n = recv.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

//! UDP peer multiplexing scenario (spec.md §8, scenario 5).

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tunnel_agent::telemetry::TelemetrySink;
use tunnel_protocol::frame::DEFAULT_MAX_FRAME_BYTES;
use tunnel_protocol::message::{Operation, PortForwardProtocol};
use tunnel_protocol::udp::{decode_udp_body, encode_udp_body, UdpHeader};

use common::{dial_user, spawn_udp_echo, start_router, test_config, TEST_TOKEN};

#[tokio::test]
async fn two_peer_headers_multiplex_over_one_tunnel() {
    let quic_addr = start_router().await;
    let local_port = spawn_udp_echo().await;
    let config = test_config(quic_addr);
    let telemetry = TelemetrySink::disabled();
    let cancel = CancellationToken::new();
    let session_key = "udp-multiplex".to_string();

    let agent_task = tokio::spawn({
        let config = config.clone();
        let telemetry = telemetry.clone();
        let cancel = cancel.clone();
        let session_key = session_key.clone();
        async move {
            tunnel_agent::udp::forward_udp(
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
            protocol: PortForwardProtocol::Udp,
            port: local_port,
        },
    )
    .await;
    let (mut send, mut recv) = tunnel.into_split();

    let h1 = UdpHeader::from_addr("203.0.113.7:40000".parse().unwrap()).unwrap();
    let h2 = UdpHeader::from_addr("203.0.113.9:40001".parse().unwrap()).unwrap();

    let sent = [
        (h1, b"alpha-1".to_vec()),
        (h2, b"beta-1".to_vec()),
        (h1, b"alpha-2".to_vec()),
        (h2, b"beta-2".to_vec()),
    ];

    for (header, payload) in &sent {
        send.write_frame(&encode_udp_body(*header, payload))
            .await
            .unwrap();
    }

    let received = tokio::time::timeout(Duration::from_secs(10), async {
        let mut frames = Vec::new();
        while frames.len() < sent.len() {
            let body = recv.read_frame(DEFAULT_MAX_FRAME_BYTES).await.unwrap();
            let (header, payload) = decode_udp_body(&body).expect("undersized udp frame");
            frames.push((header, payload.to_vec()));
        }
        frames
    })
    .await
    .expect("did not receive all echoed datagrams in time");

    let h1_replies: Vec<_> = received
        .iter()
        .filter(|(h, _)| *h == h1)
        .map(|(_, p)| p.clone())
        .collect();
    let h2_replies: Vec<_> = received
        .iter()
        .filter(|(h, _)| *h == h2)
        .map(|(_, p)| p.clone())
        .collect();

    assert_eq!(h1_replies, vec![b"alpha-1".to_vec(), b"alpha-2".to_vec()]);
    assert_eq!(h2_replies, vec![b"beta-1".to_vec(), b"beta-2".to_vec()]);

    cancel.cancel();
    let _ = agent_task.await;
}

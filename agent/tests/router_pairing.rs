//! Router pairing / collision scenario (spec.md §8, scenario 6).
//!
//! Exercises `dial_router` directly with `AgentInit`/`UserInit` frames,
//! bypassing the bridge modes entirely, since collision is a property of
//! the rendezvous itself rather than of any particular bridge.

mod common;

use std::time::Duration;

use tunnel_agent::dial::dial_router;
use tunnel_protocol::message::{AgentInit, InitMessage, Operation, PortForwardProtocol, UserInit};

use common::{start_router, TEST_WORKFLOW};

#[tokio::test]
async fn two_agents_with_the_same_session_key_collide() {
    let quic_addr = start_router().await;
    let addr = quic_addr.to_string();
    let session_key = "collision-key".to_string();

    let agent_init = || {
        InitMessage::Agent(AgentInit {
            session_key: session_key.clone(),
            workflow_id: TEST_WORKFLOW.to_string(),
            metadata: Default::default(),
        })
    };

    let (t1, t2) = {
        let addr1 = addr.clone();
        let addr2 = addr.clone();
        let init1 = agent_init();
        let init2 = agent_init();
        tokio::join!(
            tokio::spawn(async move { dial_router(&addr1, true, &init1).await }),
            tokio::spawn(async move { dial_router(&addr2, true, &init2).await }),
        )
    };
    let t1 = t1.unwrap().expect("first agent dial failed");
    let t2 = t2.unwrap().expect("second agent dial failed");

    // Give the router a moment to process both arrivals: the first occupies
    // `pending`, the second observes the same-role collision and is
    // dropped without ever being spliced.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let user_init = InitMessage::User(UserInit {
        session_key: session_key.clone(),
        workflow_id: TEST_WORKFLOW.to_string(),
        operation: Operation::PortForward {
            protocol: PortForwardProtocol::Tcp,
            port: 0,
        },
    });
    let user_tunnel = dial_router(&addr, true, &user_init)
        .await
        .expect("user dial failed");
    let (mut user_send, _user_recv) = user_tunnel.into_split();
    user_send.write_all(b"ping").await.unwrap();

    let (_s1, mut r1) = t1.into_split();
    let (_s2, mut r2) = t2.into_split();

    let mut buf1 = [0u8; 16];
    let mut buf2 = [0u8; 16];
    let (res1, res2) = tokio::join!(
        tokio::time::timeout(Duration::from_secs(5), r1.read(&mut buf1)),
        tokio::time::timeout(Duration::from_secs(5), r2.read(&mut buf2)),
    );

    let won1 = matches!(res1, Ok(Ok(n)) if n > 0 && &buf1[..n] == b"ping");
    let won2 = matches!(res2, Ok(Ok(n)) if n > 0 && &buf2[..n] == b"ping");

    assert!(
        won1 ^ won2,
        "exactly one of the two colliding agents should have been paired with the user (won1={won1}, won2={won2})"
    );
}

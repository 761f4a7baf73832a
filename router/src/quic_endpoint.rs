//! New-transport rendezvous endpoint: a QUIC listener where the agent and
//! the user client each dial in, send an Init frame on a fresh
//! bidirectional stream, and get paired by session key (§4.2).

use std::time::Duration;
use tracing::{info, warn};
use tunnel_protocol::frame::{read_frame, DEFAULT_MAX_FRAME_BYTES};
use tunnel_protocol::message::InitMessage;
use tunnel_protocol::tunnel::Tunnel;

use crate::pairing::{pair_session, PairOutcome};
use crate::splice::splice;
use crate::state::{AppState, Role, SessionRecord};

/// Default time a half-pair waits for its peer before timing out.
pub const DEFAULT_PAIRING_DEADLINE: Duration = Duration::from_secs(30);

/// Runs the QUIC accept loop until the endpoint is closed.
pub async fn run(endpoint: quinn::Endpoint, state: AppState) {
    loop {
        let Some(incoming) = endpoint.accept().await else {
            info!("quic endpoint closed, stopping accept loop");
            return;
        };
        let state = state.clone();
        tokio::spawn(async move {
            match incoming.await {
                Ok(connection) => handle_connection(connection, state).await,
                Err(e) => warn!("quic handshake failed: {e}"),
            }
        });
    }
}

async fn handle_connection(connection: quinn::Connection, state: AppState) {
    loop {
        match connection.accept_bi().await {
            Ok((send, recv)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    handle_stream(send, recv, state).await;
                });
            }
            Err(e) => {
                info!("quic connection ended: {e}");
                return;
            }
        }
    }
}

async fn handle_stream(send: quinn::SendStream, mut recv: quinn::RecvStream, state: AppState) {
    let body = match read_frame(&mut recv, DEFAULT_MAX_FRAME_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            warn!("failed to read init frame: {e}");
            return;
        }
    };
    let init = match InitMessage::decode(&body) {
        Ok(init) => init,
        Err(e) => {
            warn!("malformed init frame: {e}");
            return;
        }
    };

    let (role, session_key, workflow_id) = match &init {
        InitMessage::Agent(a) => (Role::Agent, a.session_key.clone(), a.workflow_id.clone()),
        InitMessage::User(u) => (Role::User, u.session_key.clone(), u.workflow_id.clone()),
    };

    info!(session_key = %session_key, workflow_id = %workflow_id, ?role, "tunnel dialed in");
    state.active.insert(
        session_key.clone(),
        SessionRecord {
            session_key: session_key.clone(),
            workflow_id,
        },
    );

    let tunnel = Tunnel::new(recv, send);
    let outcome = pair_session(
        &state,
        session_key.clone(),
        role,
        tunnel,
        DEFAULT_PAIRING_DEADLINE,
    )
    .await;
    match outcome {
        Ok(PairOutcome::OwnsSplice { mine, peer }) => {
            splice(mine, peer).await;
        }
        Ok(PairOutcome::HandedOff) => {
            // The peer (already waiting) owns the splice.
        }
        Err(e) => {
            warn!(session_key = %session_key, "pairing failed: {e}");
        }
    }
    state.active.remove(&session_key);
}

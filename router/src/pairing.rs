//! Router pairing (§4.2): matches one agent tunnel with one user tunnel by
//! session key and splices them.
//!
//! State per session key is exactly `{half, tunnel, deadline}` as spec.md
//! describes. A [`Waiting`] half sits in `state.pending` holding a oneshot
//! sender; whichever connection arrives second looks the waiter up, hands
//! its own tunnel through the channel, and returns immediately — the first
//! (waiting) connection is the one that actually drives the splice. This
//! keeps exactly one task doing I/O per pairing instead of two racing.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tunnel_protocol::message::{SessionKey, COLLISION_RESET_CODE};
use tunnel_protocol::tunnel::Tunnel;

use crate::state::{AppState, Role, Waiting};

/// A tunnel over a single QUIC bidirectional stream, the router's sole
/// transport for new-transport rendezvous.
pub type QuicTunnel = Tunnel<quinn::RecvStream, quinn::SendStream>;

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("a {0:?} is already paired or waiting under this session key")]
    Collision(Role),
    #[error("no peer arrived within the pairing deadline")]
    Timeout,
    #[error("the peer connection was dropped before pairing completed")]
    PeerDropped,
}

/// Outcome of attempting to pair a session: either this call owns the
/// splice (it was the first arriver and a peer showed up — carries both
/// its own tunnel and the peer's), or the peer already owns it (this call
/// was the second arriver and handed off its tunnel to them).
pub enum PairOutcome {
    OwnsSplice { mine: QuicTunnel, peer: QuicTunnel },
    HandedOff,
}

/// Attempts to pair `tunnel` under `session_key` as the given `role`.
///
/// Implements the transition table in spec.md §4.2 with a single atomic
/// `DashMap::insert` to avoid a TOCTOU window between checking for an
/// existing waiter and inserting a new one.
pub async fn pair_session(
    state: &AppState,
    session_key: SessionKey,
    role: Role,
    tunnel: QuicTunnel,
    deadline: Duration,
) -> Result<PairOutcome, PairingError> {
    let (tx, rx) = oneshot::channel();
    let mine = Waiting { role, tx };

    match state.pending.insert(session_key.clone(), mine) {
        None => {
            // We're first. Wait for a peer or the deadline.
            match tokio::time::timeout(deadline, rx).await {
                Ok(Ok(peer_tunnel)) => {
                    info!(session_key = %session_key, "paired");
                    Ok(PairOutcome::OwnsSplice {
                        mine: tunnel,
                        peer: peer_tunnel,
                    })
                }
                Ok(Err(_)) => Err(PairingError::PeerDropped),
                Err(_) => {
                    state.pending.remove(&session_key);
                    warn!(session_key = %session_key, "pairing deadline elapsed");
                    Err(PairingError::Timeout)
                }
            }
        }
        Some(existing) if existing.role == role => {
            // Same role already present: this is the second agent (or
            // second user). Reject the new arrival, restore the original
            // waiter exactly as it was.
            state.pending.insert(session_key, existing);
            reset_with_collision_code(tunnel);
            Err(PairingError::Collision(role))
        }
        Some(existing) => {
            // Opposite role was waiting: we complete the pair. Remove our
            // own just-inserted entry (nothing will ever wait on it) and
            // hand our tunnel to the original waiter.
            state.pending.remove(&session_key);
            let _ = existing.tx.send(tunnel);
            Ok(PairOutcome::HandedOff)
        }
    }
}

/// Resets both directions of a rejected dial with [`COLLISION_RESET_CODE`]
/// instead of letting it drop with the transport's default reset code, so a
/// peer watching for the code can tell a deliberate rejection apart from an
/// ordinary dropped connection.
fn reset_with_collision_code(tunnel: QuicTunnel) {
    let (send, recv) = tunnel.into_split();
    let mut send = send.into_inner();
    let mut recv = recv.into_inner();
    let _ = send.reset(quinn::VarInt::from_u32(COLLISION_RESET_CODE));
    let _ = recv.stop(quinn::VarInt::from_u32(COLLISION_RESET_CODE));
}

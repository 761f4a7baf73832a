//! Bidirectional splice between two paired tunnels (§4.2 Splice semantics).
//!
//! When side A closes-send, the router closes-send on side B. When one
//! direction finishes first, the other gets a short drain grace to finish
//! on its own (the peer it just half-closed may still have a last write or
//! two in flight); if it hasn't wrapped up by then, the router aborts it
//! rather than leaving the splice open indefinitely. Ordering within each
//! direction is preserved because each direction is a single `pipe_to` loop
//! with no intermediate reordering buffer.

use std::time::Duration;
use tracing::debug;
use tunnel_protocol::tunnel::Tunnel;

/// Grace period given to the still-running direction once the other has
/// fully drained, before the splice is torn down regardless.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Splices `a` and `b` until both directions have completed, or the drain
/// grace elapses after the first one does.
pub async fn splice(
    a: Tunnel<quinn::RecvStream, quinn::SendStream>,
    b: Tunnel<quinn::RecvStream, quinn::SendStream>,
) {
    let (mut a_send, mut a_recv) = a.into_split();
    let (mut b_send, mut b_recv) = b.into_split();

    let mut a_to_b = tokio::spawn(async move {
        let _ = a_recv.pipe_to(&mut b_send).await;
        a_recv.mark_recv_closed();
        let _ = b_send.close_send().await;
        debug!("a->b direction drained, b closed-send");
    });

    let mut b_to_a = tokio::spawn(async move {
        let _ = b_recv.pipe_to(&mut a_send).await;
        b_recv.mark_recv_closed();
        let _ = a_send.close_send().await;
        debug!("b->a direction drained, a closed-send");
    });

    let straggler = tokio::select! {
        _ = &mut a_to_b => &mut b_to_a,
        _ = &mut b_to_a => &mut a_to_b,
    };

    if tokio::time::timeout(DRAIN_GRACE, &mut *straggler).await.is_err() {
        debug!("drain grace elapsed, aborting the remaining direction");
        straggler.abort();
    }
}

//! Shared router state.
//!
//! Two independent registries, one per rendezvous mechanism, plus a small
//! session list kept only for the REST status endpoint. Mirrors the
//! teacher's `AppState`: `Arc<DashMap<...>>` fields, cloned cheaply into
//! every connection task.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tunnel_protocol::message::SessionKey;

use crate::pairing::QuicTunnel;

/// Which side of a pairing a waiting half belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Agent,
    User,
}

/// A half of a session waiting at the rendezvous point for its peer.
pub struct Waiting {
    pub role: Role,
    /// Fires once the peer arrives, handing this waiter the peer's tunnel.
    pub tx: oneshot::Sender<QuicTunnel>,
}

/// Metadata recorded for the REST status endpoint. Not consulted by the
/// pairing logic itself.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_key: String,
    pub workflow_id: String,
}

/// Outbound sender for the legacy JSON control channel, one per workflow.
pub type LegacyControlTx = mpsc::UnboundedSender<tunnel_protocol::legacy::LegacyMessage>;

/// Shared application state, cloned into every connection-handling task.
#[derive(Clone)]
pub struct AppState {
    /// New-transport rendezvous: session key -> the half still waiting.
    pub pending: Arc<DashMap<SessionKey, Waiting>>,
    /// Sessions currently paired, kept only for `/api/sessions`.
    pub active: Arc<DashMap<SessionKey, SessionRecord>>,
    /// Legacy control channels, one per workflow that has an agent connected.
    pub legacy_controls: Arc<DashMap<String, LegacyControlTx>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            active: Arc::new(DashMap::new()),
            legacy_controls: Arc::new(DashMap::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

//! Init-frame message types.
//!
//! The first frame on every new-transport tunnel carries one of these,
//! bincode-encoded. `session_key` is how the router pairs an agent tunnel
//! with a user tunnel (§3); `workflow_id` scopes authorization and logging.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Application-level QUIC error code a router resets a stream with when it
/// rejects a dial outright instead of splicing it (currently only a
/// same-role pairing collision, §4.2/§8 scenario 6), rather than just
/// dropping the stream with the transport's default reset code. A QUIC
/// peer watching for this specific code on a stream reset/stop can tell a
/// deliberate rejection apart from an ordinary dropped connection. Shared
/// here so router and agent agree on the value even though `agent`'s
/// generic `Tunnel` does not yet decode it into a typed error itself.
pub const COLLISION_RESET_CODE: u32 = 1;

/// Opaque session-pairing key, unique within a workflow.
pub type SessionKey = String;

/// Opaque identifier for the owning workflow.
pub type WorkflowId = String;

/// Transport-layer protocol a `PortForward` operation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortForwardProtocol {
    Tcp,
    Udp,
}

/// Direction of an rsync transfer, carried through to authorization for
/// logging/policy but otherwise opaque to the router and the forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsyncDirection {
    Push,
    Pull,
}

/// What the user side intends to do with a paired tunnel. Opaque to router
/// pairing; logged and optionally exposed to the authorization collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    PortForward {
        protocol: PortForwardProtocol,
        port: u16,
    },
    Exec {
        cols: u16,
        rows: u16,
    },
    Rsync {
        direction: RsyncDirection,
    },
}

/// First frame sent by the agent on a newly dialed tunnel.
///
/// `metadata` carries out-of-band attachments that have no dedicated wire
/// field of their own — currently just the bearer token, keyed by
/// `ForwarderConfig::token_header_name` (§6.1), standing in for the
/// transport-metadata header a plain HTTP/WS dial would use. The router
/// never interprets these entries itself; it hands them to the
/// authorization collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentInit {
    pub session_key: SessionKey,
    pub workflow_id: WorkflowId,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// First frame sent by the user client on a newly dialed tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInit {
    pub session_key: SessionKey,
    pub workflow_id: WorkflowId,
    pub operation: Operation,
}

/// The tagged union actually placed in frame 1. Which side sent it tells
/// the router which half of the pairing map to populate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitMessage {
    Agent(AgentInit),
    User(UserInit),
}

impl InitMessage {
    pub fn session_key(&self) -> &str {
        match self {
            InitMessage::Agent(a) => &a.session_key,
            InitMessage::User(u) => &u.session_key,
        }
    }

    pub fn workflow_id(&self) -> &str {
        match self {
            InitMessage::Agent(a) => &a.workflow_id,
            InitMessage::User(u) => &u.workflow_id,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_message_round_trips_through_bincode() {
        let msg = InitMessage::User(UserInit {
            session_key: "sess-1".into(),
            workflow_id: "wf-1".into(),
            operation: Operation::PortForward {
                protocol: PortForwardProtocol::Tcp,
                port: 8080,
            },
        });
        let bytes = msg.encode().unwrap();
        let decoded = InitMessage::decode(&bytes).unwrap();
        assert_eq!(msg, decoded);
        assert_eq!(decoded.session_key(), "sess-1");
    }
}

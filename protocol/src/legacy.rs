//! Legacy control-channel wire format (§6.3, §4.7).
//!
//! JSON text messages on the agent's single control WebSocket. Kept as a
//! distinct protocol from the new-transport `InitMessage`/frame codec per
//! the teacher's design note: the two forwarders live side-by-side rather
//! than being unified.

use serde::{Deserialize, Serialize};

/// The two operations the legacy protocol notifies the agent about.
///
/// Tag values spelled out explicitly (`PortForwardTCP`/`PortForwardWS`)
/// since spec.md §6.3 names these exact strings on the wire; a blanket
/// `rename_all = "PascalCase"` would instead produce `PortForwardTcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegacyOperation {
    #[serde(rename = "PortForwardTCP")]
    PortForwardTcp,
    #[serde(rename = "PortForwardWS")]
    PortForwardWs,
}

/// A single control-channel notification.
///
/// Sent router-to-agent when a user connection arrives for a sub-key; the
/// agent responds by opening a fresh data tunnel for that `key` (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyMessage {
    #[serde(rename = "type")]
    pub msg_type: LegacyOperation,
    pub key: String,
    pub cookie: Option<String>,
    pub payload: Option<String>,
}

impl LegacyMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_a_type_tag_field() {
        let msg = LegacyMessage {
            msg_type: LegacyOperation::PortForwardTcp,
            key: "sub-1".into(),
            cookie: Some("ck".into()),
            payload: None,
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"PortForwardTCP\""));
        let back = LegacyMessage::from_json(&json).unwrap();
        assert_eq!(back.key, "sub-1");
    }
}

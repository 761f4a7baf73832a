//! Builds the `AgentInit` sent as frame 1 on every newly dialed tunnel.

use std::collections::BTreeMap;
use tunnel_protocol::message::AgentInit;

use crate::config::ForwarderConfig;

/// Attaches the current bearer token under `config.token_header_name`,
/// standing in for the transport-metadata header a plain HTTP/WS dial
/// would carry it in (§6.1, §4.3 step 2).
pub(crate) fn agent_init(config: &ForwarderConfig, session_key: String, token: &str) -> AgentInit {
    let mut metadata = BTreeMap::new();
    metadata.insert(config.token_header_name.clone(), token.to_string());
    AgentInit {
        session_key,
        workflow_id: config.workflow_id.clone(),
        metadata,
    }
}

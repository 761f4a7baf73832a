//! Legacy control channel (§4.7): a persistent WebSocket per workflow that
//! the agent connects to, over which the router pushes JSON notifications
//! of newly arrived user connections. The actual data plane for each
//! notified sub-key still goes through the new-transport QUIC rendezvous
//! (§4.2) — only the "a user connection showed up" signal is legacy.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Json;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tunnel_protocol::legacy::LegacyMessage;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ControlQuery {
    workflow_id: String,
}

/// `GET /legacy/control?workflow_id=...` — upgrades to the agent's
/// persistent control WebSocket.
pub async fn control_ws(
    ws: WebSocketUpgrade,
    Query(query): Query<ControlQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_control_connection(socket, query.workflow_id, state))
}

async fn handle_control_connection(socket: WebSocket, workflow_id: String, state: AppState) {
    info!(%workflow_id, "legacy control channel connected");
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<LegacyMessage>();
    state.legacy_controls.insert(workflow_id.clone(), tx);

    let outbound = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    warn!("failed to serialize legacy notification: {e}");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames from the agent on this channel are control-plane
    // noise only (e.g. pings); the agent never sends data here.
    while let Some(Ok(msg)) = stream.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    outbound.abort();
    state.legacy_controls.remove(&workflow_id);
    info!(%workflow_id, "legacy control channel disconnected");
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub workflow_id: String,
    pub message: LegacyMessage,
}

/// `POST /api/legacy/notify` — pushes a notification to the agent
/// currently holding the control channel for `workflow_id`, if any.
/// Called by the authorization/command-runner collaborator (out of scope
/// for this crate) when a new user connection arrives for a legacy-mode
/// session.
pub async fn notify(
    State(state): State<AppState>,
    Json(req): Json<NotifyRequest>,
) -> impl IntoResponse {
    match state.legacy_controls.get(&req.workflow_id) {
        Some(tx) => {
            let delivered = tx.send(req.message).is_ok();
            Json(serde_json::json!({ "delivered": delivered }))
        }
        None => Json(serde_json::json!({ "delivered": false, "reason": "no agent connected" })),
    }
}

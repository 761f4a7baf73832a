//! REST status endpoint, carried over from the teacher's `/api/agents`.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct SessionListItem {
    pub session_key: String,
    pub workflow_id: String,
}

/// `GET /api/sessions` — lists currently paired (or pairing) sessions.
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionListItem>> {
    let sessions = state
        .active
        .iter()
        .map(|entry| SessionListItem {
            session_key: entry.session_key.clone(),
            workflow_id: entry.workflow_id.clone(),
        })
        .collect();
    Json(sessions)
}

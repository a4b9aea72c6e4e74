//! HTTP API endpoints for inspecting and ending sessions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::protocol::ServerMessage;
use crate::registry::SessionInfo;

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub sessions: usize,
    pub server_now: String,
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        sessions: state.registry.list().await.len(),
        server_now: chrono::Utc::now().to_rfc3339(),
    })
}

/// GET /api/sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionInfo>> {
    Json(state.registry.list().await)
}

/// Snapshot of one session.
///
/// GET /api/sessions/{key}
///
/// Roles of living participants stay hidden until the session has ended.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    match state.registry.snapshot(&key).await {
        Ok(snapshot) => Json(snapshot.redacted()).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(ServerMessage::from(e))).into_response(),
    }
}

/// Force-end a session.
///
/// DELETE /api/sessions/{key}
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    match state.registry.force_end(&key).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::warn!(session = %key, "Force end failed: {}", e);
            (StatusCode::NOT_FOUND, Json(ServerMessage::from(e))).into_response()
        }
    }
}

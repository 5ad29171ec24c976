// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the REST surface: session CRUD, task
//! projections, incremental log tails, cancellation, and worker proxies.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use conveyor_core::{ConveyorError, TaskLogEntry};
use conveyor_dispatch::CancelOutcome;

use crate::server::AppState;

/// Hard cap on a single log page.
const LOG_LIMIT_MAX: i64 = 500;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn internal_error(e: ConveyorError) -> Response {
    warn!(error = %e, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// --- Health ---

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /api/health
pub async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// --- Sessions ---

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatchSessionRequest {
    pub title: String,
}

/// GET /api/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Response {
    match state.store.list_sessions().await {
        Ok(sessions) => Json(serde_json::json!({ "sessions": sessions })).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Response {
    let id = body
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let channel_type = body.channel_type.unwrap_or_else(|| "duplex".to_string());
    match state.store.create_session(&id, &channel_type).await {
        Ok(session) => Json(session).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/sessions/{id}
pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get_session(&id).await {
        Ok(Some(session)) => Json(session).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "session not found"),
        Err(e) => internal_error(e),
    }
}

/// PATCH /api/sessions/{id}
pub async fn patch_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PatchSessionRequest>,
) -> Response {
    match state.store.get_session(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "session not found"),
        Err(e) => return internal_error(e),
    }
    match state.store.update_session_title(&id, &body.title).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/sessions/{id} — cascades to tasks and logs.
pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.delete_session(&id).await {
        Ok(true) => {
            // The session's worker has nothing left to serve.
            if let Err(e) = state.driver.release(&id).await {
                warn!(session_id = %id, error = %e, "worker release failed");
            }
            Json(serde_json::json!({ "success": true })).into_response()
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, "session not found"),
        Err(e) => internal_error(e),
    }
}

/// GET /api/sessions/{id}/messages — proxied from the session's worker.
pub async fn session_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_session(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "session not found"),
        Err(e) => return internal_error(e),
    }
    let endpoint = match state.driver.acquire(&id).await {
        Ok(endpoint) => endpoint,
        Err(e) => return error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    };
    match state.worker.session_messages(&endpoint, &id).await {
        Ok(messages) => Json(serde_json::json!({ "messages": messages })).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

// --- Tasks ---

/// GET /api/tasks/{id}
pub async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get_task(&id).await {
        Ok(Some(task)) => Json(task).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "task not found"),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub after: i64,
    #[serde(default = "default_log_limit")]
    pub limit: i64,
}

fn default_log_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<TaskLogEntry>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// GET /api/tasks/{id}/logs?after=&limit= — incremental tail.
///
/// `after` is the last seen seq (exclusive); 0 or absent reads from the
/// start. `limit` is capped at 500.
pub async fn get_task_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Response {
    match state.store.get_task(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "task not found"),
        Err(e) => return internal_error(e),
    }

    let after = if query.after <= 0 { -1 } else { query.after };
    let limit = query.limit.clamp(1, LOG_LIMIT_MAX);

    let logs = match state.store.read_logs(&id, after, limit).await {
        Ok(logs) => logs,
        Err(e) => return internal_error(e),
    };
    let total = match state.store.count_logs(&id).await {
        Ok(total) => total,
        Err(e) => return internal_error(e),
    };

    // seq is dense and 0-based, so the max seq is total - 1.
    let has_more = logs
        .last()
        .map(|entry| entry.seq + 1 < total)
        .unwrap_or(false);

    Json(LogsResponse { logs, has_more }).into_response()
}

/// POST /api/tasks/{id}/cancel
pub async fn cancel_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.dispatcher.cancel_task(&id).await {
        Ok(CancelOutcome::Canceled) => {
            Json(serde_json::json!({ "success": true })).into_response()
        }
        Ok(CancelOutcome::Conflict) => {
            error_response(StatusCode::CONFLICT, "task is not cancelable")
        }
        Ok(CancelOutcome::NotFound) => error_response(StatusCode::NOT_FOUND, "task not found"),
        Err(e) => internal_error(e),
    }
}

// --- Workspace proxy ---

#[derive(Debug, Deserialize)]
pub struct WorkspaceQuery {
    #[serde(default = "default_workspace_session")]
    pub session_id: String,
}

fn default_workspace_session() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PutWorkspaceRequest {
    pub content: String,
}

/// GET /api/workspace/{file}?session_id=
pub async fn get_workspace_file(
    State(state): State<AppState>,
    Path(file): Path<String>,
    Query(query): Query<WorkspaceQuery>,
) -> Response {
    let endpoint = match state.driver.acquire(&query.session_id).await {
        Ok(endpoint) => endpoint,
        Err(e) => return error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    };
    match state.worker.workspace_get(&endpoint, &file).await {
        Ok((file, content)) => {
            Json(serde_json::json!({ "file": file, "content": content })).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

/// PUT /api/workspace/{file}?session_id=
pub async fn put_workspace_file(
    State(state): State<AppState>,
    Path(file): Path<String>,
    Query(query): Query<WorkspaceQuery>,
    Json(body): Json<PutWorkspaceRequest>,
) -> Response {
    let endpoint = match state.driver.acquire(&query.session_id).await {
        Ok(endpoint) => endpoint,
        Err(e) => return error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    };
    match state.worker.workspace_put(&endpoint, &file, &body.content).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingress: `POST /api/channel/{type}/webhook`.
//!
//! Looks up the channel, verifies the signature, translates the payload,
//! materializes a pending task, and dispatches it asynchronously. The 202
//! response carries the task id for polling; errors inside the spawned
//! dispatch never affect the already-sent response.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use conveyor_core::{ConveyorError, InboundRequest, Task};

use crate::handlers::ErrorResponse;
use crate::server::AppState;

/// POST /api/channel/{channel_type}/webhook
pub async fn webhook(
    State(state): State<AppState>,
    Path(channel_type): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(channel) = state.registry.get(&channel_type) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown channel type: {channel_type}"),
            }),
        )
            .into_response();
    };

    let request = InboundRequest {
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect(),
        body: body.to_vec(),
    };

    if !channel.verify(&request) {
        warn!(channel_type, "webhook verification failed");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let mut task_request = match channel.translate(&request) {
        Ok(Some(task_request)) => task_request,
        Ok(None) => {
            return Json(serde_json::json!({ "ok": true, "skipped": true })).into_response();
        }
        Err(ConveyorError::BadRequest(message)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse { error: message }),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    // Channel defaults merge once, defaults first, frozen on the record.
    channel.defaults().apply(&mut task_request);

    let session_id = task_request
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let task_id = uuid::Uuid::new_v4().to_string();

    let created = async {
        state.store.create_session(&session_id, &channel_type).await?;
        let now = chrono::Utc::now().to_rfc3339();
        let task = Task::pending(&task_id, &session_id, &channel_type, task_request, &now);
        state.store.create_task(&task).await
    }
    .await;
    if let Err(e) = created {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response();
    }

    info!(channel_type, task_id, session_id, "webhook task accepted");

    // Dispatch asynchronously; the 202 does not wait on execution.
    let dispatcher = state.dispatcher.clone();
    let store = state.store.clone();
    let spawn_task_id = task_id.clone();
    tokio::spawn(async move {
        dispatcher.run_task(&spawn_task_id, channel, None).await;
        if let Err(e) = store.touch_session(&session_id).await {
            warn!(session_id, error = %e, "session touch failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "taskId": task_id })),
    )
        .into_response()
}

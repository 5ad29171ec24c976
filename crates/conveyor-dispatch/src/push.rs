// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound push notifications carrying a task's terminal projection.

use std::time::Duration;

use conveyor_core::{ConveyorError, PushConfig, Task};
use serde::Serialize;
use tracing::debug;

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushPayload<'a> {
    task_id: &'a str,
    session_id: &'a str,
    status: String,
    result: Option<&'a str>,
    error: Option<&'a str>,
}

/// True when the push descriptor's event filter admits this status.
pub fn push_wanted(push: &PushConfig, task: &Task) -> bool {
    if !task.status.is_terminal() {
        return false;
    }
    push.events.is_empty() || push.events.iter().any(|e| e == &task.status.to_string())
}

/// POST the task's terminal projection to the configured callback.
///
/// At-most-once: no retries. The caller logs failures and moves on.
pub async fn send_push(
    client: &reqwest::Client,
    push: &PushConfig,
    task: &Task,
) -> Result<(), ConveyorError> {
    let payload = PushPayload {
        task_id: &task.id,
        session_id: &task.session_id,
        status: task.status.to_string(),
        result: task.result.as_deref(),
        error: task.error.as_deref(),
    };

    let mut request = client
        .post(&push.url)
        .timeout(PUSH_TIMEOUT)
        .json(&payload);
    if let Some(auth) = &push.auth_header {
        request = request.header("authorization", auth);
    }

    let response = request.send().await.map_err(|e| ConveyorError::Push {
        message: format!("push request failed: {e}"),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ConveyorError::Push {
            message: format!("push endpoint returned {status}"),
        });
    }
    debug!(task_id = %task.id, url = %push.url, "push notification delivered");
    Ok(())
}

// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the worker API.
//!
//! A thin client over a driver-leased endpoint exposing the worker contract:
//! `POST /prepare`, `POST /chat` (SSE), `POST /cancel`, `GET /health`, plus
//! session-history and workspace-file proxies.

use std::collections::BTreeMap;
use std::time::Duration;

use conveyor_core::{BridgeConfig, ConveyorError, Endpoint};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::sse::{self, EventStream};

const PREPARE_TIMEOUT: Duration = Duration::from_secs(30);
const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);
const PROXY_TIMEOUT: Duration = Duration::from_secs(10);

/// A materialized skill bundle written into the worker workspace at prepare time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillBundle {
    /// Skill name; becomes the bundle directory name in the workspace.
    pub name: String,
    /// Filename to file content.
    pub files: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct PrepareRequest<'a> {
    task_id: &'a str,
    skills: &'a [SkillBundle],
    bridge_servers: BTreeMap<&'a str, &'a serde_json::Value>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    session_id: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct CancelRequest<'a> {
    session_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct WorkspaceFileResponse {
    #[serde(default)]
    file: String,
    #[serde(default)]
    content: String,
}

/// HTTP client for worker communication.
///
/// Holds a connection pool shared across all workers; per-call timeouts are
/// bounded except for `/chat`, which stays open for the life of the stream.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    client: reqwest::Client,
}

impl Default for WorkerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerClient {
    pub fn new() -> Self {
        // No client-wide timeout: /chat streams for the task's whole life.
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Write skills and tool-bridge configs into the worker workspace.
    ///
    /// Failure is fatal to the task: the worker's error body is surfaced as
    /// [`ConveyorError::PrepareFailed`].
    pub async fn prepare(
        &self,
        endpoint: &Endpoint,
        task_id: &str,
        skills: &[SkillBundle],
        bridge_configs: &[BridgeConfig],
    ) -> Result<(), ConveyorError> {
        let bridge_servers: BTreeMap<&str, &serde_json::Value> = bridge_configs
            .iter()
            .map(|b| (b.name.as_str(), &b.config))
            .collect();
        let body = PrepareRequest {
            task_id,
            skills,
            bridge_servers,
        };

        let response = self
            .client
            .post(format!("{}/prepare", endpoint.url))
            .timeout(PREPARE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConveyorError::PrepareFailed {
                message: format!("prepare request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConveyorError::PrepareFailed {
                message: format!("worker returned {status}: {body}"),
            });
        }
        debug!(task_id, skills = skills.len(), "worker prepared");
        Ok(())
    }

    /// Start a chat turn and return the worker's framed event stream.
    pub async fn chat(
        &self,
        endpoint: &Endpoint,
        session_id: &str,
        message: &str,
    ) -> Result<EventStream, ConveyorError> {
        let body = ChatRequest {
            session_id,
            message,
        };
        let response = self
            .client
            .post(format!("{}/chat", endpoint.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ConveyorError::Stream {
                message: format!("chat request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConveyorError::Stream {
                message: format!("worker returned {status}: {body}"),
                source: None,
            });
        }
        Ok(sse::parse_event_stream(response))
    }

    /// Best-effort interrupt of the session's running task.
    ///
    /// Failures are logged and swallowed; the control plane marks the task
    /// canceled regardless.
    pub async fn cancel(&self, endpoint: &Endpoint, session_id: &str) {
        let body = CancelRequest { session_id };
        let result = self
            .client
            .post(format!("{}/cancel", endpoint.url))
            .timeout(CANCEL_TIMEOUT)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(session_id, "worker cancel delivered");
            }
            Ok(response) => {
                warn!(session_id, status = %response.status(), "worker cancel rejected");
            }
            Err(e) => {
                warn!(session_id, error = %e, "worker cancel failed");
            }
        }
    }

    /// Probe the worker's `GET /health` with a 3-second timeout.
    pub async fn health(&self, endpoint: &Endpoint) -> bool {
        match self
            .client
            .get(format!("{}/health", endpoint.url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Proxy-read the session's message history from the worker.
    ///
    /// An unknown session is an empty history, not an error.
    pub async fn session_messages(
        &self,
        endpoint: &Endpoint,
        session_id: &str,
    ) -> Result<Vec<serde_json::Value>, ConveyorError> {
        let response = self
            .client
            .get(format!("{}/sessions/{session_id}", endpoint.url))
            .timeout(PROXY_TIMEOUT)
            .send()
            .await
            .map_err(worker_unavailable)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body: serde_json::Value = response.json().await.map_err(worker_unavailable)?;
        Ok(body
            .get("messages")
            .and_then(|m| m.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// Proxy-read a workspace file. Missing files read as empty content.
    pub async fn workspace_get(
        &self,
        endpoint: &Endpoint,
        file: &str,
    ) -> Result<(String, String), ConveyorError> {
        let response = self
            .client
            .get(format!("{}/workspace/{file}", endpoint.url))
            .timeout(PROXY_TIMEOUT)
            .send()
            .await
            .map_err(worker_unavailable)?;

        let body: WorkspaceFileResponse =
            response.json().await.map_err(worker_unavailable)?;
        Ok((body.file, body.content))
    }

    /// Proxy-write a workspace file.
    pub async fn workspace_put(
        &self,
        endpoint: &Endpoint,
        file: &str,
        content: &str,
    ) -> Result<(), ConveyorError> {
        let response = self
            .client
            .put(format!("{}/workspace/{file}", endpoint.url))
            .timeout(PROXY_TIMEOUT)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .map_err(worker_unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConveyorError::WorkerUnavailable {
                message: format!("workspace write returned {status}"),
                source: None,
            });
        }
        Ok(())
    }
}

fn worker_unavailable(e: reqwest::Error) -> ConveyorError {
    ConveyorError::WorkerUnavailable {
        message: format!("worker request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

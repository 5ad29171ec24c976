// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the Conveyor workspace.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ConveyorError;

/// Lifecycle status of a task.
///
/// Created as `Pending`, moved to `Running` on dispatch, and finished in one
/// of the three terminal states. `InputRequired` is a non-terminal pause
/// state; it is part of the cancelable set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    InputRequired,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    /// Terminal states never transition again and freeze the task record.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// States from which an explicit cancel is accepted.
    pub fn is_cancelable(&self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::InputRequired)
    }
}

/// An execution environment shared by a series of tasks.
///
/// Maps to exactly one worker instance at the driver level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Stable session identifier (opaque string, supplied or generated).
    pub id: String,
    /// Channel type the session originates from (e.g. "duplex", "forge").
    pub channel_type: String,
    /// Human-readable title, updated lazily by the title generator.
    pub title: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-active timestamp, bumped on task completion.
    pub last_active_at: String,
}

/// A declarative tool-bridge descriptor injected into the worker at prepare time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge name, unique within a task.
    pub name: String,
    /// Opaque bridge configuration forwarded verbatim to the worker.
    pub config: serde_json::Value,
}

/// Outbound push-notification descriptor, configured per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushConfig {
    /// Callback URL receiving the task's terminal projection.
    pub url: String,
    /// Optional value for the `Authorization` header.
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Event filter; empty means all terminal events.
    #[serde(default)]
    pub events: Vec<String>,
}

/// One request-response execution: the unit of scheduling, observability,
/// and cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Channel type that produced the task.
    pub channel_type: String,
    /// Opaque channel metadata, passed through to delivery.
    pub channel_meta: serde_json::Value,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// User message (input).
    pub message: String,
    /// Requested skill names, channel defaults first.
    pub skills: Vec<String>,
    /// Requested tool-bridge configs, channel defaults first.
    pub bridge_configs: Vec<BridgeConfig>,
    /// Optional push-notification descriptor.
    pub push: Option<PushConfig>,
    /// Final result text (accumulated stream text or worker-reported result).
    pub result: Option<String>,
    /// Optional structured output reported by the worker.
    pub structured_output: Option<serde_json::Value>,
    /// Error text for failed tasks.
    pub error: Option<String>,
    /// Execution cost in USD, reported by the worker's terminal event.
    pub cost_usd: Option<f64>,
    /// Number of agent turns.
    pub turns: Option<i64>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: Option<i64>,
    /// Identifier of the worker container the task ran on.
    pub worker_id: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Set once, when the task first leaves `pending`.
    pub started_at: Option<String>,
    /// Set exactly on the terminal transition.
    pub finished_at: Option<String>,
}

impl Task {
    /// Materialize a pending task record from a translated request.
    ///
    /// Channel defaults must already be merged into the request; the lists
    /// are frozen on the record from here on.
    pub fn pending(
        id: &str,
        session_id: &str,
        channel_type: &str,
        request: TaskRequest,
        now: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            session_id: session_id.to_string(),
            channel_type: channel_type.to_string(),
            channel_meta: request.channel_meta,
            status: TaskStatus::Pending,
            message: request.message,
            skills: request.skills,
            bridge_configs: request.bridge_configs,
            push: request.push,
            result: None,
            structured_output: None,
            error: None,
            cost_usd: None,
            turns: None,
            duration_ms: None,
            worker_id: None,
            created_at: now.to_string(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// A single streamed event persisted for a task.
///
/// `(task_id, seq)` is the primary key; `seq` is dense and strictly
/// increasing per task, starting at 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogEntry {
    pub task_id: String,
    pub seq: i64,
    /// Event type tag (text, tool_call, tool_result, error, done, or unknown).
    pub event_type: String,
    pub content: String,
    /// Optional JSON metadata blob.
    pub metadata: Option<String>,
    /// ISO 8601 insertion timestamp.
    pub created_at: String,
}

/// Partial update applied to a task record.
///
/// Only `Some` fields are written; the store ignores updates to non-log
/// fields once the task is terminal.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub result: Option<Option<String>>,
    pub structured_output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub cost_usd: Option<f64>,
    pub turns: Option<i64>,
    pub duration_ms: Option<i64>,
    pub worker_id: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

/// Unified task request produced by a channel's `translate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Target session; `None` lets the ingress mint one.
    #[serde(default)]
    pub session_id: Option<String>,
    /// User message.
    pub message: String,
    /// Requested skill names (channel defaults are merged in front).
    #[serde(default)]
    pub skills: Vec<String>,
    /// Requested tool-bridge configs (channel defaults are merged in front).
    #[serde(default)]
    pub bridge_configs: Vec<BridgeConfig>,
    /// Channel-specific metadata carried through to delivery.
    #[serde(default)]
    pub channel_meta: serde_json::Value,
    /// Optional push-notification descriptor.
    #[serde(default)]
    pub push: Option<PushConfig>,
}

/// Default capabilities a channel declares for every task it produces.
#[derive(Debug, Clone, Default)]
pub struct ChannelDefaults {
    pub skills: Vec<String>,
    pub bridge_configs: Vec<BridgeConfig>,
}

impl ChannelDefaults {
    /// Merge defaults into a request as `defaults ++ request`, preserving
    /// order. Applied once at task creation and frozen on the task record.
    pub fn apply(&self, request: &mut TaskRequest) {
        let mut skills = self.skills.clone();
        skills.append(&mut request.skills);
        request.skills = skills;

        let mut bridges = self.bridge_configs.clone();
        bridges.append(&mut request.bridge_configs);
        request.bridge_configs = bridges;
    }
}

/// A raw inbound request as seen by channel `verify`/`translate`.
///
/// Webhook ingress fills `headers` from the HTTP request; duplex ingress
/// passes the JSON frame as the body with empty headers.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Lowercased header names to values.
    pub headers: HashMap<String, String>,
    /// Raw request body.
    pub body: Vec<u8>,
}

impl InboundRequest {
    pub fn from_json(value: &serde_json::Value) -> Self {
        Self {
            headers: HashMap::new(),
            body: value.to_string().into_bytes(),
        }
    }

    /// Header lookup by lowercased name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, ConveyorError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ConveyorError::BadRequest(format!("invalid JSON body: {e}")))
    }
}

/// A framed event received from the worker's `/chat` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEvent {
    /// Event type tag. Unknown tags are persisted and forwarded verbatim.
    pub event_type: String,
    /// Event content text.
    pub content: String,
    /// Optional metadata object.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl WorkerEvent {
    pub fn new(event_type: &str, content: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            content: content.to_string(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }
}

/// Worker event type constants.
pub mod event_types {
    pub const TEXT: &str = "text";
    pub const TOOL_CALL: &str = "tool_call";
    pub const TOOL_RESULT: &str = "tool_result";
    pub const ERROR: &str = "error";
    pub const DONE: &str = "done";
}

/// A worker endpoint leased from the driver for the duration of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Base URL of the worker HTTP API (e.g. `http://10.0.3.7:8080`).
    pub url: String,
    /// Container or pod identifier, recorded on the task as `worker_id`.
    pub container_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn task_status_round_trips_through_strings() {
        let variants = [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::InputRequired,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Canceled,
        ];
        for variant in &variants {
            let s = variant.to_string();
            let parsed = TaskStatus::from_str(&s).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
        assert_eq!(TaskStatus::InputRequired.to_string(), "input_required");
    }

    #[test]
    fn terminal_and_cancelable_partition() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());

        assert!(TaskStatus::Pending.is_cancelable());
        assert!(TaskStatus::Running.is_cancelable());
        assert!(TaskStatus::InputRequired.is_cancelable());
        assert!(!TaskStatus::Completed.is_cancelable());
    }

    #[test]
    fn defaults_merge_is_order_preserving() {
        let defaults = ChannelDefaults {
            skills: vec!["code-review".into(), "sql-expert".into()],
            bridge_configs: vec![BridgeConfig {
                name: "search".into(),
                config: serde_json::json!({"provider": "brave"}),
            }],
        };
        let mut request = TaskRequest {
            message: "hi".into(),
            skills: vec!["docker-expert".into()],
            ..TaskRequest::default()
        };

        defaults.apply(&mut request);

        assert_eq!(
            request.skills,
            vec!["code-review", "sql-expert", "docker-expert"]
        );
        assert_eq!(request.bridge_configs.len(), 1);
        assert_eq!(request.bridge_configs[0].name, "search");
    }

    #[test]
    fn defaults_merge_idempotent_against_empty_request() {
        let defaults = ChannelDefaults {
            skills: vec!["code-review".into()],
            bridge_configs: vec![],
        };
        let mut request = TaskRequest {
            message: "hi".into(),
            ..TaskRequest::default()
        };

        defaults.apply(&mut request);
        assert_eq!(request.skills, vec!["code-review"]);
    }

    #[test]
    fn inbound_request_json_parses_body() {
        let req = InboundRequest::from_json(&serde_json::json!({"message": "hello"}));
        let value = req.json().unwrap();
        assert_eq!(value["message"], "hello");
    }

    #[test]
    fn inbound_request_rejects_invalid_json() {
        let req = InboundRequest {
            headers: HashMap::new(),
            body: b"not json".to_vec(),
        };
        assert!(req.json().is_err());
    }

    #[test]
    fn task_request_deserializes_minimal() {
        let json = r#"{"message": "hello"}"#;
        let req: TaskRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.message, "hello");
        assert!(req.session_id.is_none());
        assert!(req.skills.is_empty());
        assert!(req.push.is_none());
    }
}

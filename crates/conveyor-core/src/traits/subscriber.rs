// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live subscriber: a weak, write-only sink for streamed task output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A structured frame forwarded to a live subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Frame type (see [`frame_types`]).
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl OutboundFrame {
    pub fn new(frame_type: &str) -> Self {
        Self {
            frame_type: frame_type.to_string(),
            content: None,
            session_id: None,
            metadata: None,
        }
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn with_session_id(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Outbound frame type constants for subscriber messages.
pub mod frame_types {
    pub const TEXT: &str = "text";
    pub const TOOL_CALL: &str = "tool_call";
    pub const TOOL_RESULT: &str = "tool_result";
    pub const ERROR: &str = "error";
    pub const DONE: &str = "done";
    pub const PONG: &str = "pong";
    pub const SESSION_CREATED: &str = "session_created";
    pub const SESSION_TITLE: &str = "session_title";
}

/// Marker error: the subscriber's connection is gone.
///
/// The dispatcher treats this as "drop further sends"; persistence is never
/// gated on subscriber liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberClosed;

impl std::fmt::Display for SubscriberClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscriber connection closed")
    }
}

impl std::error::Error for SubscriberClosed {}

/// A live duplex peer receiving streamed task output.
///
/// The peer may disappear at any time; `send` reports that via
/// [`SubscriberClosed`] and the caller stops sending.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn send(&self, frame: OutboundFrame) -> Result<(), SubscriberClosed>;
}

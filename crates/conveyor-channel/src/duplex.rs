// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interactive duplex channel.
//!
//! Backs the WebSocket ingress: inbound chat frames become task requests.
//! Verification is satisfied by connection acceptance, and results stream
//! back over the live connection, so there is no `deliver` override.

use async_trait::async_trait;
use conveyor_core::{BridgeConfig, Channel, ConveyorError, InboundRequest, TaskRequest};
use serde::Deserialize;

/// Inbound duplex frame, as sent by the browser peer.
#[derive(Debug, Deserialize)]
pub struct ChatFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub bridge_configs: Vec<BridgeConfig>,
}

#[derive(Default)]
pub struct DuplexChannel;

impl DuplexChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Channel for DuplexChannel {
    fn channel_type(&self) -> &str {
        "duplex"
    }

    fn verify(&self, _request: &InboundRequest) -> bool {
        // The accepted WebSocket connection is the auth boundary.
        true
    }

    fn translate(&self, request: &InboundRequest) -> Result<Option<TaskRequest>, ConveyorError> {
        let frame: ChatFrame = serde_json::from_slice(&request.body)
            .map_err(|e| ConveyorError::BadRequest(format!("invalid chat frame: {e}")))?;

        if frame.frame_type != "chat" {
            return Ok(None);
        }
        let message = frame
            .message
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ConveyorError::BadRequest("chat frame missing message".into()))?;

        Ok(Some(TaskRequest {
            session_id: frame.session_id,
            message,
            skills: frame.skills,
            bridge_configs: frame.bridge_configs,
            channel_meta: serde_json::json!({}),
            push: None,
        }))
    }
}

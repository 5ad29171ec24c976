// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capturing test doubles: a subscriber that records forwarded frames and a
//! channel that records delivered tasks.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use conveyor_core::{
    Channel, ChannelDefaults, ConveyorError, InboundRequest, OutboundFrame, Subscriber,
    SubscriberClosed, Task, TaskRequest,
};

/// Subscriber that records every frame; can simulate a dropped connection.
#[derive(Default)]
pub struct CaptureSubscriber {
    frames: Mutex<Vec<OutboundFrame>>,
    closed: AtomicBool,
}

impl CaptureSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the peer disconnecting: all further sends fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn frames(&self) -> Vec<OutboundFrame> {
        self.frames.lock().await.clone()
    }

    pub async fn frame_types(&self) -> Vec<String> {
        self.frames
            .lock()
            .await
            .iter()
            .map(|f| f.frame_type.clone())
            .collect()
    }
}

#[async_trait]
impl Subscriber for CaptureSubscriber {
    async fn send(&self, frame: OutboundFrame) -> Result<(), SubscriberClosed> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SubscriberClosed);
        }
        self.frames.lock().await.push(frame);
        Ok(())
    }
}

/// Test channel: translates JSON bodies as [`TaskRequest`]s directly,
/// verifies via a shared-secret header, and records delivered tasks.
pub struct CaptureChannel {
    channel_type: String,
    defaults: ChannelDefaults,
    secret: Option<String>,
    delivered: Mutex<Vec<Task>>,
}

impl CaptureChannel {
    pub fn new(channel_type: &str) -> Self {
        Self {
            channel_type: channel_type.to_string(),
            defaults: ChannelDefaults::default(),
            secret: None,
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Require `x-test-signature: <secret>` on inbound requests.
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = Some(secret.to_string());
        self
    }

    pub fn with_defaults(mut self, defaults: ChannelDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub async fn delivered(&self) -> Vec<Task> {
        self.delivered.lock().await.clone()
    }
}

#[async_trait]
impl Channel for CaptureChannel {
    fn channel_type(&self) -> &str {
        &self.channel_type
    }

    fn defaults(&self) -> ChannelDefaults {
        self.defaults.clone()
    }

    fn verify(&self, request: &InboundRequest) -> bool {
        match &self.secret {
            Some(secret) => request.header("x-test-signature") == Some(secret.as_str()),
            None => true,
        }
    }

    fn translate(&self, request: &InboundRequest) -> Result<Option<TaskRequest>, ConveyorError> {
        let value = request.json()?;
        if value.get("ignore").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Ok(None);
        }
        let task_request: TaskRequest = serde_json::from_value(value)
            .map_err(|e| ConveyorError::BadRequest(format!("invalid task request: {e}")))?;
        Ok(Some(task_request))
    }

    async fn deliver(&self, task: &Task) -> Result<(), ConveyorError> {
        self.delivered.lock().await.push(task.clone());
        Ok(())
    }
}

// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel trait for ingress source integrations (duplex chat, platform webhooks).

use async_trait::async_trait;

use crate::error::ConveyorError;
use crate::types::{ChannelDefaults, InboundRequest, Task, TaskRequest};

/// A named ingress capability: verify + translate + optionally deliver.
///
/// Channels map platform-specific inbound requests to unified
/// [`TaskRequest`]s and declare default skills and tool-bridge configs that
/// are merged (defaults first) into every task they produce.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Unique string key this channel is registered under.
    fn channel_type(&self) -> &str;

    /// Default skills and bridge configs for tasks from this channel.
    ///
    /// Default implementation declares nothing.
    fn defaults(&self) -> ChannelDefaults {
        ChannelDefaults::default()
    }

    /// Signature/auth check over the raw inbound request.
    ///
    /// Duplex channels treat connection acceptance as verification and
    /// return true unconditionally.
    fn verify(&self, request: &InboundRequest) -> bool;

    /// Map a channel-specific payload to a unified [`TaskRequest`].
    ///
    /// Returning `Ok(None)` means "ignore" (e.g. an event type this channel
    /// does not act on); the ingress responds with a skipped marker.
    fn translate(&self, request: &InboundRequest) -> Result<Option<TaskRequest>, ConveyorError>;

    /// Platform-specific side effect after the task reaches a terminal state
    /// (e.g. posting a comment back to the originating platform).
    ///
    /// Invoked at most once per task, only for `completed` tasks. Failures
    /// are logged by the dispatcher and never propagated to task status.
    /// Default implementation is a no-op for channels without delivery.
    async fn deliver(&self, _task: &Task) -> Result<(), ConveyorError> {
        Ok(())
    }
}

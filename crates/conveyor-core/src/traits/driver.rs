// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driver trait: the façade over the container orchestration substrate.

use async_trait::async_trait;

use crate::error::ConveyorError;
use crate::types::Endpoint;

/// Provides per-session worker endpoints.
///
/// The dispatcher borrows an endpoint for the duration of one task; the
/// driver owns pod/container lifetime, including reuse, health-gated
/// readiness, and idle reaping.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Return a healthy endpoint for the session, creating the backing
    /// worker if needed.
    ///
    /// On cold create this blocks until the worker's health probe succeeds,
    /// bounded by the driver's readiness timeout. Times out with
    /// [`ConveyorError::WorkerUnavailable`].
    async fn acquire(&self, session_id: &str) -> Result<Endpoint, ConveyorError>;

    /// Tear down the session's worker. Idempotent; unknown sessions are a no-op.
    async fn release(&self, session_id: &str) -> Result<(), ConveyorError>;

    /// Probe the endpoint's `GET /health` with a 3-second timeout.
    async fn health(&self, endpoint: &Endpoint) -> bool;

    /// Release process-wide resources on shutdown.
    ///
    /// Default implementation does nothing; the orchestrated driver stops
    /// its idle reaper here.
    async fn shutdown(&self) -> Result<(), ConveyorError> {
        Ok(())
    }
}

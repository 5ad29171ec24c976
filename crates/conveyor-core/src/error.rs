// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Conveyor control plane.

use thiserror::Error;

/// The primary error type used across all Conveyor crates.
///
/// Variants map onto the control plane's failure surfaces: inbound request
/// validation, channel verification, driver/worker availability, stream
/// consumption, persistence, and post-completion side effects.
#[derive(Debug, Error)]
pub enum ConveyorError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Store errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed inbound request (bad JSON, missing required field).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Channel signature/auth verification returned false.
    #[error("verification failed for channel '{channel}'")]
    VerificationFailed { channel: String },

    /// No channel registered under the requested type.
    #[error("unknown channel type: {0}")]
    UnknownChannel(String),

    /// Driver could not produce a healthy worker endpoint.
    #[error("worker unavailable: {message}")]
    WorkerUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Worker rejected the prepare call.
    #[error("prepare failed: {message}")]
    PrepareFailed { message: String },

    /// Network or parse error while consuming the worker event stream.
    #[error("stream error: {message}")]
    Stream {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Driver-internal failure (orchestrator API error, container runtime error).
    #[error("driver error: {message}")]
    Driver {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Channel delivery failed; logged, never propagated to task status.
    #[error("delivery failed for channel '{channel}': {message}")]
    Deliver { channel: String, message: String },

    /// Outbound push notification failed; logged, task unchanged.
    #[error("push notification failed: {message}")]
    Push { message: String },

    /// Explicit user cancellation.
    #[error("task canceled")]
    Canceled,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Conveyor control plane.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types used throughout the Conveyor workspace: sessions, tasks,
//! task logs, worker events, and the Channel / Driver / Subscriber seams.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ConveyorError;
pub use traits::subscriber::{frame_types, OutboundFrame};
pub use traits::{Channel, Driver, Subscriber, SubscriberClosed};
pub use types::{
    event_types, BridgeConfig, ChannelDefaults, Endpoint, InboundRequest, PushConfig, Session,
    Task, TaskLogEntry, TaskRequest, TaskStatus, TaskUpdate, WorkerEvent,
};

// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker-facing HTTP client for the Conveyor control plane.
//!
//! Wraps a driver-leased endpoint in typed calls: capability injection
//! (`/prepare`), streaming execution (`/chat` as SSE), best-effort interrupt
//! (`/cancel`), health probing, and session/workspace proxies.

pub mod client;
pub mod sse;

pub use client::{SkillBundle, WorkerClient};
pub use sse::{parse_event_stream, EventStream};

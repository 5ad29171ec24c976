// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for the Conveyor control plane.
//!
//! Two ingress shapes share the channel pipeline: the duplex WebSocket
//! carries interactive chat with live streamed output, and the webhook
//! endpoint accepts platform events and responds 202. A REST surface covers
//! session CRUD, task projections, incremental log tails, cancellation, and
//! worker workspace proxies.

pub mod handlers;
pub mod server;
pub mod webhook;
pub mod ws;

pub use server::{router, start_server, AppState};

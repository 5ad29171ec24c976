// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingress channels for the Conveyor control plane.
//!
//! A channel verifies inbound requests, translates them into unified task
//! requests, declares default capabilities, and optionally delivers results
//! back to the originating platform. The registry maps channel-type strings
//! to implementations.

pub mod duplex;
pub mod forge;
pub mod registry;

pub use duplex::DuplexChannel;
pub use forge::{ForgeChannel, ForgeChannelConfig};
pub use registry::ChannelRegistry;

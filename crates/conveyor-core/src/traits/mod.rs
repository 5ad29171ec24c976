// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for the Conveyor control plane seams.
//!
//! Channels, drivers, and live subscribers are the three polymorphic sets;
//! all use `#[async_trait]` for dynamic dispatch compatibility.

pub mod channel;
pub mod driver;
pub mod subscriber;

pub use channel::Channel;
pub use driver::Driver;
pub use subscriber::{Subscriber, SubscriberClosed};

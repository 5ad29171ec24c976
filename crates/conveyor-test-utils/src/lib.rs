// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the Conveyor workspace: a mock worker speaking the
//! worker API, capturing channel/subscriber doubles, and a full-stack test
//! harness.

pub mod capture;
pub mod harness;
pub mod mock_worker;

pub use capture::{CaptureChannel, CaptureSubscriber};
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_worker::{event, sse_body, MockWorker};

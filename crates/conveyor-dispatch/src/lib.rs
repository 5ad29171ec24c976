// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task dispatch for the Conveyor control plane.
//!
//! Owns the resolve -> acquire -> prepare -> chat -> fan-out -> deliver
//! pipeline, plus the orthogonal push notifications, skill resolution, and
//! the fire-and-forget session title generator.

pub mod dispatcher;
pub mod push;
pub mod skills;
pub mod titles;

pub use dispatcher::{CancelOutcome, Dispatcher};
pub use skills::SkillLibrary;
pub use titles::TitleGenerator;

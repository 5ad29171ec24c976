// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. All functions accept `&Database` and run on its
//! single writer thread.

pub mod logs;
pub mod sessions;
pub mod tasks;

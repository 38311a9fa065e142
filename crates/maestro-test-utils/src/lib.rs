// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Maestro integration tests.
//!
//! # Components
//!
//! - [`MockRunner`] - Plugin runner with scripted hook outcomes and message capture
//! - [`TestHarness`] - Started plugin manager over mock runners and temp storage

pub mod harness;
pub mod mock_runner;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_runner::MockRunner;

// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for bday integration tests.
//!
//! - [`MockSender`] - scripted notification sender with call counting
//! - [`MockDirectory`] - in-memory user directory with failure injection
//! - [`TestHarness`] - scheduler over a temp SQLite database

pub mod harness;
pub mod mock_directory;
pub mod mock_sender;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_directory::MockDirectory;
pub use mock_sender::MockSender;

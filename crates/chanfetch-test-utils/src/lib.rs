// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for chanfetch integration tests.
//!
//! Provides mock adapters and a temp-database harness for fast,
//! deterministic tests without a Telegram connection.
//!
//! # Components
//!
//! - [`MockSource`] - scripted channel history and file transfers with failure injection
//! - [`FlakyStore`] - store wrapper that fails or stalls selected writes
//! - [`TestHarness`] - temp SQLite store, mock source, and working directories

pub mod flaky_store;
pub mod harness;
pub mod mock_source;

pub use flaky_store::FlakyStore;
pub use harness::TestHarness;
pub use mock_source::{MockSource, SourceOp, text_message, video_message};

// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for chanfetch.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and the [`DownloadStore`]
//! implementation the engine runs against.
//!
//! [`DownloadStore`]: chanfetch_core::DownloadStore

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStore;
pub use database::{map_tr_err, Database};

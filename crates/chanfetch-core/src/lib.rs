// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for chanfetch.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types used throughout the chanfetch workspace. The engine talks to
//! its external collaborators only through the [`Source`] and
//! [`DownloadStore`] traits defined here.

pub mod error;
pub mod pattern;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ChanfetchError;
pub use types::{
    AdapterType, ChannelId, Download, DownloadId, DownloadStatus, FileHandle, FileId,
    HealthStatus, Item, ItemId, ItemPatch, MAX_PRIORITY, MIN_PRIORITY, MessageContent, MessageId,
    NewDownload, NewItem, QueuedDownload, ScanFilter, SourceMessage, SourceUpdate,
    VideoAttachment,
};

pub use traits::{DownloadStore, PluginAdapter, Source};

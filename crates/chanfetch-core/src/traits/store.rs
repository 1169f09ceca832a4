// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store adapter trait for the persisted Item and Download records.

use async_trait::async_trait;

use crate::error::ChanfetchError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Download, DownloadId, Item, ItemId, ItemPatch, MessageId, NewDownload, NewItem,
    QueuedDownload, ScanFilter,
};

/// Transactional repository for items and downloads.
///
/// Every method is one atomic unit: it either applies completely or not at all.
#[async_trait]
pub trait DownloadStore: PluginAdapter {
    /// Initializes the backend (migrations, connection).
    async fn initialize(&self) -> Result<(), ChanfetchError>;

    /// Flushes pending writes and releases the backend.
    async fn close(&self) -> Result<(), ChanfetchError>;

    // --- Items ---

    async fn create_item(&self, item: &NewItem) -> Result<Item, ChanfetchError>;

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, ChanfetchError>;

    /// Items whose `date_end` is strictly after `active_after`.
    async fn list_items(&self, active_after: i64) -> Result<Vec<Item>, ChanfetchError>;

    /// Returns `false` when the item does not exist.
    async fn update_item(&self, id: ItemId, patch: &ItemPatch) -> Result<bool, ChanfetchError>;

    /// Deletes an item and its downloads. Returns the removed download ids, or
    /// `None` when the item does not exist.
    async fn delete_item(&self, id: ItemId) -> Result<Option<Vec<DownloadId>>, ChanfetchError>;

    /// Items eligible for scanning: matching `filter` with `date_end >= date_end_from`,
    /// ordered by id.
    async fn scan_candidates(
        &self,
        filter: &ScanFilter,
        date_end_from: i64,
    ) -> Result<Vec<Item>, ChanfetchError>;

    /// Raises the scan watermark to `process`. Never lowers it.
    async fn advance_watermark(
        &self,
        item_id: ItemId,
        process: MessageId,
    ) -> Result<(), ChanfetchError>;

    /// In one transaction: raises `date_end` (if given and greater) and inserts
    /// `downloads`, skipping messages the item already has. Returns the number
    /// of rows inserted.
    async fn commit_matches(
        &self,
        item_id: ItemId,
        date_end: Option<i64>,
        downloads: &[NewDownload],
    ) -> Result<usize, ChanfetchError>;

    // --- Downloads ---

    /// Inserts downloads; a duplicate `(item_id, msg_id)` fails the whole batch
    /// with [`ChanfetchError::Conflict`].
    async fn create_downloads(
        &self,
        downloads: &[NewDownload],
    ) -> Result<Vec<Download>, ChanfetchError>;

    async fn get_download(&self, id: DownloadId) -> Result<Option<Download>, ChanfetchError>;

    /// The download with its item's channel.
    async fn get_queued_download(
        &self,
        id: DownloadId,
    ) -> Result<Option<QueuedDownload>, ChanfetchError>;

    async fn list_item_downloads(&self, item_id: ItemId) -> Result<Vec<Download>, ChanfetchError>;

    /// All rows in the active state (used to resume after restart).
    async fn list_active(&self) -> Result<Vec<QueuedDownload>, ChanfetchError>;

    /// Up to `limit` queued rows ordered by priority desc, date asc, id asc.
    async fn next_queued(&self, limit: usize) -> Result<Vec<QueuedDownload>, ChanfetchError>;

    /// Queued -> active. Returns `false` if the row is missing or terminal.
    async fn set_downloading(&self, id: DownloadId) -> Result<bool, ChanfetchError>;

    /// Stores the last error text and time without touching the flags.
    /// Returns `false` if the row is no longer active.
    async fn record_error(
        &self,
        id: DownloadId,
        message: &str,
        at: i64,
    ) -> Result<bool, ChanfetchError>;

    /// Active -> terminal-fatal with its last error. Returns `false` if the
    /// row is no longer active.
    async fn mark_fatal(&self, id: DownloadId, message: &str, at: i64)
        -> Result<bool, ChanfetchError>;

    /// Active -> terminal-success. Returns `false` if the row is not active.
    async fn complete_download(&self, id: DownloadId) -> Result<bool, ChanfetchError>;

    /// Any state -> queued, clearing the error. Returns `false` if missing.
    async fn reset_download(&self, id: DownloadId) -> Result<bool, ChanfetchError>;

    /// Returns `false` if missing.
    async fn update_priority(&self, id: DownloadId, priority: i32)
        -> Result<bool, ChanfetchError>;

    /// Returns `false` if missing.
    async fn delete_download(&self, id: DownloadId) -> Result<bool, ChanfetchError>;
}

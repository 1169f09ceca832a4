// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store wrapper with switchable write failures and read latency.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use chanfetch_core::{
    AdapterType, ChanfetchError, Download, DownloadId, DownloadStore, HealthStatus, Item, ItemId,
    ItemPatch, MessageId, NewDownload, NewItem, PluginAdapter, QueuedDownload, ScanFilter,
};

/// Delegates to an inner store, except where a toggle says otherwise.
pub struct FlakyStore {
    inner: Arc<dyn DownloadStore>,
    fail_mark_fatal: AtomicBool,
    fail_record_error: AtomicBool,
    read_delay_ms: AtomicU64,
    mark_fatal_calls: AtomicUsize,
}

fn injected(op: &str) -> ChanfetchError {
    ChanfetchError::Storage {
        source: format!("injected {op} failure").into(),
    }
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn DownloadStore>) -> Self {
        Self {
            inner,
            fail_mark_fatal: AtomicBool::new(false),
            fail_record_error: AtomicBool::new(false),
            read_delay_ms: AtomicU64::new(0),
            mark_fatal_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_mark_fatal(&self, fail: bool) {
        self.fail_mark_fatal.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_record_error(&self, fail: bool) {
        self.fail_record_error.store(fail, Ordering::SeqCst);
    }

    /// Delays every `get_download` by `delay`.
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Attempts of `mark_fatal`, failed ones included.
    pub fn mark_fatal_calls(&self) -> usize {
        self.mark_fatal_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, ChanfetchError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), ChanfetchError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl DownloadStore for FlakyStore {
    async fn initialize(&self) -> Result<(), ChanfetchError> {
        self.inner.initialize().await
    }

    async fn close(&self) -> Result<(), ChanfetchError> {
        self.inner.close().await
    }

    async fn create_item(&self, item: &NewItem) -> Result<Item, ChanfetchError> {
        self.inner.create_item(item).await
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, ChanfetchError> {
        self.inner.get_item(id).await
    }

    async fn list_items(&self, active_after: i64) -> Result<Vec<Item>, ChanfetchError> {
        self.inner.list_items(active_after).await
    }

    async fn update_item(&self, id: ItemId, patch: &ItemPatch) -> Result<bool, ChanfetchError> {
        self.inner.update_item(id, patch).await
    }

    async fn delete_item(&self, id: ItemId) -> Result<Option<Vec<DownloadId>>, ChanfetchError> {
        self.inner.delete_item(id).await
    }

    async fn scan_candidates(
        &self,
        filter: &ScanFilter,
        date_end_from: i64,
    ) -> Result<Vec<Item>, ChanfetchError> {
        self.inner.scan_candidates(filter, date_end_from).await
    }

    async fn advance_watermark(
        &self,
        item_id: ItemId,
        process: MessageId,
    ) -> Result<(), ChanfetchError> {
        self.inner.advance_watermark(item_id, process).await
    }

    async fn commit_matches(
        &self,
        item_id: ItemId,
        date_end: Option<i64>,
        downloads: &[NewDownload],
    ) -> Result<usize, ChanfetchError> {
        self.inner.commit_matches(item_id, date_end, downloads).await
    }

    async fn create_downloads(
        &self,
        downloads: &[NewDownload],
    ) -> Result<Vec<Download>, ChanfetchError> {
        self.inner.create_downloads(downloads).await
    }

    async fn get_download(&self, id: DownloadId) -> Result<Option<Download>, ChanfetchError> {
        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.get_download(id).await
    }

    async fn get_queued_download(
        &self,
        id: DownloadId,
    ) -> Result<Option<QueuedDownload>, ChanfetchError> {
        self.inner.get_queued_download(id).await
    }

    async fn list_item_downloads(&self, item_id: ItemId) -> Result<Vec<Download>, ChanfetchError> {
        self.inner.list_item_downloads(item_id).await
    }

    async fn list_active(&self) -> Result<Vec<QueuedDownload>, ChanfetchError> {
        self.inner.list_active().await
    }

    async fn next_queued(&self, limit: usize) -> Result<Vec<QueuedDownload>, ChanfetchError> {
        self.inner.next_queued(limit).await
    }

    async fn set_downloading(&self, id: DownloadId) -> Result<bool, ChanfetchError> {
        self.inner.set_downloading(id).await
    }

    async fn record_error(
        &self,
        id: DownloadId,
        message: &str,
        at: i64,
    ) -> Result<bool, ChanfetchError> {
        if self.fail_record_error.load(Ordering::SeqCst) {
            return Err(injected("record_error"));
        }
        self.inner.record_error(id, message, at).await
    }

    async fn mark_fatal(
        &self,
        id: DownloadId,
        message: &str,
        at: i64,
    ) -> Result<bool, ChanfetchError> {
        self.mark_fatal_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mark_fatal.load(Ordering::SeqCst) {
            return Err(injected("mark_fatal"));
        }
        self.inner.mark_fatal(id, message, at).await
    }

    async fn complete_download(&self, id: DownloadId) -> Result<bool, ChanfetchError> {
        self.inner.complete_download(id).await
    }

    async fn reset_download(&self, id: DownloadId) -> Result<bool, ChanfetchError> {
        self.inner.reset_download(id).await
    }

    async fn update_priority(
        &self,
        id: DownloadId,
        priority: i32,
    ) -> Result<bool, ChanfetchError> {
        self.inner.update_priority(id, priority).await
    }

    async fn delete_download(&self, id: DownloadId) -> Result<bool, ChanfetchError> {
        self.inner.delete_download(id).await
    }
}

// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the DownloadStore trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use chanfetch_config::model::StorageConfig;
use chanfetch_core::types::ItemPatch;
use chanfetch_core::{
    AdapterType, ChanfetchError, Download, DownloadId, DownloadStore, HealthStatus, Item, ItemId,
    MessageId, NewDownload, NewItem, PluginAdapter, QueuedDownload, ScanFilter,
};

use crate::database::Database;
use crate::queries::{downloads, items};

/// SQLite-backed download store.
///
/// The database is opened on the first call to [`DownloadStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a new store with the given configuration.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns the underlying Database, or an error if not initialized.
    pub fn database(&self) -> Result<&Database, ChanfetchError> {
        self.db.get().ok_or_else(|| ChanfetchError::Storage {
            source: "store not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, ChanfetchError> {
        let db = self.database()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ChanfetchError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadStore for SqliteStore {
    async fn initialize(&self) -> Result<(), ChanfetchError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ChanfetchError::Storage {
            source: "store already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ChanfetchError> {
        self.database()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Items ---

    async fn create_item(&self, item: &NewItem) -> Result<Item, ChanfetchError> {
        items::create_item(self.database()?, item).await
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, ChanfetchError> {
        items::get_item(self.database()?, id).await
    }

    async fn list_items(&self, active_after: i64) -> Result<Vec<Item>, ChanfetchError> {
        items::list_items(self.database()?, active_after).await
    }

    async fn update_item(&self, id: ItemId, patch: &ItemPatch) -> Result<bool, ChanfetchError> {
        items::update_item(self.database()?, id, patch).await
    }

    async fn delete_item(&self, id: ItemId) -> Result<Option<Vec<DownloadId>>, ChanfetchError> {
        items::delete_item(self.database()?, id).await
    }

    async fn scan_candidates(
        &self,
        filter: &ScanFilter,
        date_end_from: i64,
    ) -> Result<Vec<Item>, ChanfetchError> {
        items::scan_candidates(self.database()?, filter, date_end_from).await
    }

    async fn advance_watermark(
        &self,
        item_id: ItemId,
        process: MessageId,
    ) -> Result<(), ChanfetchError> {
        items::advance_watermark(self.database()?, item_id, process).await
    }

    async fn commit_matches(
        &self,
        item_id: ItemId,
        date_end: Option<i64>,
        downloads: &[NewDownload],
    ) -> Result<usize, ChanfetchError> {
        items::commit_matches(self.database()?, item_id, date_end, downloads).await
    }

    // --- Downloads ---

    async fn create_downloads(
        &self,
        new: &[NewDownload],
    ) -> Result<Vec<Download>, ChanfetchError> {
        downloads::create_downloads(self.database()?, new).await
    }

    async fn get_download(&self, id: DownloadId) -> Result<Option<Download>, ChanfetchError> {
        downloads::get_download(self.database()?, id).await
    }

    async fn get_queued_download(
        &self,
        id: DownloadId,
    ) -> Result<Option<QueuedDownload>, ChanfetchError> {
        downloads::get_queued_download(self.database()?, id).await
    }

    async fn list_item_downloads(&self, item_id: ItemId) -> Result<Vec<Download>, ChanfetchError> {
        downloads::list_item_downloads(self.database()?, item_id).await
    }

    async fn list_active(&self) -> Result<Vec<QueuedDownload>, ChanfetchError> {
        downloads::list_active(self.database()?).await
    }

    async fn next_queued(&self, limit: usize) -> Result<Vec<QueuedDownload>, ChanfetchError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        downloads::next_queued(self.database()?, limit).await
    }

    async fn set_downloading(&self, id: DownloadId) -> Result<bool, ChanfetchError> {
        downloads::set_downloading(self.database()?, id).await
    }

    async fn record_error(
        &self,
        id: DownloadId,
        message: &str,
        at: i64,
    ) -> Result<bool, ChanfetchError> {
        downloads::record_error(self.database()?, id, message, at).await
    }

    async fn mark_fatal(
        &self,
        id: DownloadId,
        message: &str,
        at: i64,
    ) -> Result<bool, ChanfetchError> {
        downloads::mark_fatal(self.database()?, id, message, at).await
    }

    async fn complete_download(&self, id: DownloadId) -> Result<bool, ChanfetchError> {
        downloads::complete_download(self.database()?, id).await
    }

    async fn reset_download(&self, id: DownloadId) -> Result<bool, ChanfetchError> {
        downloads::reset_download(self.database()?, id).await
    }

    async fn update_priority(
        &self,
        id: DownloadId,
        priority: i32,
    ) -> Result<bool, ChanfetchError> {
        downloads::update_priority(self.database()?, id, priority).await
    }

    async fn delete_download(&self, id: DownloadId) -> Result<bool, ChanfetchError> {
        downloads::delete_download(self.database()?, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_store_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.version(), semver::Version::new(0, 1, 0));
        assert_eq!(store.adapter_type(), AdapterType::Store);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        store.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
        assert!(store.initialize().await.is_err(), "second initialize should fail");
    }

    #[tokio::test]
    async fn health_check_requires_initialize() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        assert!(store.health_check().await.is_err());
        store.initialize().await.unwrap();
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn item_and_download_through_trait_object() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("trait.db");
        let sqlite = SqliteStore::new(make_config(db_path.to_str().unwrap()));
        sqlite.initialize().await.unwrap();
        let store: &dyn DownloadStore = &sqlite;

        let item = store
            .create_item(&NewItem {
                channel_id: -1,
                name: "n".into(),
                regexp: ".*".into(),
                pattern: "f".into(),
                priority: 2,
                target_path: "/tmp/n".into(),
                ..NewItem::default()
            })
            .await
            .unwrap();
        let created = store
            .commit_matches(
                item.id,
                Some(10),
                &[NewDownload {
                    item_id: item.id,
                    msg_id: 5,
                    text: "t".into(),
                    size: 1,
                    date: 10,
                    priority: 2,
                }],
            )
            .await
            .unwrap();
        assert_eq!(created, 1);
        assert!(store.next_queued(0).await.unwrap().is_empty());
        let queued = store.next_queued(5).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].channel_id, -1);

        store.close().await.unwrap();
        store.shutdown().await.unwrap();
    }
}

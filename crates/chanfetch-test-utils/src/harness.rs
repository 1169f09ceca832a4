// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for engine integration tests.
//!
//! `TestHarness` owns a temp directory holding a migrated SQLite store, the
//! mock source's staging area, and a target directory for finished files.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use chanfetch_config::model::StorageConfig;
use chanfetch_core::{ChanfetchError, ChannelId, DownloadStore, NewItem};
use chanfetch_storage::SqliteStore;

use crate::flaky_store::FlakyStore;
use crate::mock_source::MockSource;

pub struct TestHarness {
    pub dir: TempDir,
    pub sqlite: Arc<SqliteStore>,
    /// Wraps `sqlite`; hand this to the engine when a test needs failures.
    pub flaky: Arc<FlakyStore>,
    pub source: Arc<MockSource>,
}

impl TestHarness {
    pub async fn new() -> Result<Self, ChanfetchError> {
        let dir = tempfile::TempDir::new().map_err(|e| ChanfetchError::Storage { source: e.into() })?;
        let sqlite = SqliteStore::new(StorageConfig {
            database_path: dir.path().join("test.db").to_string_lossy().into_owned(),
            wal_mode: true,
        });
        sqlite.initialize().await?;
        let sqlite = Arc::new(sqlite);
        let flaky = Arc::new(FlakyStore::new(Arc::clone(&sqlite) as Arc<dyn DownloadStore>));
        let source = Arc::new(MockSource::new(dir.path().join("staging")));
        Ok(Self {
            dir,
            sqlite,
            flaky,
            source,
        })
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    pub fn target_dir(&self) -> PathBuf {
        self.dir.path().join("target")
    }

    /// An item on `channel_id` naming episodes `ep<season>` into the target
    /// directory, matching every caption. It starts now, so it is eligible
    /// for scanning.
    pub fn item(&self, channel_id: ChannelId) -> NewItem {
        NewItem {
            channel_id,
            name: "show".into(),
            regexp: r"S(\d+)E(\d+)".into(),
            pattern: "ep$1".into(),
            match_pattern: String::new(),
            match_content: String::new(),
            date_start: chrono::Utc::now().timestamp(),
            priority: 5,
            target_path: self.target_dir().to_string_lossy().into_owned(),
        }
    }
}

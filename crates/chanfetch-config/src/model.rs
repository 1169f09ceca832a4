// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for chanfetch.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level chanfetch configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChanfetchConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub app: AppConfig,

    /// Download queue and supervisor tuning.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Target file settings.
    #[serde(default)]
    pub files: FilesConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Telegram source settings.
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Process-wide configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Download queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Maximum number of concurrently active downloads (admission cap).
    #[serde(default = "default_max_parallel_download")]
    pub max_parallel_download: usize,

    /// Number of recorded errors after which a download becomes fatal.
    #[serde(default = "default_max_download_error")]
    pub max_download_error: u32,

    /// Items whose last match is older than this many days are not scanned.
    #[serde(default = "default_scan_threshold_days")]
    pub scan_threshold_days: u32,

    /// Messages requested per history page.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,

    /// Base interval between reconciliation passes.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Interval used once there is nothing to do.
    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,

    /// A task whose file state is older than this is refreshed on the next pass.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Upper bound for one source call made during a pass.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Upper bound for persisting a task error.
    #[serde(default = "default_persist_timeout_secs")]
    pub persist_timeout_secs: u64,
}

impl QueueConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_secs(self.persist_timeout_secs)
    }

    /// The `scan_threshold_days` window in seconds.
    pub fn scan_threshold_secs(&self) -> i64 {
        i64::from(self.scan_threshold_days) * 24 * 60 * 60
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_parallel_download: default_max_parallel_download(),
            max_download_error: default_max_download_error(),
            scan_threshold_days: default_scan_threshold_days(),
            history_page_size: default_history_page_size(),
            tick_interval_secs: default_tick_interval_secs(),
            idle_interval_secs: default_idle_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            persist_timeout_secs: default_persist_timeout_secs(),
        }
    }
}

fn default_max_parallel_download() -> usize {
    1
}

fn default_max_download_error() -> u32 {
    5
}

fn default_scan_threshold_days() -> u32 {
    32
}

fn default_history_page_size() -> u32 {
    100
}

fn default_tick_interval_secs() -> u64 {
    10
}

fn default_idle_interval_secs() -> u64 {
    300
}

fn default_stale_after_secs() -> u64 {
    10
}

fn default_call_timeout_secs() -> u64 {
    5
}

fn default_persist_timeout_secs() -> u64 {
    2
}

/// Target file configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilesConfig {
    /// Octal permission bits for created target directories and copied files.
    #[serde(default = "default_file_perm")]
    pub file_perm: String,
}

impl FilesConfig {
    /// Parses `file_perm` as octal. Validation guarantees this succeeds for
    /// a loaded config.
    pub fn mode(&self) -> Option<u32> {
        u32::from_str_radix(self.file_perm.trim_start_matches("0o"), 8)
            .ok()
            .filter(|mode| *mode <= 0o7777)
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            file_perm: default_file_perm(),
        }
    }
}

fn default_file_perm() -> String {
    "0777".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("chanfetch").join("chanfetch.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("chanfetch.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Telegram source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token. Required to run the source.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Directory where transfers are staged before being moved to their target.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Channel ids whose posts are recorded. Empty records every channel.
    #[serde(default)]
    pub channels: Vec<i64>,

    /// Maximum number of flood-control retries per request.
    #[serde(default = "default_max_flood_retries")]
    pub max_flood_retries: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            staging_dir: default_staging_dir(),
            channels: Vec::new(),
            max_flood_retries: default_max_flood_retries(),
        }
    }
}

fn default_staging_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("chanfetch").join("staging"))
        .unwrap_or_else(|| std::path::PathBuf::from("staging"))
        .to_string_lossy()
        .into_owned()
}

fn default_max_flood_retries() -> u32 {
    3
}

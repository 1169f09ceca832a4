// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime settings of the engine, derived from the loaded configuration.

use std::time::Duration;

use chanfetch_config::model::{FilesConfig, QueueConfig};
use chanfetch_config::ChanfetchConfig;
use chanfetch_core::ChanfetchError;

/// Tunables the supervisor, scanner, and tasks read at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Admission cap.
    pub max_parallel_download: usize,
    /// Recorded errors after which a task turns fatal.
    pub max_download_error: u32,
    /// Items whose last match is older than this are not scanned.
    pub scan_threshold_secs: i64,
    pub history_page_size: u32,
    pub tick_interval: Duration,
    pub idle_interval: Duration,
    pub stale_after: Duration,
    pub call_timeout: Duration,
    pub persist_timeout: Duration,
    /// Permission bits for created target directories and copied files.
    pub file_mode: u32,
}

impl EngineSettings {
    pub fn from_config(config: &ChanfetchConfig) -> Result<Self, ChanfetchError> {
        Self::from_sections(&config.queue, &config.files)
    }

    pub fn from_sections(queue: &QueueConfig, files: &FilesConfig) -> Result<Self, ChanfetchError> {
        let file_mode = files.mode().ok_or_else(|| {
            ChanfetchError::Config(format!(
                "files.file_perm `{}` is not an octal permission",
                files.file_perm
            ))
        })?;
        Ok(Self {
            max_parallel_download: queue.max_parallel_download,
            max_download_error: queue.max_download_error,
            scan_threshold_secs: queue.scan_threshold_secs(),
            history_page_size: queue.history_page_size,
            tick_interval: queue.tick_interval(),
            idle_interval: queue.idle_interval(),
            stale_after: queue.stale_after(),
            call_timeout: queue.call_timeout(),
            persist_timeout: queue.persist_timeout(),
            file_mode,
        })
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        let queue = QueueConfig::default();
        Self {
            max_parallel_download: queue.max_parallel_download,
            max_download_error: queue.max_download_error,
            scan_threshold_secs: queue.scan_threshold_secs(),
            history_page_size: queue.history_page_size,
            tick_interval: queue.tick_interval(),
            idle_interval: queue.idle_interval(),
            stale_after: queue.stale_after(),
            call_timeout: queue.call_timeout(),
            persist_timeout: queue.persist_timeout(),
            file_mode: 0o777,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_defaults() {
        let from_config = EngineSettings::from_config(&ChanfetchConfig::default()).unwrap();
        assert_eq!(from_config, EngineSettings::default());
    }

    #[test]
    fn bad_permission_is_a_config_error() {
        let mut config = ChanfetchConfig::default();
        config.files.file_perm = "abc".into();
        let err = EngineSettings::from_config(&config).unwrap_err();
        assert!(matches!(err, ChanfetchError::Config(_)));
    }
}

// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as interval ordering, octal permission strings, and non-empty paths.

use crate::diagnostic::ConfigError;
use crate::model::ChanfetchConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ChanfetchConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.app.log_level.to_ascii_lowercase().as_str()) {
        invalid(format!(
            "app.log_level `{}` is not one of {}",
            config.app.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    let queue = &config.queue;
    if queue.max_parallel_download < 1 {
        invalid("queue.max_parallel_download must be at least 1".to_string());
    }
    if queue.max_download_error < 1 {
        invalid("queue.max_download_error must be at least 1".to_string());
    }
    if !(1..=100).contains(&queue.history_page_size) {
        invalid(format!(
            "queue.history_page_size must be between 1 and 100, got {}",
            queue.history_page_size
        ));
    }
    if queue.tick_interval_secs < 1 {
        invalid("queue.tick_interval_secs must be at least 1".to_string());
    }
    if queue.idle_interval_secs < queue.tick_interval_secs {
        invalid(format!(
            "queue.idle_interval_secs ({}) must not be shorter than queue.tick_interval_secs ({})",
            queue.idle_interval_secs, queue.tick_interval_secs
        ));
    }
    if queue.call_timeout_secs < 1 {
        invalid("queue.call_timeout_secs must be at least 1".to_string());
    }

    if config.files.mode().is_none() {
        invalid(format!(
            "files.file_perm `{}` is not an octal permission (e.g. \"0755\")",
            config.files.file_perm
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }
    if config.telegram.staging_dir.trim().is_empty() {
        invalid("telegram.staging_dir must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

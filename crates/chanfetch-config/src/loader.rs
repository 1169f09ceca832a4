// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./chanfetch.toml` > `~/.config/chanfetch/chanfetch.toml` >
//! `/etc/chanfetch/chanfetch.toml` with environment variable overrides via `CHANFETCH_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ChanfetchConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/chanfetch/chanfetch.toml` (system-wide)
/// 3. `~/.config/chanfetch/chanfetch.toml` (user XDG config)
/// 4. `./chanfetch.toml` (local directory)
/// 5. `CHANFETCH_*` environment variables
pub fn load_config() -> Result<ChanfetchConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ChanfetchConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ChanfetchConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ChanfetchConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ChanfetchConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ChanfetchConfig::default()))
        .merge(Toml::file("/etc/chanfetch/chanfetch.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("chanfetch/chanfetch.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("chanfetch.toml"))
        .merge(env_provider())
}

/// Environment provider mapping the first `_`-separated segment to a section.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `CHANFETCH_QUEUE_MAX_PARALLEL_DOWNLOAD` must map to
/// `queue.max_parallel_download`, not `queue.max.parallel.download`.
fn env_provider() -> Env {
    Env::prefixed("CHANFETCH_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    const SECTIONS: [&str; 5] = ["app", "queue", "files", "storage", "telegram"];
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

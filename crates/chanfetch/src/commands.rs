// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot maintenance commands.
//!
//! Listings and resets work on the database alone; `scan` and `add-item`
//! resolve messages through the Telegram post log and need a bot token.

use chanfetch_config::ChanfetchConfig;
use chanfetch_core::{ChanfetchError, DownloadStore, NewItem, ScanFilter};
use serde::Serialize;
use tracing::info;

use crate::serve::{open_runtime, open_store};
use crate::AddItemArgs;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), ChanfetchError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ChanfetchError::Internal(format!("failed to encode output: {e}")))?;
    println!("{text}");
    Ok(())
}

/// Cutoff for `items`: items whose last match is older are hidden unless
/// `all` is set.
pub(crate) fn items_cutoff(config: &ChanfetchConfig, all: bool, now: i64) -> i64 {
    if all {
        i64::MIN
    } else {
        now - config.queue.scan_threshold_secs()
    }
}

pub async fn run_scan(config: &ChanfetchConfig) -> Result<(), ChanfetchError> {
    let runtime = open_runtime(config).await?;
    let created = runtime.engine.scan(ScanFilter::all()).await?;
    info!(created, "scan finished");
    println!("{created}");
    runtime.store.close().await
}

pub async fn run_items(config: &ChanfetchConfig, all: bool) -> Result<(), ChanfetchError> {
    let store = open_store(config).await?;
    let cutoff = items_cutoff(config, all, chrono::Utc::now().timestamp());
    let items = store.list_items(cutoff).await?;
    print_json(&items)
}

pub async fn run_add_item(config: &ChanfetchConfig, args: AddItemArgs) -> Result<(), ChanfetchError> {
    let runtime = open_runtime(config).await?;
    let new = NewItem {
        channel_id: args.channel,
        name: args.name,
        regexp: args.regexp,
        pattern: args.pattern,
        match_pattern: args.match_pattern,
        match_content: args.match_content,
        date_start: args.since.unwrap_or_else(|| chrono::Utc::now().timestamp()),
        priority: args.priority,
        target_path: args.target,
    };
    let (item, downloads) = runtime.engine.create_item(new, &args.messages).await?;
    print_json(&serde_json::json!({ "item": item, "downloads": downloads }))?;
    runtime.store.close().await
}

pub async fn run_downloads(config: &ChanfetchConfig, item: i64) -> Result<(), ChanfetchError> {
    let store = open_store(config).await?;
    if store.get_item(item).await?.is_none() {
        return Err(ChanfetchError::NotFound { kind: "item", id: item });
    }
    let downloads = store.list_item_downloads(item).await?;
    print_json(&downloads)
}

/// Re-queues a download. A running `serve` picks it up on its next pass.
pub async fn run_reset(config: &ChanfetchConfig, id: i64) -> Result<(), ChanfetchError> {
    let store = open_store(config).await?;
    if !store.reset_download(id).await? {
        return Err(ChanfetchError::NotFound { kind: "download", id });
    }
    info!(download = id, "download re-queued");
    store.close().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_cutoff_honours_threshold() {
        let config = chanfetch_config::load_and_validate_str(
            "[queue]\nscan_threshold_days = 2\n",
        )
        .unwrap();
        assert_eq!(items_cutoff(&config, false, 1_000_000), 1_000_000 - 2 * 86_400);
        assert_eq!(items_cutoff(&config, true, 1_000_000), i64::MIN);
    }

    #[tokio::test]
    async fn reset_of_unknown_download_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[storage]\ndatabase_path = \"{}\"\n",
            dir.path().join("c.db").display()
        );
        let config = chanfetch_config::load_and_validate_str(&toml).unwrap();
        assert!(matches!(
            run_reset(&config, 42).await,
            Err(ChanfetchError::NotFound { kind: "download", id: 42 })
        ));
        assert!(matches!(
            run_downloads(&config, 7).await,
            Err(ChanfetchError::NotFound { kind: "item", id: 7 })
        ));
    }
}

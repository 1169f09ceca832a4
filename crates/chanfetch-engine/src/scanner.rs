// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incremental discovery of matching channel messages.
//!
//! For every eligible item the scanner pages backwards through the channel
//! history until it reaches the item's watermark, commits the newest id as
//! the new watermark, and inserts downloads for the messages whose caption
//! matches. Items are isolated from each other: a failure skips the item and
//! the scan moves on.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use chanfetch_core::pattern;
use chanfetch_core::{ChanfetchError, Item, NewDownload, ScanFilter, SourceMessage};

use crate::context::{unix_now, EngineContext};

pub struct Scanner {
    ctx: Arc<EngineContext>,
    /// Scans run one at a time.
    lock: Mutex<()>,
}

impl Scanner {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            lock: Mutex::new(()),
        }
    }

    /// Scans every item selected by `filter` and returns the number of
    /// downloads created.
    pub async fn scan(&self, filter: ScanFilter) -> Result<usize, ChanfetchError> {
        let _serial = self.lock.lock().await;

        let date_end_from = unix_now() - self.ctx.settings.scan_threshold_secs;
        let items = self
            .ctx
            .store
            .scan_candidates(&filter, date_end_from)
            .await?;

        let mut created = 0;
        for item in &items {
            match self.scan_item(item).await {
                Ok(count) => {
                    debug!(item = item.id, channel = item.channel_id, created = count, "item scanned");
                    created += count;
                }
                Err(err) => {
                    warn!(item = item.id, channel = item.channel_id, error = %err, "item scan failed");
                }
            }
        }

        if created > 0 {
            info!(items = items.len(), created, "scan created downloads");
        }
        Ok(created)
    }

    async fn scan_item(&self, item: &Item) -> Result<usize, ChanfetchError> {
        let regex = pattern::compile(&item.regexp)?;

        let unseen = self.collect_unseen(item).await?;
        let Some(newest) = unseen.back().map(|m| m.id) else {
            return Ok(0);
        };
        // Committed before filtering so that these messages are never read again.
        self.ctx.store.advance_watermark(item.id, newest).await?;

        let mut date_end = item.date_end;
        let mut matches = Vec::new();
        for message in &unseen {
            let Some(video) = self.ctx.source.video_attachment(message) else {
                continue;
            };
            if pattern::expand(&video.caption, &regex, &item.match_pattern) != item.match_content {
                continue;
            }
            if let Some(new) = NewDownload::from_message(item.id, item.priority, message) {
                date_end = date_end.max(message.date);
                matches.push(new);
            }
        }

        let date_end = (date_end > item.date_end).then_some(date_end);
        if matches.is_empty() && date_end.is_none() {
            return Ok(0);
        }
        self.ctx
            .store
            .commit_matches(item.id, date_end, &matches)
            .await
    }

    /// Pages history newest-first and returns the messages above the
    /// watermark, oldest first.
    async fn collect_unseen(&self, item: &Item) -> Result<VecDeque<SourceMessage>, ChanfetchError> {
        let page_size = self.ctx.settings.history_page_size;
        let mut unseen = VecDeque::new();
        let mut from = 0;

        loop {
            let page = self
                .ctx
                .call(
                    self.ctx
                        .source
                        .get_history(item.channel_id, from, page_size),
                )
                .await?;
            let Some(oldest) = page.last().map(|m| m.id) else {
                break;
            };

            let mut reached_watermark = false;
            for message in page {
                if message.id <= item.process {
                    reached_watermark = true;
                    break;
                }
                unseen.push_front(message);
            }

            // A cursor that does not move would page forever.
            if reached_watermark || (from != 0 && oldest >= from) {
                break;
            }
            from = oldest;
        }

        Ok(unseen)
    }
}

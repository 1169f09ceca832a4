// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The collaborators and settings shared by every engine component.

use std::future::Future;
use std::sync::Arc;

use chanfetch_core::{ChanfetchError, DownloadStore, Source};

use crate::settings::EngineSettings;

/// Injected source, store, and settings.
pub struct EngineContext {
    pub source: Arc<dyn Source>,
    pub store: Arc<dyn DownloadStore>,
    pub settings: EngineSettings,
}

impl EngineContext {
    pub fn new(
        source: Arc<dyn Source>,
        store: Arc<dyn DownloadStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            source,
            store,
            settings,
        }
    }

    /// Runs a source call under the per-call timeout.
    pub async fn call<T, F>(&self, fut: F) -> Result<T, ChanfetchError>
    where
        F: Future<Output = Result<T, ChanfetchError>>,
    {
        let duration = self.settings.call_timeout;
        tokio::time::timeout(duration, fut)
            .await
            .map_err(|_| ChanfetchError::Timeout { duration })?
    }
}

/// Current wall-clock time as unix seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine construction and lifecycle.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chanfetch_core::{ChanfetchError, DownloadStore, ScanFilter, Source, SourceUpdate};

use crate::context::EngineContext;
use crate::registry::TaskRegistry;
use crate::scanner::Scanner;
use crate::settings::EngineSettings;
use crate::supervisor::{self, PassOutcome};
use crate::task::TaskState;

/// State shared by the supervisor loops and the control operations.
pub(crate) struct Shared {
    pub(crate) ctx: Arc<EngineContext>,
    pub(crate) registry: TaskRegistry,
    pub(crate) scanner: Scanner,
    wake_tx: mpsc::Sender<()>,
}

impl Shared {
    /// Requests an early reconciliation pass. Bursts collapse into one.
    pub(crate) fn wake(&self) {
        if self.wake_tx.try_send(()).is_err() {
            debug!("wakeup already pending");
        }
    }
}

/// The download engine: registry, scanner, and supervisor over an injected
/// source and store.
pub struct Engine {
    pub(crate) shared: Arc<Shared>,
    wake_rx: Mutex<Option<mpsc::Receiver<()>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(
        source: Arc<dyn Source>,
        store: Arc<dyn DownloadStore>,
        settings: EngineSettings,
    ) -> Self {
        let ctx = Arc::new(EngineContext::new(source, store, settings));
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            scanner: Scanner::new(Arc::clone(&ctx)),
            registry: TaskRegistry::new(),
            ctx,
            wake_tx,
        });
        Self {
            shared,
            wake_rx: Mutex::new(Some(wake_rx)),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.shared.registry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.shared.ctx.settings
    }

    /// Re-registers every download left active by a previous run.
    pub async fn resume(&self) -> Result<usize, ChanfetchError> {
        let ctx = &self.shared.ctx;
        let active = ctx.store.list_active().await?;
        let guard = self.shared.registry.lock_admission().await;
        let mut resumed = 0;
        for row in &active {
            if guard.admit(Arc::new(TaskState::new(row, ctx.settings.max_download_error))) {
                resumed += 1;
            }
        }
        info!(resumed, "active downloads resumed");
        Ok(resumed)
    }

    /// Resumes active downloads, runs a full scan, and spawns the
    /// reconciliation and listener loops. Both stop when `cancel` fires.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), ChanfetchError> {
        let wake_rx = self
            .wake_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| ChanfetchError::Internal("engine already started".into()))?;
        let updates = self.shared.ctx.source.take_updates().ok_or_else(|| {
            ChanfetchError::Internal("source update stream already taken".into())
        })?;

        self.resume().await?;
        match self.shared.scanner.scan(ScanFilter::all()).await {
            Ok(created) => info!(created, "startup scan finished"),
            Err(err) => warn!(error = %err, "startup scan failed"),
        }

        let reconcile = tokio::spawn(supervisor::run_reconcile(
            Arc::clone(&self.shared),
            wake_rx,
            cancel.clone(),
        ));
        let listener = tokio::spawn(supervisor::run_listener(
            Arc::clone(&self.shared),
            updates,
            cancel,
        ));
        self.handles.lock().await.extend([reconcile, listener]);
        info!("engine started");
        Ok(())
    }

    /// Waits for the loops spawned by [`Engine::start`] to exit.
    pub async fn wait(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "supervisor loop panicked");
            }
        }
    }

    /// Runs one reconciliation pass on the caller's task.
    pub async fn reconcile_once(&self) -> PassOutcome {
        supervisor::reconcile_pass(&self.shared).await
    }

    /// Applies one push update on the caller's task.
    pub async fn handle_update(&self, update: SourceUpdate) {
        supervisor::handle_update(&self.shared, update).await;
    }

    /// Requests an early reconciliation pass.
    pub fn wake(&self) {
        self.shared.wake();
    }
}

// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `chanfetch serve` command implementation.
//!
//! Opens the SQLite store, connects the Telegram source to the same database,
//! and runs the engine next to the channel-post listener until a shutdown
//! signal arrives.

use std::sync::Arc;

use chanfetch_config::ChanfetchConfig;
use chanfetch_core::{ChanfetchError, DownloadStore, HealthStatus, PluginAdapter, Source};
use chanfetch_engine::{shutdown, Engine, EngineSettings};
use chanfetch_storage::SqliteStore;
use chanfetch_telegram::TelegramSource;
use tracing::{info, warn};

/// Store, source, and engine wired together.
pub(crate) struct Runtime {
    pub store: Arc<SqliteStore>,
    pub source: Arc<TelegramSource>,
    pub engine: Engine,
}

/// Opens and migrates the database.
pub(crate) async fn open_store(config: &ChanfetchConfig) -> Result<Arc<SqliteStore>, ChanfetchError> {
    let store = SqliteStore::new(config.storage.clone());
    store.initialize().await?;
    Ok(Arc::new(store))
}

/// Builds the full runtime. Requires `telegram.bot_token`.
pub(crate) async fn open_runtime(config: &ChanfetchConfig) -> Result<Runtime, ChanfetchError> {
    let settings = EngineSettings::from_config(config)?;
    let store = open_store(config).await?;
    let source = Arc::new(TelegramSource::new(
        &config.telegram,
        store.database()?.clone(),
    )?);
    let engine = Engine::new(
        Arc::clone(&source) as Arc<dyn Source>,
        Arc::clone(&store) as Arc<dyn DownloadStore>,
        settings,
    );
    Ok(Runtime {
        store,
        source,
        engine,
    })
}

/// Runs the `chanfetch serve` command.
pub async fn run_serve(config: ChanfetchConfig) -> Result<(), ChanfetchError> {
    info!("starting chanfetch serve");
    let runtime = open_runtime(&config).await?;

    match runtime.source.health_check().await? {
        HealthStatus::Healthy => info!("Telegram bot reachable"),
        HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => {
            warn!(reason = %reason, "Telegram bot not healthy, continuing anyway");
        }
    }

    let cancel = shutdown::install_signal_handler();
    let listener = runtime.source.spawn_listener(cancel.clone());
    runtime.engine.start(cancel.clone()).await?;
    info!(
        max_parallel = runtime.engine.settings().max_parallel_download,
        "chanfetch serve running"
    );

    runtime.engine.wait().await;
    if let Err(err) = listener.await {
        warn!(error = %err, "listener task panicked");
    }

    runtime.source.shutdown().await?;
    runtime.store.close().await?;
    info!("chanfetch serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chanfetch={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram channel source for chanfetch.
//!
//! Implements [`Source`] over the Telegram Bot API via teloxide. The bot is
//! added to the watched channels; a long-polling dispatcher records every
//! channel post into the post log and announces it on the update stream.
//! History is served from that log and files are streamed into the staging
//! directory.

pub mod flood;
pub mod handler;
pub mod posts;
mod transfer;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use teloxide::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chanfetch_config::model::TelegramConfig;
use chanfetch_core::{
    AdapterType, ChanfetchError, ChannelId, FileHandle, FileId, HealthStatus, MessageId,
    PluginAdapter, Source, SourceMessage, SourceUpdate,
};
use chanfetch_storage::Database;

use crate::posts::PostLog;
use crate::transfer::{staged_name, Transfers};

/// Capacity of the update stream handed to the engine.
const UPDATE_BUFFER: usize = 256;

/// Telegram source implementing [`Source`].
pub struct TelegramSource {
    bot: Bot,
    channels: Arc<Vec<i64>>,
    posts: PostLog,
    transfers: Arc<Transfers>,
    updates_tx: mpsc::Sender<SourceUpdate>,
    updates_rx: Mutex<Option<mpsc::Receiver<SourceUpdate>>>,
}

impl TelegramSource {
    /// Creates the source. Requires `config.bot_token` to be set.
    ///
    /// `db` must already be migrated; the post log shares it with the
    /// download store.
    pub fn new(config: &TelegramConfig, db: Database) -> Result<Self, ChanfetchError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            ChanfetchError::Config("telegram.bot_token is required for the Telegram source".into())
        })?;
        if token.is_empty() {
            return Err(ChanfetchError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }

        let bot = Bot::new(token);
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);
        let transfers = Arc::new(Transfers::new(
            bot.clone(),
            PathBuf::from(&config.staging_dir),
            config.max_flood_retries,
            updates_tx.clone(),
        ));
        Ok(Self {
            bot,
            channels: Arc::new(config.channels.clone()),
            posts: PostLog::new(db),
            transfers,
            updates_tx,
            updates_rx: Mutex::new(Some(updates_rx)),
        })
    }

    /// The post log backing history lookups.
    pub fn posts(&self) -> &PostLog {
        &self.posts
    }

    /// Starts long polling for channel posts. Runs until `cancel` fires.
    pub fn spawn_listener(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let bot = self.bot.clone();
        let posts = self.posts.clone();
        let channels = Arc::clone(&self.channels);
        let tx = self.updates_tx.clone();

        info!(channels = channels.len(), "starting Telegram long polling");
        tokio::spawn(async move {
            let handler = Update::filter_channel_post().endpoint(move |msg: Message| {
                let posts = posts.clone();
                let channels = Arc::clone(&channels);
                let tx = tx.clone();
                async move {
                    record_post(&posts, &channels, &tx, &msg).await;
                    respond(())
                }
            });

            let mut dispatcher = Dispatcher::builder(bot, handler)
                .default_handler(|_| async {})
                .build();
            tokio::select! {
                () = dispatcher.dispatch() => {}
                () = cancel.cancelled() => {}
            }
            info!("Telegram long polling stopped");
        })
    }
}

async fn record_post(
    posts: &PostLog,
    channels: &[i64],
    tx: &mpsc::Sender<SourceUpdate>,
    msg: &Message,
) {
    if !handler::is_channel(msg) || !handler::is_allowed(msg.chat.id.0, channels) {
        debug!(chat_id = msg.chat.id.0, "ignoring post from unwatched chat");
        return;
    }
    let post = handler::post_from_message(msg);
    if let Err(err) = posts.record(&post).await {
        warn!(
            channel_id = post.channel_id,
            message_id = post.message_id,
            error = %err,
            "failed to record channel post"
        );
        return;
    }
    let update = SourceUpdate::NewMessage {
        channel_id: post.channel_id,
        message_id: post.message_id,
    };
    if tx.send(update).await.is_err() {
        warn!("update stream closed, dropping channel post");
    }
}

#[async_trait]
impl PluginAdapter for TelegramSource {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Source
    }

    async fn health_check(&self) -> Result<HealthStatus, ChanfetchError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), ChanfetchError> {
        debug!("Telegram source shutting down");
        self.transfers.cancel_all().await
    }
}

#[async_trait]
impl Source for TelegramSource {
    async fn get_history(
        &self,
        channel_id: ChannelId,
        from_message_id: MessageId,
        limit: u32,
    ) -> Result<Vec<SourceMessage>, ChanfetchError> {
        self.posts.history(channel_id, from_message_id, limit).await
    }

    async fn get_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<SourceMessage, ChanfetchError> {
        self.posts
            .get(channel_id, message_id)
            .await?
            .ok_or_else(|| {
                ChanfetchError::source_msg(format!(
                    "message {message_id} of channel {channel_id} was never seen by the bot"
                ))
            })
    }

    async fn download_file(
        &self,
        file_id: &FileId,
        priority: i32,
    ) -> Result<FileHandle, ChanfetchError> {
        if let Some(state) = self.transfers.state(file_id)
            && (state.is_downloading_active || state.is_downloading_completed)
        {
            // Bot API transfers have no priority; a running one is left alone.
            debug!(%file_id, priority, "transfer already running");
            return Ok(state);
        }
        let (size, name) = self.posts.file_info(file_id).await?.ok_or_else(|| {
            ChanfetchError::source_msg(format!("file {file_id} is not in any recorded post"))
        })?;
        let staged = staged_name(file_id, name.as_deref());
        Ok(self.transfers.start(file_id.clone(), size, staged))
    }

    async fn get_file(&self, file_id: &FileId) -> Result<FileHandle, ChanfetchError> {
        if let Some(state) = self.transfers.state(file_id) {
            return Ok(state);
        }
        let (size, _) = self.posts.file_info(file_id).await?.ok_or_else(|| {
            ChanfetchError::source_msg(format!("file {file_id} is not in any recorded post"))
        })?;
        Ok(FileHandle::remote(file_id.clone(), size))
    }

    async fn cancel_download_file(&self, file_id: &FileId) -> Result<(), ChanfetchError> {
        self.transfers.cancel(file_id).await
    }

    async fn remove_file_from_downloads(&self, file_id: &FileId) -> Result<(), ChanfetchError> {
        self.transfers.remove(file_id).await
    }

    async fn remove_all_downloads(&self) -> Result<(), ChanfetchError> {
        self.transfers.remove_all().await
    }

    async fn clean_download_directory(&self) -> Result<(), ChanfetchError> {
        self.transfers.clean().await
    }

    fn take_updates(&self) -> Option<mpsc::Receiver<SourceUpdate>> {
        self.updates_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

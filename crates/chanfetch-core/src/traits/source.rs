// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Source adapter trait for channel platforms (Telegram, etc.).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChanfetchError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChannelId, FileHandle, FileId, MessageId, SourceMessage, SourceUpdate, VideoAttachment,
};

/// Adapter for the channel platform the engine watches and downloads from.
///
/// Calls may fail transiently (rate limiting, network) or permanently
/// (unknown message). Transfers run in the background on the source side;
/// their progress is observed through [`Source::get_file`] and the push stream.
#[async_trait]
pub trait Source: PluginAdapter {
    /// Returns up to `limit` messages of a channel, newest first, strictly older
    /// than `from_message_id`. `0` starts from the latest message.
    async fn get_history(
        &self,
        channel_id: ChannelId,
        from_message_id: MessageId,
        limit: u32,
    ) -> Result<Vec<SourceMessage>, ChanfetchError>;

    /// Looks up one message.
    async fn get_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<SourceMessage, ChanfetchError>;

    /// Extracts the video attachment of a message.
    fn video_attachment<'a>(&self, message: &'a SourceMessage) -> Option<&'a VideoAttachment> {
        message.video()
    }

    /// Starts (or re-prioritizes) a transfer and returns the current file state.
    async fn download_file(
        &self,
        file_id: &FileId,
        priority: i32,
    ) -> Result<FileHandle, ChanfetchError>;

    /// Returns the current file state without changing the transfer.
    async fn get_file(&self, file_id: &FileId) -> Result<FileHandle, ChanfetchError>;

    /// Stops an in-flight transfer.
    async fn cancel_download_file(&self, file_id: &FileId) -> Result<(), ChanfetchError>;

    /// Forgets a file and deletes its staged data.
    async fn remove_file_from_downloads(&self, file_id: &FileId) -> Result<(), ChanfetchError>;

    /// Forgets every tracked file.
    async fn remove_all_downloads(&self) -> Result<(), ChanfetchError>;

    /// Wipes the local staging directories.
    async fn clean_download_directory(&self) -> Result<(), ChanfetchError>;

    /// Hands out the push-update stream. There is exactly one; later calls
    /// return `None`.
    fn take_updates(&self) -> Option<mpsc::Receiver<SourceUpdate>>;
}

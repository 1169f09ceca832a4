// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the chanfetch engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Row identifier of an [`Item`].
pub type ItemId = i64;

/// Row identifier of a [`Download`].
pub type DownloadId = i64;

/// Identifier of a channel at the source.
pub type ChannelId = i64;

/// Identifier of a message within a channel.
pub type MessageId = i64;

/// Lowest transfer priority accepted from callers.
pub const MIN_PRIORITY: i32 = 1;

/// Highest transfer priority accepted from callers.
pub const MAX_PRIORITY: i32 = 32;

/// Source-side identifier of a remote file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub String);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Source,
    Store,
}

// --- Persisted records ---

/// A subscription rule scanning one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub channel_id: ChannelId,
    pub name: String,
    /// Regexp applied to captions; its capture groups feed both templates.
    pub regexp: String,
    /// Naming template for the target file, e.g. `ep$1`.
    pub pattern: String,
    /// Template whose expansion must equal `match_content` for a message to match.
    pub match_pattern: String,
    pub match_content: String,
    pub date_start: i64,
    /// Date of the most recent matched message. Never decreases.
    pub date_end: i64,
    /// Highest history message id already inspected. Never decreases.
    pub process: MessageId,
    pub priority: i32,
    pub target_path: String,
}

/// Fields needed to create an [`Item`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub channel_id: ChannelId,
    pub name: String,
    pub regexp: String,
    pub pattern: String,
    #[serde(default)]
    pub match_pattern: String,
    #[serde(default)]
    pub match_content: String,
    #[serde(default)]
    pub date_start: i64,
    pub priority: i32,
    pub target_path: String,
}

/// Partial update of an [`Item`]. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub regexp: Option<String>,
    pub pattern: Option<String>,
    pub match_pattern: Option<String>,
    pub match_content: Option<String>,
    pub target_path: Option<String>,
}

/// Lifecycle position of a [`Download`], derived from its three flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Waiting for admission.
    Queued,
    /// Admitted; a task owns it.
    Active,
    /// Terminal success.
    Completed,
    /// Terminal failure; only an explicit reset re-queues it.
    Fatal,
}

impl DownloadStatus {
    /// Maps `(downloading, downloaded, fatal_error)` to a status.
    ///
    /// Returns `None` for combinations that must never be persisted.
    pub fn from_flags(downloading: bool, downloaded: bool, fatal_error: bool) -> Option<Self> {
        match (downloading, downloaded, fatal_error) {
            (false, false, false) => Some(Self::Queued),
            (true, false, false) => Some(Self::Active),
            (false, true, false) => Some(Self::Completed),
            (false, true, true) => Some(Self::Fatal),
            _ => None,
        }
    }

    /// The `(downloading, downloaded, fatal_error)` flags written for this status.
    pub fn flags(self) -> (bool, bool, bool) {
        match self {
            Self::Queued => (false, false, false),
            Self::Active => (true, false, false),
            Self::Completed => (false, true, false),
            Self::Fatal => (false, true, true),
        }
    }

    /// Terminal states are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Fatal)
    }
}

/// One discovered media item tracked through its transfer lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    pub id: DownloadId,
    pub item_id: ItemId,
    pub msg_id: MessageId,
    /// Caption of the source message.
    pub text: String,
    pub size: i64,
    pub date: i64,
    pub priority: i32,
    pub downloading: bool,
    pub downloaded: bool,
    pub fatal_error: bool,
    pub error: String,
    pub error_at: i64,
}

impl Download {
    /// Status derived from the flags, or `None` if the row is corrupt.
    pub fn status(&self) -> Option<DownloadStatus> {
        DownloadStatus::from_flags(self.downloading, self.downloaded, self.fatal_error)
    }
}

/// Fields needed to insert a [`Download`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDownload {
    pub item_id: ItemId,
    pub msg_id: MessageId,
    pub text: String,
    pub size: i64,
    pub date: i64,
    pub priority: i32,
}

impl NewDownload {
    /// Builds a queued download from a video message. Non-video messages yield `None`.
    pub fn from_message(item_id: ItemId, priority: i32, message: &SourceMessage) -> Option<Self> {
        let video = message.video()?;
        Some(Self {
            item_id,
            msg_id: message.id,
            text: video.caption.clone(),
            size: video.file.size,
            date: message.date,
            priority,
        })
    }
}

/// A download row together with the channel of its owning item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedDownload {
    pub download: Download,
    pub channel_id: ChannelId,
}

/// Narrows a scan to a subset of items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanFilter {
    /// Only items whose watermark is still below this message id.
    pub processed_before: Option<MessageId>,
    /// Only items watching this channel.
    pub channel_id: Option<ChannelId>,
}

impl ScanFilter {
    /// Scan every eligible item.
    pub fn all() -> Self {
        Self::default()
    }

    /// Scan the items of one channel that have not yet seen `message_id`.
    pub fn for_new_message(channel_id: ChannelId, message_id: MessageId) -> Self {
        Self {
            processed_before: Some(message_id),
            channel_id: Some(channel_id),
        }
    }
}

// --- Source-side types ---

/// Snapshot of a remote file and its local transfer progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub id: FileId,
    pub size: i64,
    /// Staging path of the local copy; empty until a transfer starts.
    pub local_path: String,
    pub downloaded_size: i64,
    pub is_downloading_active: bool,
    pub is_downloading_completed: bool,
}

impl FileHandle {
    /// A file that has not been transferred at all.
    pub fn remote(id: FileId, size: i64) -> Self {
        Self {
            id,
            size,
            local_path: String::new(),
            downloaded_size: 0,
            is_downloading_active: false,
            is_downloading_completed: false,
        }
    }
}

/// The video attachment of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoAttachment {
    pub caption: String,
    pub file: FileHandle,
}

/// Content of a source message, reduced to what chanfetch distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageContent {
    Video(VideoAttachment),
    Text(String),
    Other,
}

/// A message in a channel's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    /// Unix timestamp, seconds.
    pub date: i64,
    pub content: MessageContent,
}

impl SourceMessage {
    /// The video attachment, if the message carries one.
    pub fn video(&self) -> Option<&VideoAttachment> {
        match &self.content {
            MessageContent::Video(video) => Some(video),
            _ => None,
        }
    }
}

/// An event on the source's push stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUpdate {
    /// Transfer progress or state change of a file.
    FileProgress(FileHandle),
    /// A new message was posted to a channel.
    NewMessage {
        channel_id: ChannelId,
        message_id: MessageId,
    },
}

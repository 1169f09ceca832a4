// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock source adapter for deterministic testing.
//!
//! `MockSource` implements [`Source`] over in-memory channels. Transfers never
//! progress on their own: a test finishes one with
//! [`MockSource::complete_file`], which writes the staged file, and can push
//! the resulting state through the update stream.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use chanfetch_core::{
    AdapterType, ChanfetchError, ChannelId, FileHandle, FileId, HealthStatus, MessageContent,
    MessageId, PluginAdapter, Source, SourceMessage, SourceUpdate, VideoAttachment,
};

/// Source operations that can fail on demand and are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceOp {
    GetHistory,
    GetMessage,
    DownloadFile,
    GetFile,
    CancelDownload,
    RemoveFile,
    RemoveAll,
    CleanDirectory,
}

#[derive(Default)]
struct State {
    channels: HashMap<ChannelId, BTreeMap<MessageId, SourceMessage>>,
    files: HashMap<FileId, FileHandle>,
    failures: HashMap<SourceOp, usize>,
    calls: HashMap<SourceOp, usize>,
    download_requests: Vec<(FileId, i32)>,
}

/// A scripted channel platform.
pub struct MockSource {
    state: Mutex<State>,
    staging: PathBuf,
    updates_tx: mpsc::Sender<SourceUpdate>,
    updates_rx: Mutex<Option<mpsc::Receiver<SourceUpdate>>>,
}

/// A video message with a single file.
pub fn video_message(
    channel_id: ChannelId,
    id: MessageId,
    date: i64,
    caption: &str,
    file_id: &str,
    size: i64,
) -> SourceMessage {
    SourceMessage {
        id,
        channel_id,
        date,
        content: MessageContent::Video(VideoAttachment {
            caption: caption.to_owned(),
            file: FileHandle::remote(FileId::from(file_id), size),
        }),
    }
}

/// A plain text message.
pub fn text_message(channel_id: ChannelId, id: MessageId, date: i64, text: &str) -> SourceMessage {
    SourceMessage {
        id,
        channel_id,
        date,
        content: MessageContent::Text(text.to_owned()),
    }
}

impl MockSource {
    /// Creates an empty source staging its files under `staging`.
    pub fn new(staging: impl Into<PathBuf>) -> Self {
        let (updates_tx, updates_rx) = mpsc::channel(64);
        Self {
            state: Mutex::new(State::default()),
            staging: staging.into(),
            updates_tx,
            updates_rx: Mutex::new(Some(updates_rx)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Posts a message to its channel and registers its video file, if any.
    pub fn add_message(&self, message: SourceMessage) {
        let mut state = self.state();
        if let Some(video) = message.video() {
            state
                .files
                .entry(video.file.id.clone())
                .or_insert_with(|| video.file.clone());
        }
        state
            .channels
            .entry(message.channel_id)
            .or_default()
            .insert(message.id, message);
    }

    /// Makes the next `times` calls of `op` fail with a source error.
    pub fn fail_next(&self, op: SourceOp, times: usize) {
        *self.state().failures.entry(op).or_default() += times;
    }

    /// Number of calls made to `op`, failed ones included.
    pub fn calls(&self, op: SourceOp) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Every `(file, priority)` passed to `download_file`, in order.
    pub fn download_requests(&self) -> Vec<(FileId, i32)> {
        self.state().download_requests.clone()
    }

    /// Current state of a file.
    pub fn file(&self, file_id: &FileId) -> Option<FileHandle> {
        self.state().files.get(file_id).cloned()
    }

    /// Finishes a transfer: writes `contents` into staging and marks the file
    /// completed. Returns the new state; it is not pushed.
    pub async fn complete_file(
        &self,
        file_id: &FileId,
        contents: &[u8],
    ) -> Result<FileHandle, ChanfetchError> {
        tokio::fs::create_dir_all(&self.staging)
            .await
            .map_err(|e| ChanfetchError::file(&self.staging, e))?;
        let path = self.staging.join(format!("{}.mp4", file_id.0));
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| ChanfetchError::file(&path, e))?;

        let mut state = self.state();
        let file = state
            .files
            .get_mut(file_id)
            .ok_or_else(|| ChanfetchError::source_msg(format!("unknown file {file_id}")))?;
        file.local_path = path.to_string_lossy().into_owned();
        file.downloaded_size = contents.len() as i64;
        file.is_downloading_active = false;
        file.is_downloading_completed = true;
        Ok(file.clone())
    }

    /// Sends an update through the push stream.
    pub async fn push(&self, update: SourceUpdate) -> Result<(), ChanfetchError> {
        self.updates_tx
            .send(update)
            .await
            .map_err(|_| ChanfetchError::source_msg("update stream closed"))
    }

    /// Counts the call and consumes one scripted failure, if any.
    fn enter(&self, op: SourceOp) -> Result<(), ChanfetchError> {
        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;
        match state.failures.get_mut(&op) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(ChanfetchError::source_msg(format!("injected {op:?} failure")))
            }
            _ => Ok(()),
        }
    }

    fn reset_file(state: &mut State, file_id: &FileId) -> Option<PathBuf> {
        let file = state.files.get_mut(file_id)?;
        let staged = (!file.local_path.is_empty()).then(|| PathBuf::from(&file.local_path));
        *file = FileHandle::remote(file.id.clone(), file.size);
        staged
    }
}

#[async_trait]
impl PluginAdapter for MockSource {
    fn name(&self) -> &str {
        "mock-source"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Source
    }

    async fn health_check(&self) -> Result<HealthStatus, ChanfetchError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ChanfetchError> {
        Ok(())
    }
}

#[async_trait]
impl Source for MockSource {
    async fn get_history(
        &self,
        channel_id: ChannelId,
        from_message_id: MessageId,
        limit: u32,
    ) -> Result<Vec<SourceMessage>, ChanfetchError> {
        self.enter(SourceOp::GetHistory)?;
        let state = self.state();
        let Some(channel) = state.channels.get(&channel_id) else {
            return Ok(Vec::new());
        };
        let upper = if from_message_id == 0 {
            MessageId::MAX
        } else {
            from_message_id
        };
        Ok(channel
            .range(..upper)
            .rev()
            .take(limit as usize)
            .map(|(_, message)| message.clone())
            .collect())
    }

    async fn get_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<SourceMessage, ChanfetchError> {
        self.enter(SourceOp::GetMessage)?;
        self.state()
            .channels
            .get(&channel_id)
            .and_then(|channel| channel.get(&message_id))
            .cloned()
            .ok_or_else(|| {
                ChanfetchError::source_msg(format!(
                    "message {message_id} not found in channel {channel_id}"
                ))
            })
    }

    async fn download_file(
        &self,
        file_id: &FileId,
        priority: i32,
    ) -> Result<FileHandle, ChanfetchError> {
        self.enter(SourceOp::DownloadFile)?;
        let mut state = self.state();
        state.download_requests.push((file_id.clone(), priority));
        let file = state
            .files
            .get_mut(file_id)
            .ok_or_else(|| ChanfetchError::source_msg(format!("unknown file {file_id}")))?;
        if !file.is_downloading_completed {
            file.is_downloading_active = true;
        }
        Ok(file.clone())
    }

    async fn get_file(&self, file_id: &FileId) -> Result<FileHandle, ChanfetchError> {
        self.enter(SourceOp::GetFile)?;
        self.file(file_id)
            .ok_or_else(|| ChanfetchError::source_msg(format!("unknown file {file_id}")))
    }

    async fn cancel_download_file(&self, file_id: &FileId) -> Result<(), ChanfetchError> {
        self.enter(SourceOp::CancelDownload)?;
        if let Some(file) = self.state().files.get_mut(file_id) {
            file.is_downloading_active = false;
        }
        Ok(())
    }

    async fn remove_file_from_downloads(&self, file_id: &FileId) -> Result<(), ChanfetchError> {
        self.enter(SourceOp::RemoveFile)?;
        let staged = Self::reset_file(&mut self.state(), file_id);
        if let Some(path) = staged {
            let _ = tokio::fs::remove_file(path).await;
        }
        Ok(())
    }

    async fn remove_all_downloads(&self) -> Result<(), ChanfetchError> {
        self.enter(SourceOp::RemoveAll)?;
        let mut state = self.state();
        let ids: Vec<FileId> = state.files.keys().cloned().collect();
        for id in &ids {
            Self::reset_file(&mut state, id);
        }
        Ok(())
    }

    async fn clean_download_directory(&self) -> Result<(), ChanfetchError> {
        self.enter(SourceOp::CleanDirectory)?;
        match tokio::fs::remove_dir_all(&self.staging).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ChanfetchError::file(&self.staging, err)),
        }
    }

    fn take_updates(&self) -> Option<mpsc::Receiver<SourceUpdate>> {
        self.updates_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> (tempfile::TempDir, MockSource) {
        let dir = tempfile::tempdir().unwrap();
        let source = MockSource::new(dir.path().join("staging"));
        for id in 1..=5 {
            source.add_message(video_message(-1, id, 1000 + id, &format!("S01E0{id}"), &format!("f{id}"), 10));
        }
        (dir, source)
    }

    #[tokio::test]
    async fn history_pages_newest_first() {
        let (_dir, source) = source();
        let first: Vec<_> = source.get_history(-1, 0, 2).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(first, vec![5, 4]);
        let next: Vec<_> = source.get_history(-1, 4, 2).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(next, vec![3, 2]);
        assert!(source.get_history(-2, 0, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let (_dir, source) = source();
        source.fail_next(SourceOp::GetMessage, 1);
        assert!(source.get_message(-1, 1).await.is_err());
        assert!(source.get_message(-1, 1).await.is_ok());
        assert_eq!(source.calls(SourceOp::GetMessage), 2);
    }

    #[tokio::test]
    async fn completed_file_is_staged() {
        let (_dir, source) = source();
        let id = FileId::from("f1");
        let active = source.download_file(&id, 7).await.unwrap();
        assert!(active.is_downloading_active);

        let done = source.complete_file(&id, b"data").await.unwrap();
        assert!(done.is_downloading_completed);
        assert_eq!(std::fs::read(&done.local_path).unwrap(), b"data");
        assert_eq!(source.download_requests(), vec![(id.clone(), 7)]);

        source.remove_file_from_downloads(&id).await.unwrap();
        assert!(!std::path::Path::new(&done.local_path).exists());
        assert!(!source.file(&id).unwrap().is_downloading_completed);
    }

    #[tokio::test]
    async fn update_stream_is_handed_out_once() {
        let (_dir, source) = source();
        let mut rx = source.take_updates().unwrap();
        assert!(source.take_updates().is_none());
        source
            .push(SourceUpdate::NewMessage { channel_id: -1, message_id: 6 })
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(SourceUpdate::NewMessage { message_id: 6, .. })));
    }
}

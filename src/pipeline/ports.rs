//! Collaborator interfaces consumed by the pipeline.
//!
//! The Telegram adapter in [`crate::bot`] implements these; tests use
//! mockall mocks or the fakes in `tests/`.

use super::error::{MediaError, SendError};
use crate::model::LiveMessage;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// Scoped media file handle.
///
/// The optional release hook runs exactly once when the handle is dropped,
/// so a branch that acquires a file releases it on every exit path.
pub struct MediaFile {
    file_name: String,
    data: Bytes,
    release: Option<ReleaseHook>,
}

impl MediaFile {
    /// Wraps downloaded or stored bytes.
    #[must_use]
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
            release: None,
        }
    }

    /// Attaches a hook that runs when the handle is released.
    #[must_use]
    pub fn with_release(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    /// File name presented to the destination.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// File contents.
    #[must_use]
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Returns `true` when the file has no contents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for MediaFile {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFile")
            .field("file_name", &self.file_name)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

/// The single log destination.
///
/// Implementations serialize sends so entries keep their order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Send an HTML-formatted text entry.
    async fn send_text(&self, text: &str) -> Result<(), SendError>;
    /// Send a file with the entry as caption, optionally replying to a message.
    async fn send_with_attachment(
        &self,
        text: &str,
        file: &MediaFile,
        reply_to: Option<i32>,
    ) -> Result<(), SendError>;
}

/// Fetches media of a live message from the platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LiveMediaSource: Send + Sync {
    /// Download the media attached to `message`.
    async fn fetch_live(&self, message: &LiveMessage) -> Result<MediaFile, MediaError>;
}

/// Fetches forward-protected or self-destructing media.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RestrictedMediaSource: Send + Sync {
    /// Prepare a sendable copy of restricted media.
    async fn prepare_restricted(&self, message: &LiveMessage) -> Result<MediaFile, MediaError>;
}

/// Resolves user and chat ids to display names.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MentionResolver: Send + Sync {
    /// Display name for `id`; callers degrade to the raw id on error.
    async fn resolve(&self, id: i64) -> anyhow::Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_release_runs_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let file = MediaFile::new("a.jpg", vec![1u8, 2, 3]).with_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(file.file_name(), "a.jpg");
        assert_eq!(file.data().len(), 3);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        drop(file);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}

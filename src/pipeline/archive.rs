use super::ports::LiveMediaSource;
use super::rules::FilterRules;
use crate::model::{ArchivedMessage, LiveMessage};
use crate::storage::{MessageStore, StorageError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Persists every observed message so later deletions can be reconstructed.
///
/// Runs before routing and ignores the forwarding rules except `ignored_ids`.
pub struct Archiver {
    store: Arc<dyn MessageStore>,
    media: Arc<dyn LiveMediaSource>,
    rules: Arc<FilterRules>,
    max_media_size: u32,
}

impl Archiver {
    /// Creates the archiver.
    #[must_use]
    pub fn new(
        store: Arc<dyn MessageStore>,
        media: Arc<dyn LiveMediaSource>,
        rules: Arc<FilterRules>,
        max_media_size: u32,
    ) -> Self {
        Self {
            store,
            media,
            rules,
            max_media_size,
        }
    }

    /// Saves or updates the record of `message`.
    ///
    /// An existing record keeps its creation time and media; only the text
    /// and edit time change. Media download failures are logged and the
    /// record is saved without media.
    ///
    /// # Errors
    ///
    /// Returns the store error when the record cannot be read or written.
    pub async fn archive(&self, message: &LiveMessage) -> Result<(), StorageError> {
        if self.rules.is_ignored(message) {
            debug!(message_id = message.id, "Not archiving ignored message");
            return Ok(());
        }

        if let Some(mut existing) = self.store.get(message.chat_id, message.id).await? {
            existing.apply_edit(message);
            debug!(
                message_id = message.id,
                chat_id = message.chat_id,
                "Updating archived message"
            );
            return self.store.save(&existing).await;
        }

        let media_ref = self.store_media(message).await;
        let record = ArchivedMessage::from_live(message, media_ref);
        self.store.save(&record).await?;
        debug!(
            message_id = message.id,
            chat_id = message.chat_id,
            has_media = record.media_ref.is_some(),
            "Archived message"
        );
        Ok(())
    }

    async fn store_media(&self, message: &LiveMessage) -> Option<String> {
        let media = message.media.as_ref()?;

        if let Some(size) = media.file_size.filter(|size| *size > self.max_media_size) {
            warn!(
                message_id = message.id,
                size,
                limit = self.max_media_size,
                "Media too large to archive"
            );
            return None;
        }

        let file = match self.media.fetch_live(message).await {
            Ok(file) => file,
            Err(e) => {
                warn!(message_id = message.id, error = %e, "Failed to download media for archive");
                return None;
            }
        };

        if file.is_empty() {
            warn!(message_id = message.id, "Downloaded media is empty");
            return None;
        }
        let limit = usize::try_from(self.max_media_size).unwrap_or(usize::MAX);
        if file.data().len() > limit {
            warn!(message_id = message.id, "Downloaded media exceeds size limit");
            return None;
        }

        match self
            .store
            .save_media(message.chat_id, message.id, file.data().clone())
            .await
        {
            Ok(media_ref) => Some(media_ref),
            Err(e) => {
                warn!(message_id = message.id, error = %e, "Failed to store media");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChatKind, MediaKind};
    use crate::pipeline::error::MediaError;
    use crate::pipeline::ports::{MediaFile, MockLiveMediaSource};
    use crate::storage::InMemoryStore;
    use crate::testing::{live_message, with_media};
    use chrono::TimeDelta;
    use std::collections::HashSet;

    const LIMIT: u32 = 1024 * 1024;

    fn archiver(store: Arc<InMemoryStore>, media: MockLiveMediaSource) -> Archiver {
        let rules = FilterRules {
            ignored_ids: HashSet::from([666]),
            ..FilterRules::default()
        };
        Archiver::new(store, Arc::new(media), Arc::new(rules), LIMIT)
    }

    #[tokio::test]
    async fn test_same_message_twice_yields_one_updated_record() -> Result<(), StorageError> {
        let store = Arc::new(InMemoryStore::new());
        let archiver = archiver(store.clone(), MockLiveMediaSource::new());

        let original = live_message(9, 42, ChatKind::Private, 42);
        archiver.archive(&original).await?;

        let mut edited = original.clone();
        edited.text = "hello, edited".to_string();
        edited.edit_date = Some(original.date + TimeDelta::minutes(2));
        edited.date = original.date + TimeDelta::hours(1);
        archiver.archive(&edited).await?;

        assert_eq!(store.len().await, 1);
        let record = store.get(42, 9).await?;
        let record = record.ok_or_else(|| StorageError::NotFound("record".into()))?;
        assert_eq!(record.text, "hello, edited");
        assert_eq!(record.edited_at, edited.edit_date);
        assert_eq!(record.created_at, original.date);
        Ok(())
    }

    #[tokio::test]
    async fn test_media_is_downloaded_and_kept_on_edit() -> Result<(), StorageError> {
        let store = Arc::new(InMemoryStore::new());
        let mut media = MockLiveMediaSource::new();
        media
            .expect_fetch_live()
            .times(1)
            .returning(|_| Ok(MediaFile::new("photo.jpg", vec![7u8; 16])));
        let archiver = archiver(store.clone(), media);

        let msg = with_media(live_message(3, -10, ChatKind::Group, 5), MediaKind::Photo);
        archiver.archive(&msg).await?;

        let mut edited = msg.clone();
        edited.text = "caption".to_string();
        archiver.archive(&edited).await?;

        let record = store
            .get(-10, 3)
            .await?
            .ok_or_else(|| StorageError::NotFound("record".into()))?;
        assert_eq!(record.media_kind, Some(MediaKind::Photo));
        assert_eq!(record.text, "caption");
        let media_ref = record.media_ref.unwrap_or_default();
        assert_eq!(store.load_media(&media_ref).await?.len(), 16);
        Ok(())
    }

    #[tokio::test]
    async fn test_download_failure_still_saves_text() -> Result<(), StorageError> {
        let store = Arc::new(InMemoryStore::new());
        let mut media = MockLiveMediaSource::new();
        media
            .expect_fetch_live()
            .returning(|_| Err(MediaError::Fetch("timeout".into())));
        let archiver = archiver(store.clone(), media);

        let msg = with_media(live_message(4, 42, ChatKind::Private, 42), MediaKind::Video);
        archiver.archive(&msg).await?;

        let record = store.get(42, 4).await?;
        assert!(record.is_some_and(|r| r.media_ref.is_none() && r.text == "hello"));
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_media_is_not_downloaded() -> Result<(), StorageError> {
        let store = Arc::new(InMemoryStore::new());
        let mut media = MockLiveMediaSource::new();
        media.expect_fetch_live().never();
        let archiver = archiver(store.clone(), media);

        let mut msg = with_media(live_message(5, 42, ChatKind::Private, 42), MediaKind::Document);
        if let Some(media) = msg.media.as_mut() {
            media.file_size = Some(LIMIT + 1);
        }
        archiver.archive(&msg).await?;
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_ignored_sender_is_not_archived() -> Result<(), StorageError> {
        let store = Arc::new(InMemoryStore::new());
        let archiver = archiver(store.clone(), MockLiveMediaSource::new());

        archiver
            .archive(&live_message(1, 666, ChatKind::Private, 666))
            .await?;
        assert!(store.is_empty().await);
        Ok(())
    }
}

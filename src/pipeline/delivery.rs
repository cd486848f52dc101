//! Media delivery with an ordered fallback chain.
//!
//! Each strategy acquires at most one [`MediaFile`] and drops it before the
//! next strategy runs. When every strategy fails the entry is sent as text
//! with a marker; a failure there is the only unrecoverable case.

use super::error::{MediaError, RelayError};
use super::format::annotate_media_missing;
use super::ports::{LiveMediaSource, LogSink, MediaFile, RestrictedMediaSource};
use crate::model::{ArchivedMessage, LiveMessage, MediaKind};
use crate::storage::MessageStore;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Message whose media should accompany the entry.
#[derive(Debug, Clone, Copy)]
pub enum DeliverySubject<'a> {
    /// Message from a live event.
    Live(&'a LiveMessage),
    /// Record read back from the archive.
    Archived(&'a ArchivedMessage),
}

impl DeliverySubject<'_> {
    const fn id(&self) -> i32 {
        match self {
            Self::Live(msg) => msg.id,
            Self::Archived(rec) => rec.id,
        }
    }

    const fn reply_to_id(&self) -> Option<i32> {
        match self {
            Self::Live(msg) => msg.reply_to_id,
            Self::Archived(rec) => rec.reply_to_id,
        }
    }
}

/// Result of delivering one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Sent as planned, with media when there was any.
    Sent,
    /// Media could not be attached; sent as text with a marker.
    SentTextOnly,
    /// Nothing reached the log chat.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// Archived sticker file, replying to the original's reply target.
    StoredSticker,
    /// Sticker downloaded from the platform.
    LiveSticker,
    /// Forward-protected media through the restricted source.
    Restricted,
    /// Archived media file.
    StoredMedia,
}

fn plan(subject: DeliverySubject<'_>) -> Vec<Strategy> {
    match subject {
        DeliverySubject::Live(msg) => match &msg.media {
            None => Vec::new(),
            Some(_) if msg.is_sticker() => vec![
                Strategy::StoredSticker,
                Strategy::LiveSticker,
                Strategy::StoredMedia,
            ],
            Some(_) if msg.is_restricted => vec![Strategy::Restricted, Strategy::StoredMedia],
            Some(_) => vec![Strategy::StoredMedia],
        },
        DeliverySubject::Archived(rec) => match rec.media_kind {
            None => Vec::new(),
            Some(MediaKind::Sticker) => vec![Strategy::StoredSticker],
            Some(_) => vec![Strategy::StoredMedia],
        },
    }
}

/// Sends entries to the log sink, attaching media when possible.
pub struct MediaDelivery {
    sink: Arc<dyn LogSink>,
    store: Arc<dyn MessageStore>,
    live: Arc<dyn LiveMediaSource>,
    restricted: Arc<dyn RestrictedMediaSource>,
}

impl MediaDelivery {
    /// Creates the delivery stage.
    #[must_use]
    pub fn new(
        sink: Arc<dyn LogSink>,
        store: Arc<dyn MessageStore>,
        live: Arc<dyn LiveMediaSource>,
        restricted: Arc<dyn RestrictedMediaSource>,
    ) -> Self {
        Self {
            sink,
            store,
            live,
            restricted,
        }
    }

    /// Delivers `text` with the subject's media, falling back step by step.
    pub async fn deliver(&self, text: &str, subject: DeliverySubject<'_>) -> DeliveryOutcome {
        let strategies = plan(subject);
        if strategies.is_empty() {
            return self.deliver_text(text).await;
        }

        for strategy in strategies {
            match self.attempt(strategy, text, subject).await {
                Ok(()) => {
                    debug!(message_id = subject.id(), ?strategy, "Entry sent with media");
                    return DeliveryOutcome::Sent;
                }
                Err(e) => {
                    warn!(
                        message_id = subject.id(),
                        ?strategy,
                        reason = %RelayError::MediaUnavailable(e.to_string()),
                        "Media delivery step failed, trying next"
                    );
                }
            }
        }

        match self.sink.send_text(&annotate_media_missing(text)).await {
            Ok(()) => DeliveryOutcome::SentTextOnly,
            Err(e) => {
                error!(
                    critical = true,
                    message_id = subject.id(),
                    reason = %RelayError::DestinationSendFailure(e.to_string()),
                    "Text fallback failed, log entry dropped"
                );
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }

    /// Sends a text-only entry.
    pub async fn deliver_text(&self, text: &str) -> DeliveryOutcome {
        match self.sink.send_text(text).await {
            Ok(()) => DeliveryOutcome::Sent,
            Err(e) => {
                error!(
                    critical = true,
                    reason = %RelayError::DestinationSendFailure(e.to_string()),
                    "Failed to send log entry"
                );
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }

    async fn attempt(
        &self,
        strategy: Strategy,
        text: &str,
        subject: DeliverySubject<'_>,
    ) -> Result<(), MediaError> {
        let (file, reply_to) = match strategy {
            Strategy::StoredSticker => (self.stored_file(subject).await?, subject.reply_to_id()),
            Strategy::StoredMedia => (self.stored_file(subject).await?, None),
            Strategy::LiveSticker => {
                let DeliverySubject::Live(msg) = subject else {
                    return Err(MediaError::NotLive);
                };
                (self.live.fetch_live(msg).await?, None)
            }
            Strategy::Restricted => {
                let DeliverySubject::Live(msg) = subject else {
                    return Err(MediaError::NotLive);
                };
                (self.restricted.prepare_restricted(msg).await?, None)
            }
        };

        if file.is_empty() {
            return Err(MediaError::Empty);
        }
        self.sink.send_with_attachment(text, &file, reply_to).await?;
        Ok(())
    }

    async fn stored_file(&self, subject: DeliverySubject<'_>) -> Result<MediaFile, MediaError> {
        let fetched;
        let record = match subject {
            DeliverySubject::Archived(rec) => rec,
            DeliverySubject::Live(msg) => {
                fetched = self
                    .store
                    .get(msg.chat_id, msg.id)
                    .await?
                    .ok_or(MediaError::NotStored(msg.id))?;
                &fetched
            }
        };

        let media_ref = record
            .media_ref
            .as_deref()
            .ok_or(MediaError::NotStored(record.id))?;
        let data = self.store.load_media(media_ref).await?;

        let file_name = record.file_name.clone().unwrap_or_else(|| {
            record
                .media_kind
                .unwrap_or(MediaKind::Other)
                .default_file_name()
                .to_string()
        });
        Ok(MediaFile::new(file_name, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChatKind;
    use crate::pipeline::error::SendError;
    use crate::pipeline::ports::{MockLiveMediaSource, MockLogSink, MockRestrictedMediaSource};
    use crate::storage::{MockMessageStore, StorageError};
    use crate::testing::{live_message, with_media};
    use bytes::Bytes;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn delivery(
        sink: MockLogSink,
        store: MockMessageStore,
        live: MockLiveMediaSource,
        restricted: MockRestrictedMediaSource,
    ) -> MediaDelivery {
        MediaDelivery::new(
            Arc::new(sink),
            Arc::new(store),
            Arc::new(live),
            Arc::new(restricted),
        )
    }

    fn stored_record(msg: &LiveMessage) -> ArchivedMessage {
        ArchivedMessage::from_live(msg, Some(format!("media/{}/{}", msg.chat_id, msg.id)))
    }

    #[test]
    fn test_plan_orders_strategies() {
        let sticker = with_media(live_message(1, 42, ChatKind::Private, 42), MediaKind::Sticker);
        assert_eq!(
            plan(DeliverySubject::Live(&sticker)),
            vec![
                Strategy::StoredSticker,
                Strategy::LiveSticker,
                Strategy::StoredMedia
            ]
        );

        let mut protected = with_media(live_message(2, 42, ChatKind::Private, 42), MediaKind::Photo);
        protected.is_restricted = true;
        assert_eq!(
            plan(DeliverySubject::Live(&protected)),
            vec![Strategy::Restricted, Strategy::StoredMedia]
        );

        let record = stored_record(&sticker);
        assert_eq!(
            plan(DeliverySubject::Archived(&record)),
            vec![Strategy::StoredSticker]
        );
        assert!(plan(DeliverySubject::Live(&live_message(3, 42, ChatKind::Private, 42))).is_empty());
    }

    #[tokio::test]
    async fn test_text_only_message() {
        let mut sink = MockLogSink::new();
        sink.expect_send_text()
            .with(eq("entry"))
            .times(1)
            .returning(|_| Ok(()));
        sink.expect_send_with_attachment().never();

        let msg = live_message(1, 42, ChatKind::Private, 42);
        let outcome = delivery(
            sink,
            MockMessageStore::new(),
            MockLiveMediaSource::new(),
            MockRestrictedMediaSource::new(),
        )
        .deliver("entry", DeliverySubject::Live(&msg))
        .await;

        assert_eq!(outcome, DeliveryOutcome::Sent);
    }

    #[tokio::test]
    async fn test_stored_photo_is_attached() {
        let msg = with_media(live_message(3, -10, ChatKind::Group, 5), MediaKind::Photo);
        let record = stored_record(&msg);

        let mut store = MockMessageStore::new();
        store
            .expect_get()
            .with(eq(-10), eq(3))
            .returning(move |_, _| Ok(Some(record.clone())));
        store
            .expect_load_media()
            .returning(|_| Ok(Bytes::from_static(b"jpeg")));

        let mut sink = MockLogSink::new();
        sink.expect_send_with_attachment()
            .withf(|text, file, reply_to| {
                text == "entry" && file.file_name() == "photo.jpg" && reply_to.is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        sink.expect_send_text().never();

        let outcome = delivery(
            sink,
            store,
            MockLiveMediaSource::new(),
            MockRestrictedMediaSource::new(),
        )
        .deliver("entry", DeliverySubject::Live(&msg))
        .await;

        assert_eq!(outcome, DeliveryOutcome::Sent);
    }

    #[tokio::test]
    async fn test_sticker_with_invalid_stored_file_falls_back_to_text() {
        let mut msg = with_media(live_message(4, 42, ChatKind::Private, 42), MediaKind::Sticker);
        msg.reply_to_id = Some(2);
        let record = stored_record(&msg);

        let mut store = MockMessageStore::new();
        store
            .expect_get()
            .returning(move |_, _| Ok(Some(record.clone())));
        store
            .expect_load_media()
            .times(2)
            .returning(|key| Err(StorageError::NotFound(key.to_string())));

        let mut live = MockLiveMediaSource::new();
        live.expect_fetch_live()
            .times(1)
            .returning(|_| Err(MediaError::Fetch("file is gone".into())));

        let mut sink = MockLogSink::new();
        sink.expect_send_with_attachment().never();
        sink.expect_send_text()
            .withf(|text| text.starts_with("entry") && text.contains("Media could not be attached"))
            .times(1)
            .returning(|_| Ok(()));

        let outcome = delivery(sink, store, live, MockRestrictedMediaSource::new())
            .deliver("entry", DeliverySubject::Live(&msg))
            .await;

        assert_eq!(outcome, DeliveryOutcome::SentTextOnly);
    }

    #[tokio::test]
    async fn test_sticker_falls_back_to_live_fetch() {
        let msg = with_media(live_message(8, 42, ChatKind::Private, 42), MediaKind::Sticker);
        let record = stored_record(&msg);

        let mut store = MockMessageStore::new();
        store
            .expect_get()
            .returning(move |_, _| Ok(Some(record.clone())));
        store
            .expect_load_media()
            .times(1)
            .returning(|key| Err(StorageError::NotFound(key.to_string())));

        let mut live = MockLiveMediaSource::new();
        live.expect_fetch_live()
            .times(1)
            .returning(|_| Ok(MediaFile::new("sticker.webp", vec![5u8; 4])));

        let mut sink = MockLogSink::new();
        sink.expect_send_with_attachment()
            .withf(|text, file, _| text == "entry" && file.file_name() == "sticker.webp")
            .times(1)
            .returning(|_, _, _| Ok(()));
        sink.expect_send_text().never();

        let outcome = delivery(sink, store, live, MockRestrictedMediaSource::new())
            .deliver("entry", DeliverySubject::Live(&msg))
            .await;

        assert_eq!(outcome, DeliveryOutcome::Sent);
    }

    #[tokio::test]
    async fn test_sticker_stored_file_replies_to_target() {
        let mut msg = with_media(live_message(4, 42, ChatKind::Private, 42), MediaKind::Sticker);
        msg.reply_to_id = Some(2);
        let record = stored_record(&msg);

        let mut store = MockMessageStore::new();
        store
            .expect_get()
            .returning(move |_, _| Ok(Some(record.clone())));
        store
            .expect_load_media()
            .returning(|_| Ok(Bytes::from_static(b"webp")));

        let mut sink = MockLogSink::new();
        sink.expect_send_with_attachment()
            .withf(|_, file, reply_to| file.file_name() == "sticker.webp" && *reply_to == Some(2))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let outcome = delivery(
            sink,
            store,
            MockLiveMediaSource::new(),
            MockRestrictedMediaSource::new(),
        )
        .deliver("entry", DeliverySubject::Live(&msg))
        .await;

        assert_eq!(outcome, DeliveryOutcome::Sent);
    }

    #[tokio::test]
    async fn test_restricted_file_is_released_when_send_fails() {
        let mut msg = with_media(live_message(5, 42, ChatKind::Private, 42), MediaKind::Photo);
        msg.is_restricted = true;

        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let mut restricted = MockRestrictedMediaSource::new();
        restricted
            .expect_prepare_restricted()
            .times(1)
            .returning(move |_| {
                let counter = counter.clone();
                Ok(MediaFile::new("secret.jpg", vec![1u8, 2]).with_release(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
            });

        let mut store = MockMessageStore::new();
        store.expect_get().returning(|_, _| Ok(None));

        let mut sink = MockLogSink::new();
        sink.expect_send_with_attachment()
            .times(1)
            .returning(|_, _, _| Err(SendError::Telegram("file rejected".into())));
        sink.expect_send_text().times(1).returning(|_| Ok(()));

        let outcome = delivery(sink, store, MockLiveMediaSource::new(), restricted)
            .deliver("entry", DeliverySubject::Live(&msg))
            .await;

        assert_eq!(outcome, DeliveryOutcome::SentTextOnly);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_failure_is_reported() {
        let msg = with_media(live_message(6, 42, ChatKind::Private, 42), MediaKind::Video);

        let mut store = MockMessageStore::new();
        store.expect_get().returning(|_, _| Ok(None));

        let mut sink = MockLogSink::new();
        sink.expect_send_text()
            .times(1)
            .returning(|_| Err(SendError::Telegram("chat not found".into())));

        let outcome = delivery(
            sink,
            store,
            MockLiveMediaSource::new(),
            MockRestrictedMediaSource::new(),
        )
        .deliver("entry", DeliverySubject::Live(&msg))
        .await;

        assert!(matches!(outcome, DeliveryOutcome::Failed(reason) if reason.contains("chat not found")));
    }

    #[tokio::test]
    async fn test_archived_media_is_attached() {
        let msg = with_media(live_message(7, -10, ChatKind::Group, 5), MediaKind::Voice);
        let record = stored_record(&msg);

        let mut store = MockMessageStore::new();
        store.expect_get().never();
        store
            .expect_load_media()
            .with(eq("media/-10/7"))
            .returning(|_| Ok(Bytes::from_static(b"ogg")));

        let mut sink = MockLogSink::new();
        sink.expect_send_with_attachment()
            .withf(|_, file, _| file.file_name() == "voicenote.ogg")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let outcome = delivery(
            sink,
            store,
            MockLiveMediaSource::new(),
            MockRestrictedMediaSource::new(),
        )
        .deliver("entry", DeliverySubject::Archived(&record))
        .await;

        assert_eq!(outcome, DeliveryOutcome::Sent);
    }
}

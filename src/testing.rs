//! Shared fixtures for unit tests.

use crate::model::{ArchivedMessage, ChatKind, LiveMedia, LiveMessage, MediaKind};
use crate::pipeline::ports::MockMentionResolver;
use chrono::{DateTime, TimeZone, Utc};

/// Fixed reference time: 2024-05-01 12:00:00 UTC.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Incoming text message without media.
pub fn live_message(id: i32, chat_id: i64, chat_kind: ChatKind, sender_id: i64) -> LiveMessage {
    LiveMessage {
        id,
        chat_id,
        chat_kind,
        sender_id,
        sender_is_bot: false,
        outgoing: false,
        text: "hello".to_string(),
        media: None,
        is_restricted: false,
        reply_to_id: None,
        date: fixed_time(),
        edit_date: None,
    }
}

/// Attaches media of `kind` to `message`.
pub fn with_media(mut message: LiveMessage, kind: MediaKind) -> LiveMessage {
    message.media = Some(LiveMedia {
        kind,
        file_id: format!("file-{}", message.id),
        file_name: None,
        file_size: Some(1024),
    });
    message
}

/// Archived record of an incoming text message.
pub fn archived_message(id: i32, chat_id: i64, chat_kind: ChatKind) -> ArchivedMessage {
    let sender_id = if chat_id > 0 { chat_id } else { 5 };
    ArchivedMessage::from_live(&live_message(id, chat_id, chat_kind, sender_id), None)
}

/// Resolver that names every id `User<id>`.
pub fn named_resolver() -> MockMentionResolver {
    let mut resolver = MockMentionResolver::new();
    resolver
        .expect_resolve()
        .returning(|id| Ok(format!("User{id}")));
    resolver
}

/// Resolver that fails for every id.
pub fn failing_resolver() -> MockMentionResolver {
    let mut resolver = MockMentionResolver::new();
    resolver
        .expect_resolve()
        .returning(|id| Err(anyhow::anyhow!("unknown peer {id}")));
    resolver
}

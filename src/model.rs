//! Core domain types.
//!
//! These types are platform-agnostic: the Telegram adapter converts teloxide
//! updates into [`RelayEvent`]s, and the storage layer persists
//! [`ArchivedMessage`] records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Offset Telegram adds to channel and supergroup ids (`-100…` prefix).
pub const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Kind of chat a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatKind {
    /// One-to-one conversation with a user or bot.
    Private,
    /// Basic group or supergroup.
    Group,
    /// Broadcast channel.
    Channel,
}

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    /// Photo.
    Photo,
    /// Video file.
    Video,
    /// GIF or silent video animation.
    Animation,
    /// Music or audio file.
    Audio,
    /// Voice note.
    Voice,
    /// Round video note.
    VideoNote,
    /// Generic document.
    Document,
    /// Sticker.
    Sticker,
    /// Anything the adapter cannot classify.
    Other,
}

impl MediaKind {
    /// Human-readable label used in log entries.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Photo => "Photo",
            Self::Video => "Video",
            Self::Animation => "Animation",
            Self::Audio => "Audio",
            Self::Voice => "Voice",
            Self::VideoNote => "Video note",
            Self::Document => "Document",
            Self::Sticker => "Sticker",
            Self::Other => "Media",
        }
    }

    /// File name used when the platform does not supply one.
    #[must_use]
    pub const fn default_file_name(self) -> &'static str {
        match self {
            Self::Photo => "photo.jpg",
            Self::Video | Self::VideoNote => "video.mp4",
            Self::Animation => "animation.mp4",
            Self::Audio => "audio.mp3",
            Self::Voice => "voicenote.ogg",
            Self::Sticker => "sticker.webp",
            Self::Document | Self::Other => "file.bin",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Media descriptor of a live message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveMedia {
    /// Media kind; `Sticker` drives the sticker delivery path.
    pub kind: MediaKind,
    /// Platform file handle used to download the media.
    pub file_id: String,
    /// File name, when the platform exposes one.
    pub file_name: Option<String>,
    /// Size in bytes, when known before download.
    pub file_size: Option<u32>,
}

/// A message as delivered by the platform, before archival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveMessage {
    /// Platform message id (unique per chat).
    pub id: i32,
    /// Chat the message was posted in.
    pub chat_id: i64,
    /// Kind of that chat.
    pub chat_kind: ChatKind,
    /// User (or sender chat) that authored the message.
    pub sender_id: i64,
    /// Whether the author is a bot account.
    pub sender_is_bot: bool,
    /// Sent by the logged account itself rather than received.
    pub outgoing: bool,
    /// Text or caption; empty when the message has neither.
    pub text: String,
    /// Attached media.
    pub media: Option<LiveMedia>,
    /// Content is forward-protected or self-destructing.
    pub is_restricted: bool,
    /// Message this one replies to.
    pub reply_to_id: Option<i32>,
    /// Creation time.
    pub date: DateTime<Utc>,
    /// Last edit time.
    pub edit_date: Option<DateTime<Utc>>,
}

impl LiveMessage {
    /// Returns `true` when the attached media is a sticker.
    #[must_use]
    pub fn is_sticker(&self) -> bool {
        self.media
            .as_ref()
            .is_some_and(|media| media.kind == MediaKind::Sticker)
    }
}

/// Durable record of an observed message.
///
/// `(id, chat_id)` identifies one logical message. The record is created on
/// first observation and only `text`/`edited_at` change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedMessage {
    /// Platform message id.
    pub id: i32,
    /// Chat the message was posted in.
    pub chat_id: i64,
    /// Kind of that chat.
    pub chat_kind: ChatKind,
    /// Author id.
    pub sender_id: i64,
    /// Whether the author is a bot account.
    #[serde(default)]
    pub sender_is_bot: bool,
    /// Latest known text.
    pub text: String,
    /// Opaque handle to stored media.
    pub media_ref: Option<String>,
    /// Kind of the stored media.
    pub media_kind: Option<MediaKind>,
    /// File name of the stored media.
    #[serde(default)]
    pub file_name: Option<String>,
    /// Content is forward-protected or self-destructing.
    pub is_restricted: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last edit time.
    pub edited_at: Option<DateTime<Utc>>,
    /// Message this one replies to.
    pub reply_to_id: Option<i32>,
}

impl ArchivedMessage {
    /// Builds the first record for a live message.
    #[must_use]
    pub fn from_live(message: &LiveMessage, media_ref: Option<String>) -> Self {
        let media = message.media.as_ref();
        Self {
            id: message.id,
            chat_id: message.chat_id,
            chat_kind: message.chat_kind,
            sender_id: message.sender_id,
            sender_is_bot: message.sender_is_bot,
            text: message.text.clone(),
            media_ref,
            media_kind: media.map(|m| m.kind),
            file_name: media.and_then(|m| m.file_name.clone()),
            is_restricted: message.is_restricted,
            created_at: message.date,
            edited_at: message.edit_date,
            reply_to_id: message.reply_to_id,
        }
    }

    /// Applies an edit event: only the text and edit time change.
    pub fn apply_edit(&mut self, message: &LiveMessage) {
        self.text.clone_from(&message.text);
        self.edited_at = message.edit_date.or(self.edited_at);
    }

    /// Time of the most recent version of this record.
    #[must_use]
    pub fn last_touched(&self) -> DateTime<Utc> {
        self.edited_at.unwrap_or(self.created_at)
    }
}

/// Peer reference carried by deletion events that lack a chat id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRef {
    /// Private chat with a user.
    User(i64),
    /// Basic group, bare (positive) id.
    Chat(i64),
    /// Channel or supergroup, bare (positive) id.
    Channel(i64),
}

impl PeerRef {
    /// Converts the peer into a signed chat id.
    ///
    /// Channels map to `-100<id>`, basic groups to `-<id>`. User peers yield
    /// `None`: the deletion is treated as coming from an unknown chat.
    #[must_use]
    pub const fn chat_id(self) -> Option<i64> {
        match self {
            Self::Channel(id) if id > 0 => Some(-(CHANNEL_ID_OFFSET + id)),
            Self::Channel(id) => Some(id),
            Self::Chat(id) if id > 0 => Some(-id),
            Self::Chat(id) => Some(id),
            Self::User(_) => None,
        }
    }
}

/// Deletion of one or more messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionEvent {
    /// Deleted message ids.
    pub message_ids: Vec<i32>,
    /// Chat id, when the platform supplies it.
    pub chat_id: Option<i64>,
    /// Peer reference used when `chat_id` is absent.
    pub peer: Option<PeerRef>,
}

impl DeletionEvent {
    /// Resolves the chat the deletion happened in, if it can be known.
    #[must_use]
    pub fn resolved_chat_id(&self) -> Option<i64> {
        self.chat_id.or_else(|| self.peer.and_then(PeerRef::chat_id))
    }
}

/// Inbound event handled by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A message was posted.
    NewMessage(LiveMessage),
    /// A message was edited.
    EditedMessage(LiveMessage),
    /// One or more messages were deleted.
    DeletedMessage(DeletionEvent),
}

/// Bare id used in `https://t.me/c/<id>/<msg>` links for `-100…` chats.
#[must_use]
pub const fn channel_link_id(chat_id: i64) -> Option<i64> {
    if chat_id <= -CHANNEL_ID_OFFSET {
        Some(-chat_id - CHANNEL_ID_OFFSET)
    } else {
        None
    }
}

//! Conversion from teloxide updates to pipeline events.

use crate::model::{ChatKind, DeletionEvent, LiveMedia, LiveMessage, MediaKind};
use teloxide::types::{BusinessMessagesDeleted, Chat, FileMeta, Message};

/// Kind of the chat a message was posted in.
#[must_use]
pub fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Group
    }
}

/// Author of a message: the user, else the chat it was sent on behalf of.
#[must_use]
pub fn sender_id(msg: &Message) -> i64 {
    msg.from
        .as_ref()
        .map(|user| user.id.0.cast_signed())
        .or_else(|| msg.sender_chat.as_ref().map(|chat| chat.id.0))
        .unwrap_or(msg.chat.id.0)
}

fn media_of(msg: &Message) -> Option<LiveMedia> {
    fn from_meta(kind: MediaKind, file: &FileMeta, file_name: Option<&String>) -> LiveMedia {
        LiveMedia {
            kind,
            file_id: file.id.0.clone(),
            file_name: file_name.cloned(),
            file_size: Some(file.size),
        }
    }

    if let Some(sticker) = msg.sticker() {
        return Some(from_meta(MediaKind::Sticker, &sticker.file, None));
    }
    if let Some(photo) = msg.photo().and_then(<[_]>::last) {
        return Some(from_meta(MediaKind::Photo, &photo.file, None));
    }
    if let Some(animation) = msg.animation() {
        return Some(from_meta(
            MediaKind::Animation,
            &animation.file,
            animation.file_name.as_ref(),
        ));
    }
    if let Some(video) = msg.video() {
        return Some(from_meta(MediaKind::Video, &video.file, video.file_name.as_ref()));
    }
    if let Some(video_note) = msg.video_note() {
        return Some(from_meta(MediaKind::VideoNote, &video_note.file, None));
    }
    if let Some(voice) = msg.voice() {
        return Some(from_meta(MediaKind::Voice, &voice.file, None));
    }
    if let Some(audio) = msg.audio() {
        return Some(from_meta(MediaKind::Audio, &audio.file, audio.file_name.as_ref()));
    }
    if let Some(doc) = msg.document() {
        return Some(from_meta(MediaKind::Document, &doc.file, doc.file_name.as_ref()));
    }
    None
}

/// Converts a teloxide message into the pipeline's view of it.
///
/// In a private chat the chat id is the peer's user id, so a message whose
/// author differs from the chat is one the account itself sent.
#[must_use]
pub fn live_message(msg: &Message) -> LiveMessage {
    let kind = chat_kind(&msg.chat);
    let sender_id = sender_id(msg);
    let sender_is_bot = msg.from.as_ref().is_some_and(|user| user.is_bot);

    LiveMessage {
        id: msg.id.0,
        chat_id: msg.chat.id.0,
        chat_kind: kind,
        sender_id,
        sender_is_bot,
        outgoing: kind == ChatKind::Private && sender_id != msg.chat.id.0,
        text: msg
            .text()
            .or_else(|| msg.caption())
            .unwrap_or_default()
            .to_string(),
        media: media_of(msg),
        is_restricted: msg.has_protected_content(),
        reply_to_id: msg.reply_to_message().map(|reply| reply.id.0),
        date: msg.date,
        edit_date: msg.edit_date().copied(),
    }
}

/// Converts a business-account deletion notice.
#[must_use]
pub fn deletion_event(deleted: &BusinessMessagesDeleted) -> DeletionEvent {
    DeletionEvent {
        message_ids: deleted.message_ids.iter().map(|id| id.0).collect(),
        chat_id: Some(deleted.chat.id.0),
        peer: None,
    }
}

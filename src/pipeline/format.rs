//! HTML log entries for the log chat.

use super::ports::MentionResolver;
use super::rate_limit::RateLimitConfig;
use crate::model::{channel_link_id, ArchivedMessage, ChatKind, LiveMessage, MediaKind};
use chrono::{DateTime, Utc};
use html_escape::encode_text;
use std::sync::Arc;
use tracing::debug;

/// Longest message body, in characters, before truncation.
pub const BODY_CHAR_LIMIT: usize = 3500;

const TRUNCATION_MARKER: &str = "<i>… (message truncated)</i>";
const EMPTY_BODY: &str = "<i>[no text]</i>";
const MEDIA_MISSING_MARKER: &str = "⚠️ <i>Media could not be attached</i>";
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Kind of log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A message was posted.
    New,
    /// A message was edited.
    Edited,
    /// A message was deleted.
    Deleted,
}

impl EntryKind {
    const fn header(self) -> &'static str {
        match self {
            Self::New => "✉️ <b>New message</b>",
            Self::Edited => "✏️ <b>Edited message</b>",
            Self::Deleted => "🗑️ <b>Deleted message</b>",
        }
    }
}

/// Message an entry describes.
#[derive(Debug, Clone, Copy)]
pub enum EntrySource<'a> {
    /// Message from the live event.
    Live(&'a LiveMessage),
    /// Record read back from the archive.
    Archived(&'a ArchivedMessage),
}

struct EntryFields<'a> {
    id: i32,
    chat_id: i64,
    chat_kind: ChatKind,
    sender_id: i64,
    text: &'a str,
    created_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
    reply_to_id: Option<i32>,
    media: Option<(MediaKind, Option<&'a str>)>,
}

impl<'a> From<EntrySource<'a>> for EntryFields<'a> {
    fn from(source: EntrySource<'a>) -> Self {
        match source {
            EntrySource::Live(msg) => Self {
                id: msg.id,
                chat_id: msg.chat_id,
                chat_kind: msg.chat_kind,
                sender_id: msg.sender_id,
                text: &msg.text,
                created_at: msg.date,
                edited_at: msg.edit_date,
                reply_to_id: msg.reply_to_id,
                media: msg
                    .media
                    .as_ref()
                    .map(|m| (m.kind, m.file_name.as_deref())),
            },
            EntrySource::Archived(rec) => Self {
                id: rec.id,
                chat_id: rec.chat_id,
                chat_kind: rec.chat_kind,
                sender_id: rec.sender_id,
                text: &rec.text,
                created_at: rec.created_at,
                edited_at: rec.edited_at,
                reply_to_id: rec.reply_to_id,
                media: rec.media_kind.map(|kind| (kind, rec.file_name.as_deref())),
            },
        }
    }
}

/// Builds log entries. Mention lookups that fail degrade to the raw id.
pub struct Formatter {
    mentions: Arc<dyn MentionResolver>,
}

impl Formatter {
    /// Creates a formatter using `mentions` for display names.
    #[must_use]
    pub fn new(mentions: Arc<dyn MentionResolver>) -> Self {
        Self { mentions }
    }

    /// Formats one entry.
    ///
    /// `is_deleted` suppresses the edit timestamp.
    pub async fn format(
        &self,
        kind: EntryKind,
        source: EntrySource<'_>,
        is_deleted: bool,
    ) -> String {
        let entry = EntryFields::from(source);

        let mut out = String::from(kind.header());
        if entry.chat_kind != ChatKind::Private {
            out.push(' ');
            out.push_str(&self.mention(entry.chat_id, entry.id).await);
        }
        out.push_str("\n<b>From:</b> ");
        out.push_str(&self.mention(entry.sender_id, entry.id).await);

        out.push_str("\n\n");
        if entry.text.is_empty() {
            out.push_str(EMPTY_BODY);
        } else {
            let (body, truncated) = truncate_body(entry.text, BODY_CHAR_LIMIT);
            if truncated {
                debug!(message_id = entry.id, "Message body truncated");
            }
            out.push_str(&body);
        }
        out.push('\n');

        out.push_str(&format!("\n<b>Message ID:</b> <code>{}</code>", entry.id));
        if let Some(reply_to) = entry.reply_to_id {
            out.push_str(&format!("\n<b>Reply to:</b> <code>{reply_to}</code>"));
            out.push_str(&reply_link(entry.chat_id, reply_to));
        }
        out.push_str(&format!(
            "\n<b>Date:</b> {}",
            entry.created_at.format(DATE_FORMAT)
        ));
        if let Some(edited) = entry.edited_at.filter(|_| !is_deleted) {
            out.push_str(&format!("\n<b>Edited:</b> {}", edited.format(DATE_FORMAT)));
        }
        if let Some((media_kind, file_name)) = entry.media {
            out.push_str(&format!("\n<b>Media:</b> {media_kind}"));
            if let Some(name) = file_name {
                out.push_str(&format!(" ({})", encode_text(name)));
            }
        }

        out
    }

    /// Entry for a deletion whose content is not in the archive.
    pub async fn format_unknown_deletion(&self, chat_id: Option<i64>, message_id: i32) -> String {
        let subject = match chat_id {
            Some(chat_id) => format!(
                "Message <code>{message_id}</code> in {}",
                self.mention(chat_id, message_id).await
            ),
            None => format!("Message <code>{message_id}</code>"),
        };
        format!(
            "🗑️ <b>Deleted message (content unknown)</b>\n\n{subject} was deleted, \
             but its original content is not in the archive."
        )
    }

    /// Mention for a user (positive id) or a chat (negative id).
    async fn mention(&self, id: i64, message_id: i32) -> String {
        let name = match self.mentions.resolve(id).await {
            Ok(name) => name,
            Err(e) => {
                debug!(id, error = %e, "Mention lookup failed, using raw id");
                return format!("<code>{id}</code>");
            }
        };
        let name = encode_text(&name);

        if id > 0 {
            return format!("<a href=\"tg://user?id={id}\">{name}</a>");
        }
        match channel_link_id(id) {
            Some(link_id) => format!("<a href=\"https://t.me/c/{link_id}/{message_id}\">{name}</a>"),
            None => format!("<b>{name}</b>"),
        }
    }
}

fn reply_link(chat_id: i64, reply_to: i32) -> String {
    match channel_link_id(chat_id) {
        Some(link_id) => format!(" <a href=\"https://t.me/c/{link_id}/{reply_to}\">original</a>"),
        None if chat_id < 0 => " (basic group)".to_string(),
        None => String::new(),
    }
}

/// Escapes `text` for HTML, cutting it so the escaped body has at most
/// `limit` characters. Entities are never split. Returns the body and whether
/// it was truncated.
#[must_use]
pub fn truncate_body(text: &str, limit: usize) -> (String, bool) {
    let mut width = 0;
    for (pos, ch) in text.char_indices() {
        width += escaped_width(ch);
        if width > limit {
            return (
                format!("{}\n{TRUNCATION_MARKER}", encode_text(&text[..pos])),
                true,
            );
        }
    }
    (encode_text(text).into_owned(), false)
}

/// Characters `ch` occupies after `encode_text`.
const fn escaped_width(ch: char) -> usize {
    match ch {
        '&' => "&amp;".len(),
        '<' | '>' => "&lt;".len(),
        _ => 1,
    }
}

/// Notice sent once when deletion logging pauses.
#[must_use]
pub fn pause_notice(config: &RateLimitConfig, until: DateTime<Utc>) -> String {
    format!(
        "⚠️ <b>Deletion logging paused</b>\n\nMore than {} deletions within {} seconds. \
         Deletions are not logged until {}.",
        config.threshold,
        config.window.num_seconds(),
        until.format(DATE_FORMAT)
    )
}

/// Appends the marker used when an entry goes out without its media.
#[must_use]
pub fn annotate_media_missing(text: &str) -> String {
    format!("{text}\n\n{MEDIA_MISSING_MARKER}")
}

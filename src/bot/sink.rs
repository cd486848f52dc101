//! Log chat sender.

use crate::config::{TELEGRAM_CAPTION_LIMIT, TELEGRAM_MESSAGE_LIMIT};
use crate::pipeline::error::SendError;
use crate::pipeline::ports::{LogSink, MediaFile};
use crate::utils::{retry_telegram_operation, truncate_str};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, MessageId, ParseMode, ReplyParameters};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const OVERFLOW_MARKER: &str = "\n\n<i>(truncated)</i>";

/// Sends log entries to one chat, one request sequence at a time.
///
/// Entries are HTML. A caption over the platform limit is sent as the file
/// followed by a separate text message.
pub struct TelegramLogSink {
    bot: Bot,
    chat_id: ChatId,
    order: Mutex<()>,
}

impl TelegramLogSink {
    /// Creates a sink writing to `chat_id`.
    #[must_use]
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self {
            bot,
            chat_id,
            order: Mutex::new(()),
        }
    }

    async fn send_message(&self, text: &str) -> Result<(), SendError> {
        let text = fit_message(text);
        retry_telegram_operation(|| async {
            self.bot
                .send_message(self.chat_id, text.clone())
                .parse_mode(ParseMode::Html)
                .await
                .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
        })
        .await
        .map(|_| ())
        .map_err(|e| SendError::Telegram(e.to_string()))
    }

    async fn send_document(
        &self,
        caption: Option<&str>,
        file: &MediaFile,
        reply_to: Option<i32>,
    ) -> Result<(), SendError> {
        retry_telegram_operation(|| async {
            let input = InputFile::memory(file.data().to_vec()).file_name(file.file_name().to_string());
            let mut req = self.bot.send_document(self.chat_id, input);
            if let Some(caption) = caption {
                req = req.caption(caption).parse_mode(ParseMode::Html);
            }
            if let Some(reply_to) = reply_to {
                req = req.reply_parameters(
                    ReplyParameters::new(MessageId(reply_to)).allow_sending_without_reply(),
                );
            }
            req.await
                .map_err(|e| anyhow::anyhow!("Telegram document error: {e}"))
        })
        .await
        .map(|_| ())
        .map_err(|e| SendError::Telegram(e.to_string()))
    }
}

#[async_trait]
impl LogSink for TelegramLogSink {
    async fn send_text(&self, text: &str) -> Result<(), SendError> {
        let _order = self.order.lock().await;
        self.send_message(text).await
    }

    async fn send_with_attachment(
        &self,
        text: &str,
        file: &MediaFile,
        reply_to: Option<i32>,
    ) -> Result<(), SendError> {
        let _order = self.order.lock().await;

        if fits_caption(text) {
            return self.send_document(Some(text), file, reply_to).await;
        }

        debug!(
            file_name = file.file_name(),
            "Caption too long, sending file and text separately"
        );
        self.send_document(None, file, reply_to).await?;
        if let Err(e) = self.send_message(text).await {
            warn!(error = %e, "File sent but its log text failed");
            return Err(e);
        }
        Ok(())
    }
}

fn fits_caption(text: &str) -> bool {
    text.chars().count() <= TELEGRAM_CAPTION_LIMIT
}

/// Cuts `text` to the message limit, marking the cut.
fn fit_message(text: &str) -> String {
    if text.chars().count() <= TELEGRAM_MESSAGE_LIMIT {
        return text.to_string();
    }
    warn!(
        length = text.chars().count(),
        "Log entry too long, sending truncated version"
    );
    let keep = TELEGRAM_MESSAGE_LIMIT - OVERFLOW_MARKER.chars().count();
    format!("{}{OVERFLOW_MARKER}", html_prefix(text, keep))
}

/// Longest prefix of `text` that fits in `budget` characters once its open
/// tags are closed. The cut falls outside any tag or entity.
fn html_prefix(text: &str, budget: usize) -> String {
    let closers_len = |open: &[&str]| open.iter().map(|tag| tag.len() + 3).sum::<usize>();

    let mut open: Vec<&str> = Vec::new();
    let mut best: (usize, Vec<&str>) = (0, Vec::new());
    let mut used = 0;
    let mut tag_start: Option<usize> = None;
    let mut in_entity = false;

    for (pos, ch) in text.char_indices() {
        if tag_start.is_none() && !in_entity {
            if used + closers_len(&open) > budget {
                break;
            }
            best = (pos, open.clone());
        }
        used += 1;

        match ch {
            '<' if tag_start.is_none() => tag_start = Some(pos),
            '>' => {
                if let Some(start) = tag_start.take() {
                    let tag = &text[start + 1..pos];
                    if tag.starts_with('/') {
                        open.pop();
                    } else {
                        open.push(tag.split_whitespace().next().unwrap_or(tag));
                    }
                }
            }
            '&' if tag_start.is_none() => in_entity = true,
            ';' => in_entity = false,
            _ => {}
        }
    }
    if tag_start.is_none() && !in_entity && used + closers_len(&open) <= budget {
        best = (text.len(), open);
    }

    let (cut, still_open) = best;
    let mut out = text[..cut].to_string();
    for tag in still_open.iter().rev() {
        out.push_str(&format!("</{tag}>"));
    }
    out
}

//! Media downloads through the Bot API.

use crate::model::LiveMessage;
use crate::pipeline::error::MediaError;
use crate::pipeline::ports::{LiveMediaSource, MediaFile, RestrictedMediaSource};
use crate::utils::retry_telegram_operation;
use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::{debug, info};

/// Downloads message media with `get_file` + `download_file`.
///
/// Bot API file downloads are not subject to forward protection, so the same
/// path serves protected media.
pub struct TelegramMediaFetcher {
    bot: Bot,
    max_size: u32,
}

impl TelegramMediaFetcher {
    /// Creates a fetcher that refuses files above `max_size` bytes.
    #[must_use]
    pub fn new(bot: Bot, max_size: u32) -> Self {
        Self { bot, max_size }
    }

    async fn download(&self, msg: &LiveMessage) -> Result<MediaFile, MediaError> {
        let media = msg
            .media
            .as_ref()
            .ok_or_else(|| MediaError::Fetch(format!("message {} has no media", msg.id)))?;

        if let Some(size) = media.file_size.filter(|size| *size > self.max_size) {
            return Err(MediaError::TooLarge {
                size,
                limit: self.max_size,
            });
        }

        let file_id = FileId(media.file_id.clone());
        let buffer = retry_telegram_operation(|| async {
            let file = self.bot.get_file(file_id.clone()).await?;
            let mut buf = Vec::new();
            self.bot.download_file(&file.path, &mut buf).await?;
            Ok::<_, anyhow::Error>(buf)
        })
        .await
        .map_err(|e| MediaError::Fetch(e.to_string()))?;

        if buffer.is_empty() {
            return Err(MediaError::Empty);
        }

        let file_name = media
            .file_name
            .clone()
            .unwrap_or_else(|| media.kind.default_file_name().to_string());
        info!(
            message_id = msg.id,
            kind = %media.kind,
            size = buffer.len(),
            "Downloaded media from Telegram"
        );

        let message_id = msg.id;
        Ok(MediaFile::new(file_name, buffer).with_release(move || {
            debug!(message_id, "Released downloaded media");
        }))
    }
}

#[async_trait]
impl LiveMediaSource for TelegramMediaFetcher {
    async fn fetch_live(&self, message: &LiveMessage) -> Result<MediaFile, MediaError> {
        self.download(message).await
    }
}

#[async_trait]
impl RestrictedMediaSource for TelegramMediaFetcher {
    async fn prepare_restricted(&self, message: &LiveMessage) -> Result<MediaFile, MediaError> {
        debug!(message_id = message.id, "Fetching protected media");
        self.download(message).await
    }
}

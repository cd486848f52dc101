//! Display names learned from observed traffic.
//!
//! The Bot API cannot look up arbitrary users, so mentions are resolved from
//! names seen on recent updates. Unknown ids fail and the formatter falls
//! back to the raw id.

use crate::config::{NAME_CACHE_MAX_SIZE, NAME_CACHE_TTL_SECS};
use crate::pipeline::ports::MentionResolver;
use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;
use teloxide::types::{Chat, Message};

/// Cache of user and chat display names.
pub struct ObservedNames {
    cache: Cache<i64, String>,
}

impl Default for ObservedNames {
    fn default() -> Self {
        Self::new(NAME_CACHE_TTL_SECS, NAME_CACHE_MAX_SIZE)
    }
}

impl ObservedNames {
    /// Creates a cache keeping each name for `ttl_secs`.
    #[must_use]
    pub fn new(ttl_secs: u64, max_size: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_size)
                .time_to_live(Duration::from_secs(ttl_secs))
                .build(),
        }
    }

    /// Records a display name for `id`.
    pub async fn learn(&self, id: i64, name: impl Into<String>) {
        let name = name.into();
        if !name.trim().is_empty() {
            self.cache.insert(id, name).await;
        }
    }

    /// Learns the author, the sender chat and the chat of `msg`.
    pub async fn observe(&self, msg: &Message) {
        if let Some(user) = msg.from.as_ref() {
            self.learn(user.id.0.cast_signed(), user.full_name()).await;
        }
        if let Some(chat) = msg.sender_chat.as_ref() {
            self.learn_chat(chat).await;
        }
        self.learn_chat(&msg.chat).await;
        if let Some(reply) = msg.reply_to_message() {
            if let Some(user) = reply.from.as_ref() {
                self.learn(user.id.0.cast_signed(), user.full_name()).await;
            }
        }
    }

    async fn learn_chat(&self, chat: &Chat) {
        let name = chat.title().map(str::to_string).or_else(|| {
            let first = chat.first_name()?;
            Some(match chat.last_name() {
                Some(last) => format!("{first} {last}"),
                None => first.to_string(),
            })
        });
        if let Some(name) = name {
            self.learn(chat.id.0, name).await;
        }
    }
}

#[async_trait]
impl MentionResolver for ObservedNames {
    async fn resolve(&self, id: i64) -> anyhow::Result<String> {
        self.cache
            .get(&id)
            .await
            .ok_or_else(|| anyhow::anyhow!("no display name observed for {id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_learns_names_from_messages() -> Result<(), serde_json::Error> {
        let names = ObservedNames::default();
        let msg: Message = serde_json::from_value(json!({
            "message_id": 1,
            "date": 1_714_564_800,
            "chat": {"id": -1_000_000_000_777_i64, "type": "supergroup", "title": "Team"},
            "from": {"id": 9, "is_bot": false, "first_name": "Ann", "last_name": "Lee"},
            "text": "hi"
        }))?;
        names.observe(&msg).await;

        assert_eq!(names.resolve(9).await.ok().as_deref(), Some("Ann Lee"));
        assert_eq!(
            names.resolve(-1_000_000_000_777).await.ok().as_deref(),
            Some("Team")
        );
        assert!(names.resolve(10).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_names_are_ignored() {
        let names = ObservedNames::default();
        names.learn(5, "   ").await;
        assert!(names.resolve(5).await.is_err());
        names.learn(5, "Bob").await;
        assert_eq!(names.resolve(5).await.ok().as_deref(), Some("Bob"));
    }
}

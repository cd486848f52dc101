use super::{media_key, newest, MessageStore, StorageError};
use crate::model::ArchivedMessage;
use crate::retention::RetentionPolicy;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local archive.
///
/// Contents are lost on restart; retention still applies.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<(i64, i32), ArchivedMessage>>,
    media: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` when no records are stored
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn save(&self, message: &ArchivedMessage) -> Result<(), StorageError> {
        self.records
            .write()
            .await
            .insert((message.chat_id, message.id), message.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<ArchivedMessage>, StorageError> {
        let records = self.records.read().await;
        Ok(newest(
            records
                .iter()
                .filter(|((_, msg_id), _)| *msg_id == id)
                .map(|(_, record)| record.clone()),
        ))
    }

    async fn get(&self, chat_id: i64, id: i32) -> Result<Option<ArchivedMessage>, StorageError> {
        Ok(self.records.read().await.get(&(chat_id, id)).cloned())
    }

    async fn save_media(
        &self,
        chat_id: i64,
        id: i32,
        data: Bytes,
    ) -> Result<String, StorageError> {
        let key = media_key(chat_id, id);
        self.media.write().await.insert(key.clone(), data);
        Ok(key)
    }

    async fn load_media(&self, media_ref: &str) -> Result<Bytes, StorageError> {
        self.media
            .read()
            .await
            .get(media_ref)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(media_ref.to_string()))
    }

    async fn purge_expired(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let mut records = self.records.write().await;
        let mut media = self.media.write().await;
        let before = records.len();

        records.retain(|_, record| {
            let expired = policy.is_expired(record, now);
            if expired {
                if let Some(media_ref) = &record.media_ref {
                    media.remove(media_ref);
                }
            }
            !expired
        });

        Ok(before - records.len())
    }

    async fn check_connection(&self) -> Result<(), String> {
        Ok(())
    }
}

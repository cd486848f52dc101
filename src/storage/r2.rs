use super::{media_key, message_key, message_prefix, newest, MessageStore, StorageError};
use crate::config::Settings;
use crate::model::ArchivedMessage;
use crate::retention::RetentionPolicy;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// R2-backed archive
pub struct R2MessageStore {
    client: Client,
    bucket: String,
    cache: Cache<String, ArchivedMessage>,
}

impl R2MessageStore {
    /// Create a new R2 store instance
    ///
    /// # Errors
    ///
    /// Returns an error if R2 configuration is missing.
    pub async fn new(settings: &Settings) -> Result<Self, StorageError> {
        let endpoint_url = settings
            .r2_endpoint_url
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ENDPOINT_URL is missing".into()))?;
        let access_key = settings
            .r2_access_key_id
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ACCESS_KEY_ID is missing".into()))?;
        let secret_key = settings
            .r2_secret_access_key
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_SECRET_ACCESS_KEY is missing".into()))?;
        let bucket = settings
            .r2_bucket_name
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_BUCKET_NAME is missing".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "r2-storage");

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(60 * 60))
            .time_to_idle(Duration::from_secs(30 * 60))
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.clone(),
            cache,
        })
    }

    async fn put_record(&self, key: &str, message: &ArchivedMessage) -> Result<(), StorageError> {
        let body = serde_json::to_vec(message)?;

        // Write-through
        self.cache.insert(key.to_string(), message.clone()).await;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
                    .into_bytes();
                Ok(Some(data))
            }
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => Ok(None),
            Err(e) => Err(StorageError::S3Get(Box::new(e))),
        }
    }

    async fn load_record(&self, key: &str) -> Result<Option<ArchivedMessage>, StorageError> {
        // Read-through
        if let Some(cached) = self.cache.get(key).await {
            return Ok(Some(cached));
        }

        let Some(data) = self.get_object(key).await? else {
            return Ok(None);
        };
        let message: ArchivedMessage = serde_json::from_slice(&data)?;
        self.cache.insert(key.to_string(), message.clone()).await;
        Ok(Some(message))
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.cache.invalidate(key).await;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;

        Ok(())
    }

    /// Keys under `prefix`, following continuation tokens.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::S3List(e.to_string()))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl MessageStore for R2MessageStore {
    async fn save(&self, message: &ArchivedMessage) -> Result<(), StorageError> {
        self.put_record(&message_key(message.chat_id, message.id), message)
            .await
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<ArchivedMessage>, StorageError> {
        let keys = self.list_keys(&message_prefix(id)).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.load_record(&key).await? {
                records.push(record);
            }
        }
        Ok(newest(records))
    }

    async fn get(&self, chat_id: i64, id: i32) -> Result<Option<ArchivedMessage>, StorageError> {
        self.load_record(&message_key(chat_id, id)).await
    }

    async fn save_media(
        &self,
        chat_id: i64,
        id: i32,
        data: Bytes,
    ) -> Result<String, StorageError> {
        let key = media_key(chat_id, id);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type("application/octet-stream")
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;
        Ok(key)
    }

    async fn load_media(&self, media_ref: &str) -> Result<Bytes, StorageError> {
        self.get_object(media_ref)
            .await?
            .ok_or_else(|| StorageError::NotFound(media_ref.to_string()))
    }

    async fn purge_expired(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let keys = self.list_keys("messages/").await?;
        let mut purged = 0;

        for key in keys {
            let record = match self.load_record(&key).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(StorageError::Json(e)) => {
                    warn!(key = %key, error = %e, "Skipping unreadable archive record");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !policy.is_expired(&record, now) {
                continue;
            }

            if let Some(media_ref) = &record.media_ref {
                self.delete_object(media_ref).await?;
            }
            self.delete_object(&key).await?;
            debug!(key = %key, "Purged expired record");
            purged += 1;
        }

        Ok(purged)
    }

    async fn check_connection(&self) -> Result<(), String> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!("Successfully connected to R2 storage.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("R2 connectivity test failed: {e:#?}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }
}

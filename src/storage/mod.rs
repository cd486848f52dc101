//! Storage layer for the message archive
//!
//! Records are JSON documents keyed by `(message id, chat id)`; media is kept
//! as raw objects next to them. [`R2MessageStore`] is the durable backend,
//! [`InMemoryStore`] is used when R2 is not configured and in tests.

mod memory;
mod r2;

pub use memory::InMemoryStore;
pub use r2::R2MessageStore;

use crate::model::ArchivedMessage;
use crate::retention::RetentionPolicy;
use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error retrieving object from S3
    #[error("S3 Get error: {0}")]
    S3Get(Box<SdkError<GetObjectError>>),
    /// Error putting or deleting an object in S3
    #[error("S3 put error: {0}")]
    S3Put(String),
    /// Error listing objects in S3
    #[error("S3 list error: {0}")]
    S3List(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration error (missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
    /// Referenced object does not exist
    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Interface for archive backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert or replace the record for `(message.id, message.chat_id)`
    async fn save(&self, message: &ArchivedMessage) -> Result<(), StorageError>;
    /// Most recent record with this message id, in any chat
    async fn get_by_id(&self, id: i32) -> Result<Option<ArchivedMessage>, StorageError>;
    /// Record for an exact `(chat_id, id)` pair
    async fn get(&self, chat_id: i64, id: i32) -> Result<Option<ArchivedMessage>, StorageError>;
    /// Store media bytes and return the opaque reference
    async fn save_media(&self, chat_id: i64, id: i32, data: Bytes)
        -> Result<String, StorageError>;
    /// Load media by reference; a missing object is [`StorageError::NotFound`]
    async fn load_media(&self, media_ref: &str) -> Result<Bytes, StorageError>;
    /// Remove records (and their media) past their retention cutoff
    async fn purge_expired(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<usize, StorageError>;
    /// Check connection to storage
    async fn check_connection(&self) -> Result<(), String>;
}

fn message_prefix(id: i32) -> String {
    format!("messages/{id}/")
}

fn message_key(chat_id: i64, id: i32) -> String {
    format!("messages/{id}/{chat_id}.json")
}

fn media_key(chat_id: i64, id: i32) -> String {
    format!("media/{chat_id}/{id}")
}

/// Newest version among records sharing a message id.
fn newest(records: impl IntoIterator<Item = ArchivedMessage>) -> Option<ArchivedMessage> {
    records.into_iter().max_by_key(ArchivedMessage::last_touched)
}

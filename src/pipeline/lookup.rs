use crate::model::ArchivedMessage;
use crate::storage::{MessageStore, StorageError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{debug, error, warn};

/// Why a single lookup attempt produced no record.
#[derive(Error, Debug)]
pub enum LookupError {
    /// No record with this id yet; the only retryable case.
    #[error("record not in archive")]
    Absent,
    /// A record exists but belongs to another chat.
    #[error("record belongs to chat {found}, expected {expected}")]
    ChatMismatch {
        /// Chat of the stored record.
        found: i64,
        /// Chat the deletion was reported in.
        expected: i64,
    },
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StorageError),
}

/// Archive reader for deletion events.
///
/// A deletion can race the write of the message it refers to, so an absent
/// record gets exactly one more read after a fixed delay.
pub struct RetryingLookup {
    store: Arc<dyn MessageStore>,
    retry_delay: Duration,
}

impl RetryingLookup {
    /// Creates a lookup over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, retry_delay: Duration) -> Self {
        Self { store, retry_delay }
    }

    /// Fetches the record for `id`, or `None` when it is unavailable.
    ///
    /// With a known chat only that chat's record is returned. When the id
    /// exists only in other chats it counts as not found and is not retried. Store errors are logged and treated as not found.
    pub async fn fetch(&self, id: i32, expected_chat: Option<i64>) -> Option<ArchivedMessage> {
        let strategy = FixedInterval::new(self.retry_delay).take(1);
        let result = RetryIf::spawn(
            strategy,
            || self.attempt(id, expected_chat),
            |e: &LookupError| matches!(e, LookupError::Absent),
        )
        .await;

        match result {
            Ok(record) => Some(record),
            Err(LookupError::Absent) => {
                debug!(message_id = id, "Message not found in archive after retry");
                None
            }
            Err(e @ LookupError::ChatMismatch { .. }) => {
                warn!(message_id = id, error = %e, "Archived message chat mismatch");
                None
            }
            Err(LookupError::Store(e)) => {
                error!(message_id = id, error = %e, "Archive lookup failed");
                None
            }
        }
    }

    async fn attempt(
        &self,
        id: i32,
        expected_chat: Option<i64>,
    ) -> Result<ArchivedMessage, LookupError> {
        let Some(expected) = expected_chat else {
            return self.store.get_by_id(id).await?.ok_or(LookupError::Absent);
        };

        // Ids are per chat: read the exact record, then classify the miss
        if let Some(record) = self.store.get(expected, id).await? {
            return Ok(record);
        }
        match self.store.get_by_id(id).await? {
            Some(other) => Err(LookupError::ChatMismatch {
                found: other.chat_id,
                expected,
            }),
            None => Err(LookupError::Absent),
        }
    }
}

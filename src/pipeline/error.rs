//! Error types of the output pipeline.

use crate::storage::StorageError;
use thiserror::Error;

/// Failure to deliver something to the log chat.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The platform rejected the request or the network failed after retries.
    #[error("Telegram send error: {0}")]
    Telegram(String),
}

/// Failure to obtain or attach a media file.
#[derive(Error, Debug)]
pub enum MediaError {
    /// The archive holds no media reference for the message.
    #[error("no stored media for message {0}")]
    NotStored(i32),
    /// The strategy needs a live message but only an archived one is available.
    #[error("live media is not available for archived messages")]
    NotLive,
    /// The file is larger than the configured download limit.
    #[error("media too large: {size} bytes (limit {limit})")]
    TooLarge {
        /// Reported file size.
        size: u32,
        /// Configured limit.
        limit: u32,
    },
    /// The fetch succeeded but returned no bytes.
    #[error("media file is empty")]
    Empty,
    /// Download from the platform failed.
    #[error("media download failed: {0}")]
    Fetch(String),
    /// Reading the stored file failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Sending the attachment failed.
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Non-success outcomes of routing an event.
///
/// None of these escape [`EventRouter::route`](super::router::EventRouter::route);
/// they classify what happened for logging and tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The event did not match the forwarding rules.
    #[error("event rejected by filter rules")]
    FilterRejected,
    /// The deletion was refused by the rate limiter.
    #[error("deletion refused by rate limiter")]
    RateLimited,
    /// The deleted message could not be found in the archive.
    #[error("message {0} not found in archive")]
    LookupNotFound(i32),
    /// An attachment path failed; the next fallback applies.
    #[error("media unavailable: {0}")]
    MediaUnavailable(String),
    /// Even the text-only fallback could not be sent.
    #[error("destination send failed: {0}")]
    DestinationSendFailure(String),
}

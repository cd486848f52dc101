//! Periodic purge of archive records past their retention period.

use crate::model::{ArchivedMessage, ChatKind};
use crate::storage::MessageStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Interval between successful purge runs
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Delay before retrying a failed purge run
pub const CLEANUP_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Retention category of an archived record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionCategory {
    /// Private chat with a user
    User,
    /// Broadcast channel
    Channel,
    /// Group or supergroup
    Group,
    /// Any message authored by a bot
    Bot,
}

impl RetentionCategory {
    /// Category of `record`; bot authorship takes precedence over chat kind.
    #[must_use]
    pub const fn of(record: &ArchivedMessage) -> Self {
        if record.sender_is_bot {
            return Self::Bot;
        }
        match record.chat_kind {
            ChatKind::Private => Self::User,
            ChatKind::Group => Self::Group,
            ChatKind::Channel => Self::Channel,
        }
    }
}

/// Per-category lifetimes, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Private chats
    pub user_days: i64,
    /// Channels
    pub channel_days: i64,
    /// Groups
    pub group_days: i64,
    /// Bot-authored messages
    pub bot_days: i64,
}

impl RetentionPolicy {
    /// Lifetime of `category`.
    #[must_use]
    pub fn lifetime(&self, category: RetentionCategory) -> TimeDelta {
        let days = match category {
            RetentionCategory::User => self.user_days,
            RetentionCategory::Channel => self.channel_days,
            RetentionCategory::Group => self.group_days,
            RetentionCategory::Bot => self.bot_days,
        };
        TimeDelta::try_days(days).unwrap_or(TimeDelta::MAX)
    }

    /// Returns `true` when the record was created before its category's cutoff.
    #[must_use]
    pub fn is_expired(&self, record: &ArchivedMessage, now: DateTime<Utc>) -> bool {
        let lifetime = self.lifetime(RetentionCategory::of(record));
        now.checked_sub_signed(lifetime)
            .is_some_and(|cutoff| record.created_at < cutoff)
    }
}

/// Runs one purge pass.
///
/// # Errors
///
/// Propagates the store error; the caller decides when to retry.
pub async fn run_cleanup(
    store: &dyn MessageStore,
    policy: &RetentionPolicy,
) -> Result<usize, crate::storage::StorageError> {
    let purged = store.purge_expired(policy, Utc::now()).await?;
    if purged > 0 {
        info!(purged, "Removed expired archive records");
    } else {
        debug!("No expired archive records");
    }
    Ok(purged)
}

/// Spawns the hourly cleanup loop. It stops when `token` is cancelled.
pub fn spawn_cleanup(
    store: Arc<dyn MessageStore>,
    policy: RetentionPolicy,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Archive cleanup service started");
        loop {
            let delay = match run_cleanup(store.as_ref(), &policy).await {
                Ok(_) => CLEANUP_INTERVAL,
                Err(e) => {
                    error!(error = %e, "Archive cleanup failed");
                    CLEANUP_RETRY_DELAY
                }
            };

            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
        debug!("Archive cleanup service stopped");
    })
}

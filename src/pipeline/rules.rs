//! Forwarding rules.

use crate::model::{ChatKind, LiveMessage};
use std::collections::HashSet;
use tracing::debug;

/// Process-lifetime filter configuration. Read-only after startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRules {
    /// Users and chats that are never archived or logged.
    pub ignored_ids: HashSet<i64>,
    /// Users whose incoming private messages are forwarded.
    pub forward_user_ids: HashSet<i64>,
    /// Groups and channels whose messages are forwarded.
    pub forward_group_ids: HashSet<i64>,
}

impl FilterRules {
    /// Returns `true` when the sender or the chat is ignored.
    #[must_use]
    pub fn is_ignored(&self, message: &LiveMessage) -> bool {
        self.ignored_ids.contains(&message.sender_id) || self.ignored_ids.contains(&message.chat_id)
    }

    /// Forward predicate shared by new and edited messages.
    #[must_use]
    pub fn should_forward(&self, message: &LiveMessage) -> bool {
        if self.is_ignored(message) {
            debug!(
                message_id = message.id,
                sender_id = message.sender_id,
                chat_id = message.chat_id,
                "Message ignored by rule"
            );
            return false;
        }

        match message.chat_kind {
            ChatKind::Private => {
                !message.outgoing && self.forward_user_ids.contains(&message.sender_id)
            }
            ChatKind::Group | ChatKind::Channel => {
                self.forward_group_ids.contains(&message.chat_id)
            }
        }
    }

    /// Logging predicate for deletions.
    ///
    /// An unknown chat is logged (fail-open); the deletion rate limiter keeps
    /// the resulting noise bounded.
    #[must_use]
    pub fn should_log_deletion(&self, chat_id: Option<i64>) -> bool {
        let Some(chat_id) = chat_id else {
            debug!("Deletion from unknown chat, logging by default");
            return true;
        };

        if self.ignored_ids.contains(&chat_id) {
            return false;
        }

        // A private chat id is the peer's user id
        self.forward_group_ids.contains(&chat_id)
            || (chat_id > 0 && self.forward_user_ids.contains(&chat_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::live_message;

    fn rules() -> FilterRules {
        FilterRules {
            ignored_ids: HashSet::from([666, -100_666]),
            forward_user_ids: HashSet::from([42, 666]),
            forward_group_ids: HashSet::from([-1_000_000_000_001]),
        }
    }

    #[test]
    fn test_private_from_forwarded_user() {
        let msg = live_message(1, 42, ChatKind::Private, 42);
        assert!(rules().should_forward(&msg));
    }

    #[test]
    fn test_ignore_takes_precedence() {
        let msg = live_message(1, 666, ChatKind::Private, 666);
        assert!(!rules().should_forward(&msg));
    }

    #[test]
    fn test_outgoing_private_not_forwarded() {
        let mut msg = live_message(1, 42, ChatKind::Private, 42);
        msg.outgoing = true;
        assert!(!rules().should_forward(&msg));
    }

    #[test]
    fn test_group_rules() {
        let msg = live_message(1, -1_000_000_000_001, ChatKind::Group, 5);
        assert!(rules().should_forward(&msg));

        let msg = live_message(1, -1_000_000_000_002, ChatKind::Group, 42);
        assert!(!rules().should_forward(&msg));

        // Forwarded user posting in a forwarded group, but the user is ignored
        let msg = live_message(1, -1_000_000_000_001, ChatKind::Group, 666);
        assert!(!rules().should_forward(&msg));
    }

    #[test]
    fn test_deletion_rules() {
        let rules = rules();
        assert!(rules.should_log_deletion(None));
        assert!(rules.should_log_deletion(Some(-1_000_000_000_001)));
        assert!(rules.should_log_deletion(Some(42)));
        assert!(!rules.should_log_deletion(Some(-100_666)));
        assert!(!rules.should_log_deletion(Some(666)));
        assert!(!rules.should_log_deletion(Some(-77)));
    }
}

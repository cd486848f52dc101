use super::delivery::{DeliveryOutcome, DeliverySubject, MediaDelivery};
use super::error::RelayError;
use super::format::{pause_notice, EntryKind, EntrySource, Formatter};
use super::lookup::RetryingLookup;
use super::rate_limit::{DeletionRateLimiter, RateDecision};
use super::rules::FilterRules;
use crate::model::{DeletionEvent, LiveMessage, RelayEvent};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// What happened to a routed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Rejected by the forwarding rules.
    Filtered,
    /// Deletion refused by the rate limiter.
    RateLimited,
    /// One delivery per log entry produced.
    Delivered(Vec<DeliveryOutcome>),
}

/// Decides which events reach the log chat and in what form.
///
/// Events must be routed one at a time, in arrival order.
pub struct EventRouter {
    rules: Arc<FilterRules>,
    limiter: Mutex<DeletionRateLimiter>,
    lookup: RetryingLookup,
    formatter: Formatter,
    delivery: MediaDelivery,
}

impl EventRouter {
    /// Wires the router from its stages.
    #[must_use]
    pub fn new(
        rules: Arc<FilterRules>,
        limiter: DeletionRateLimiter,
        lookup: RetryingLookup,
        formatter: Formatter,
        delivery: MediaDelivery,
    ) -> Self {
        Self {
            rules,
            limiter: Mutex::new(limiter),
            lookup,
            formatter,
            delivery,
        }
    }

    /// Routes one event. Never fails: errors are logged and degrade the entry.
    pub async fn route(&self, event: &RelayEvent) -> RouteOutcome {
        self.route_at(event, Utc::now()).await
    }

    /// Routes one event observed at `now`.
    pub async fn route_at(&self, event: &RelayEvent, now: DateTime<Utc>) -> RouteOutcome {
        match event {
            RelayEvent::NewMessage(msg) => self.on_new(msg).await,
            RelayEvent::EditedMessage(msg) => self.on_edited(msg).await,
            RelayEvent::DeletedMessage(deletion) => self.on_deleted(deletion, now).await,
        }
    }

    async fn on_new(&self, msg: &LiveMessage) -> RouteOutcome {
        if !self.rules.should_forward(msg) {
            debug!(message_id = msg.id, reason = %RelayError::FilterRejected, "New message not logged");
            return RouteOutcome::Filtered;
        }

        let text = self
            .formatter
            .format(EntryKind::New, EntrySource::Live(msg), false)
            .await;
        let outcome = self.delivery.deliver(&text, DeliverySubject::Live(msg)).await;
        RouteOutcome::Delivered(vec![outcome])
    }

    async fn on_edited(&self, msg: &LiveMessage) -> RouteOutcome {
        if !self.rules.should_forward(msg) {
            debug!(message_id = msg.id, reason = %RelayError::FilterRejected, "Edit not logged");
            return RouteOutcome::Filtered;
        }

        // Edits go out as text; the media was logged with the original
        let text = self
            .formatter
            .format(EntryKind::Edited, EntrySource::Live(msg), false)
            .await;
        RouteOutcome::Delivered(vec![self.delivery.deliver_text(&text).await])
    }

    async fn on_deleted(&self, deletion: &DeletionEvent, now: DateTime<Utc>) -> RouteOutcome {
        let chat_id = deletion.resolved_chat_id();
        if !self.rules.should_log_deletion(chat_id) {
            debug!(?chat_id, reason = %RelayError::FilterRejected, "Deletion not logged");
            return RouteOutcome::Filtered;
        }

        let (decision, config) = {
            let mut limiter = self.limiter.lock().unwrap_or_else(PoisonError::into_inner);
            (limiter.check(now), limiter.config())
        };

        match decision {
            RateDecision::Allowed => {}
            RateDecision::Refused { until } => {
                warn!(?chat_id, %until, reason = %RelayError::RateLimited, "Deletion dropped");
                return RouteOutcome::RateLimited;
            }
            RateDecision::Tripped { until, observed } => {
                info!(observed, %until, "Sending deletion pause notice");
                self.delivery
                    .deliver_text(&pause_notice(&config, until))
                    .await;
                return RouteOutcome::RateLimited;
            }
        }

        let mut outcomes = Vec::with_capacity(deletion.message_ids.len());
        for &message_id in &deletion.message_ids {
            let outcome = match self.lookup.fetch(message_id, chat_id).await {
                Some(record) => {
                    let text = self
                        .formatter
                        .format(EntryKind::Deleted, EntrySource::Archived(&record), true)
                        .await;
                    self.delivery
                        .deliver(&text, DeliverySubject::Archived(&record))
                        .await
                }
                None => {
                    debug!(
                        message_id,
                        reason = %RelayError::LookupNotFound(message_id),
                        "Logging deletion without content"
                    );
                    let text = self
                        .formatter
                        .format_unknown_deletion(chat_id, message_id)
                        .await;
                    self.delivery.deliver_text(&text).await
                }
            };
            outcomes.push(outcome);
        }

        RouteOutcome::Delivered(outcomes)
    }
}

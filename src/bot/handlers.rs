//! Update dispatch.
//!
//! All update kinds feed one [`Relay`]. The dispatcher runs with a single
//! distribution key, so events are handled one at a time in arrival order.

use super::convert::{deletion_event, live_message};
use super::names::ObservedNames;
use crate::config::Settings;
use crate::model::RelayEvent;
use crate::pipeline::relay::Relay;
use crate::pipeline::router::RouteOutcome;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::BusinessMessagesDeleted;
use tracing::debug;

/// Builds the update handler tree.
#[must_use]
pub fn schema() -> UpdateHandler<teloxide::RequestError> {
    let not_log_chat =
        |msg: Message, settings: Arc<Settings>| msg.chat.id.0 != settings.log_chat_id;

    dptree::entry()
        .branch(
            Update::filter_message()
                .filter(not_log_chat)
                .endpoint(handle_new),
        )
        .branch(
            Update::filter_edited_message()
                .filter(not_log_chat)
                .endpoint(handle_edited),
        )
        .branch(
            Update::filter_channel_post()
                .filter(not_log_chat)
                .endpoint(handle_new),
        )
        .branch(
            Update::filter_edited_channel_post()
                .filter(not_log_chat)
                .endpoint(handle_edited),
        )
        .branch(Update::filter_business_message().endpoint(handle_new))
        .branch(Update::filter_edited_business_message().endpoint(handle_edited))
        .branch(Update::filter_deleted_business_messages().endpoint(handle_deleted))
}

async fn dispatch(relay: &Relay, event: RelayEvent) {
    let outcome = relay.handle(&event).await;
    match outcome {
        RouteOutcome::Delivered(outcomes) => debug!(?outcomes, "Event delivered"),
        other => debug!(outcome = ?other, "Event not delivered"),
    }
}

async fn handle_new(
    msg: Message,
    relay: Arc<Relay>,
    names: Arc<ObservedNames>,
) -> Result<(), teloxide::RequestError> {
    names.observe(&msg).await;
    dispatch(&relay, RelayEvent::NewMessage(live_message(&msg))).await;
    respond(())
}

async fn handle_edited(
    msg: Message,
    relay: Arc<Relay>,
    names: Arc<ObservedNames>,
) -> Result<(), teloxide::RequestError> {
    names.observe(&msg).await;
    dispatch(&relay, RelayEvent::EditedMessage(live_message(&msg))).await;
    respond(())
}

async fn handle_deleted(
    deleted: BusinessMessagesDeleted,
    relay: Arc<Relay>,
) -> Result<(), teloxide::RequestError> {
    dispatch(&relay, RelayEvent::DeletedMessage(deletion_event(&deleted))).await;
    respond(())
}

use super::archive::Archiver;
use super::router::{EventRouter, RouteOutcome};
use crate::model::RelayEvent;
use tracing::error;

/// Entry point for inbound events: archive first, then route.
pub struct Relay {
    archiver: Archiver,
    router: EventRouter,
}

impl Relay {
    /// Combines the archive writer and the router.
    #[must_use]
    pub fn new(archiver: Archiver, router: EventRouter) -> Self {
        Self { archiver, router }
    }

    /// Handles one event. Archive failures are logged and routing continues.
    pub async fn handle(&self, event: &RelayEvent) -> RouteOutcome {
        match event {
            RelayEvent::NewMessage(msg) | RelayEvent::EditedMessage(msg) => {
                if let Err(e) = self.archiver.archive(msg).await {
                    error!(
                        message_id = msg.id,
                        chat_id = msg.chat_id,
                        error = %e,
                        "Failed to archive message"
                    );
                }
            }
            RelayEvent::DeletedMessage(_) => {}
        }

        self.router.route(event).await
    }
}

//! Output pipeline
//!
//! Archives inbound messages, decides which events reach the log chat and
//! delivers formatted entries with a media fallback chain.

/// Archive writer for new and edited messages.
pub mod archive;
/// Media delivery with ordered fallbacks.
pub mod delivery;
/// Pipeline error types.
pub mod error;
/// Log entry formatting.
pub mod format;
/// Archive lookup with a single delayed retry.
pub mod lookup;
/// Collaborator traits.
pub mod ports;
/// Deletion rate limiter.
pub mod rate_limit;
/// Archive-then-route entry point.
pub mod relay;
/// Event routing.
pub mod router;
/// Forwarding rules.
pub mod rules;

pub use archive::Archiver;
pub use delivery::{DeliveryOutcome, DeliverySubject, MediaDelivery};
pub use error::{MediaError, RelayError, SendError};
pub use format::{EntryKind, EntrySource, Formatter};
pub use lookup::RetryingLookup;
pub use ports::{LiveMediaSource, LogSink, MediaFile, MentionResolver, RestrictedMediaSource};
pub use rate_limit::{DeletionRateLimiter, RateDecision, RateLimitConfig};
pub use relay::Relay;
pub use router::{EventRouter, RouteOutcome};
pub use rules::FilterRules;

/// Conversion from teloxide types to pipeline events
pub mod convert;
/// Update handler tree and endpoints
pub mod handlers;
/// Media downloads
pub mod media;
/// Display names learned from traffic
pub mod names;
/// Log chat sender
pub mod sink;

pub use media::TelegramMediaFetcher;
pub use names::ObservedNames;
pub use sink::TelegramLogSink;

#![warn(missing_docs)]
//! Telegram message logger.
//!
//! Archives chat messages and re-broadcasts new, edited and deleted messages
//! into a single log chat, with rate-limited deletion notices and media
//! delivery that degrades to text when attachments cannot be sent.

/// Telegram transport adapter (teloxide).
pub mod bot;
/// Configuration management.
pub mod config;
/// Core domain types shared by the pipeline and the adapters.
pub mod model;
/// Output pipeline: filtering, rate limiting, formatting and delivery.
pub mod pipeline;
/// Background purge of expired archive records.
pub mod retention;
/// Message archive storage (R2/S3 and in-memory).
pub mod storage;
/// Utility functions.
pub mod utils;

/// Test fixtures.
#[cfg(test)]
pub mod testing;

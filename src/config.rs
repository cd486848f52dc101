//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the runtime constants of the Telegram transport.

use crate::pipeline::rate_limit::RateLimitConfig;
use crate::pipeline::rules::FilterRules;
use crate::retention::RetentionPolicy;
use chrono::TimeDelta;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Chat every log entry is sent to
    pub log_chat_id: i64,

    /// User/chat IDs whose messages are never archived or logged
    #[serde(rename = "ignored_ids")]
    pub ignored_ids_str: Option<String>,
    /// Users whose incoming private messages are forwarded
    #[serde(rename = "forward_user_ids")]
    pub forward_user_ids_str: Option<String>,
    /// Groups and channels whose messages are forwarded
    #[serde(rename = "forward_group_ids")]
    pub forward_group_ids_str: Option<String>,

    /// Deletion events admitted per window before pausing
    #[serde(default = "default_deletion_threshold")]
    pub deletion_rate_limit_threshold: usize,
    /// Sliding window length, seconds
    #[serde(default = "default_deletion_window")]
    pub deletion_rate_limit_window_secs: u64,
    /// Pause after the threshold is exceeded, seconds
    #[serde(default = "default_deletion_pause")]
    pub deletion_pause_secs: u64,

    /// Delay before the second archive lookup, milliseconds
    #[serde(default = "default_lookup_retry_delay")]
    pub lookup_retry_delay_ms: u64,

    /// Largest media file that is downloaded and archived
    #[serde(default = "default_max_media_size")]
    pub max_media_size_bytes: u32,

    /// Retention for private chats, days
    #[serde(default = "default_persist_days")]
    pub persist_days_user: i64,
    /// Retention for channels, days
    #[serde(default = "default_persist_days")]
    pub persist_days_channel: i64,
    /// Retention for groups, days
    #[serde(default = "default_persist_days")]
    pub persist_days_group: i64,
    /// Retention for messages authored by bots, days
    #[serde(default = "default_persist_days")]
    pub persist_days_bot: i64,

    /// R2 Storage access key ID
    pub r2_access_key_id: Option<String>,
    /// R2 Storage secret access key
    pub r2_secret_access_key: Option<String>,
    /// R2 Storage endpoint URL
    pub r2_endpoint_url: Option<String>,
    /// R2 Storage bucket name
    pub r2_bucket_name: Option<String>,
}

const fn default_deletion_threshold() -> usize {
    5
}

const fn default_deletion_window() -> u64 {
    10
}

const fn default_deletion_pause() -> u64 {
    5
}

const fn default_lookup_retry_delay() -> u64 {
    500
}

const fn default_max_media_size() -> u32 {
    20 * 1024 * 1024
}

const fn default_persist_days() -> i64 {
    1
}

/// Build the layered configuration source.
///
/// # Errors
///
/// Returns a `ConfigError` if a source cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        // Eg. `APP__LOG_CHAT_ID=-100123 ./target/app`
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Plain UPPER_SNAKE_CASE variables; empty ones count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tg_logger::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading or deserialization fails.
    pub fn new() -> Result<Self, ConfigError> {
        let mut settings: Self = build_config()?.try_deserialize()?;

        // Fallback: read R2 variables directly if the mapping did not pick them up
        for (slot, var) in [
            (&mut settings.r2_endpoint_url, "R2_ENDPOINT_URL"),
            (&mut settings.r2_access_key_id, "R2_ACCESS_KEY_ID"),
            (&mut settings.r2_secret_access_key, "R2_SECRET_ACCESS_KEY"),
            (&mut settings.r2_bucket_name, "R2_BUCKET_NAME"),
        ] {
            if slot.is_none() {
                if let Ok(val) = std::env::var(var) {
                    if !val.is_empty() {
                        *slot = Some(val);
                    }
                }
            }
        }

        Ok(settings)
    }

    /// Returns the set of ignored user/chat IDs
    #[must_use]
    pub fn ignored_ids(&self) -> HashSet<i64> {
        parse_id_list(self.ignored_ids_str.as_deref())
    }

    /// Returns the set of users whose private messages are forwarded
    #[must_use]
    pub fn forward_user_ids(&self) -> HashSet<i64> {
        parse_id_list(self.forward_user_ids_str.as_deref())
    }

    /// Returns the set of groups/channels whose messages are forwarded
    #[must_use]
    pub fn forward_group_ids(&self) -> HashSet<i64> {
        parse_id_list(self.forward_group_ids_str.as_deref())
    }

    /// Filter rules assembled from the three ID lists
    #[must_use]
    pub fn filter_rules(&self) -> FilterRules {
        FilterRules {
            ignored_ids: self.ignored_ids(),
            forward_user_ids: self.forward_user_ids(),
            forward_group_ids: self.forward_group_ids(),
        }
    }

    /// Deletion rate limiter configuration
    #[must_use]
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            threshold: self.deletion_rate_limit_threshold,
            window: secs_to_delta(self.deletion_rate_limit_window_secs),
            pause: secs_to_delta(self.deletion_pause_secs),
        }
    }

    /// Delay between the two archive lookup attempts
    #[must_use]
    pub const fn lookup_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lookup_retry_delay_ms)
    }

    /// Per-category retention lifetimes
    #[must_use]
    pub const fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            user_days: self.persist_days_user,
            channel_days: self.persist_days_channel,
            group_days: self.persist_days_group,
            bot_days: self.persist_days_bot,
        }
    }

    /// Returns `true` when every R2 setting is present
    #[must_use]
    pub const fn r2_configured(&self) -> bool {
        self.r2_endpoint_url.is_some()
            && self.r2_access_key_id.is_some()
            && self.r2_secret_access_key.is_some()
            && self.r2_bucket_name.is_some()
    }
}

fn secs_to_delta(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Parses a comma, semicolon or whitespace separated list of IDs.
/// Tokens that are not integers are skipped.
#[must_use]
pub fn parse_id_list(raw: Option<&str>) -> HashSet<i64> {
    raw.map(|s| {
        s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .filter_map(|id| id.parse::<i64>().ok())
            .collect()
    })
    .unwrap_or_default()
}

// Telegram API retry configuration
/// Initial backoff for Telegram API retries, milliseconds
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for Telegram API retries, milliseconds
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Maximum retries for a Telegram API call
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

/// Telegram's hard limit for message text
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;
/// Telegram's hard limit for media captions
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;

/// Display names learned from traffic are kept this long
pub const NAME_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
/// Maximum number of cached display names
pub const NAME_CACHE_MAX_SIZE: u64 = 50_000;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn settings() -> Settings {
        Settings {
            telegram_token: "dummy".to_string(),
            log_chat_id: -100,
            ignored_ids_str: None,
            forward_user_ids_str: None,
            forward_group_ids_str: None,
            deletion_rate_limit_threshold: default_deletion_threshold(),
            deletion_rate_limit_window_secs: default_deletion_window(),
            deletion_pause_secs: default_deletion_pause(),
            lookup_retry_delay_ms: default_lookup_retry_delay(),
            max_media_size_bytes: default_max_media_size(),
            persist_days_user: 1,
            persist_days_channel: 1,
            persist_days_group: 1,
            persist_days_bot: 1,
            r2_access_key_id: None,
            r2_secret_access_key: None,
            r2_endpoint_url: None,
            r2_bucket_name: None,
        }
    }

    // Single test so environment mutations cannot race each other
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("TELEGRAM_TOKEN", "dummy_token");
        env::set_var("LOG_CHAT_ID", "-1001234");
        env::set_var("FORWARD_GROUP_IDS", "-1001,-1002");
        env::set_var("R2_ENDPOINT_URL", "");

        let settings = Settings::new()?;
        assert_eq!(settings.log_chat_id, -1_001_234);
        assert_eq!(settings.deletion_rate_limit_threshold, 5);
        assert_eq!(settings.lookup_retry_delay(), Duration::from_millis(500));
        assert!(settings.forward_group_ids().contains(&-1002));
        assert_eq!(settings.r2_endpoint_url, None);
        assert!(!settings.r2_configured());

        env::remove_var("TELEGRAM_TOKEN");
        env::remove_var("LOG_CHAT_ID");
        env::remove_var("FORWARD_GROUP_IDS");
        env::remove_var("R2_ENDPOINT_URL");
        Ok(())
    }

    #[test]
    fn test_list_parsing() {
        let mut settings = settings();

        settings.ignored_ids_str = Some("123,456".to_string());
        let ids = settings.ignored_ids();
        assert!(ids.contains(&123));
        assert!(ids.contains(&456));
        assert_eq!(ids.len(), 2);

        settings.ignored_ids_str = Some("333; -444, 555".to_string());
        let ids = settings.ignored_ids();
        assert!(ids.contains(&-444));
        assert_eq!(ids.len(), 3);

        settings.ignored_ids_str = Some("abc, 777".to_string());
        let ids = settings.ignored_ids();
        assert!(ids.contains(&777));
        assert_eq!(ids.len(), 1);

        settings.ignored_ids_str = None;
        assert!(settings.ignored_ids().is_empty());
    }

    #[test]
    fn test_rate_limit_config_conversion() {
        let settings = settings();
        let config = settings.rate_limit_config();
        assert_eq!(config.threshold, 5);
        assert_eq!(config.window, TimeDelta::seconds(10));
        assert_eq!(config.pause, TimeDelta::seconds(5));
    }
}

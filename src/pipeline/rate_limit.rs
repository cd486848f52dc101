//! Sliding-window rate limiter with cooldown for deletion notices.
//!
//! All state mutation happens inside [`DeletionRateLimiter::check`], which is
//! synchronous: the router takes the decision before any network call and
//! never holds the limiter across a suspension point.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;
use tracing::{info, warn};

/// Rate limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum events admitted within `window`.
    pub threshold: usize,
    /// Sliding window length.
    pub window: TimeDelta,
    /// Cooldown once the threshold is exceeded.
    pub pause: TimeDelta,
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The event may proceed.
    Allowed,
    /// Refused while a pause is active.
    Refused {
        /// End of the current pause.
        until: DateTime<Utc>,
    },
    /// This event exceeded the threshold and started a pause.
    /// The caller emits the one pause notification for this cycle.
    Tripped {
        /// End of the new pause.
        until: DateTime<Utc>,
        /// Events counted in the window, including this one.
        observed: usize,
    },
}

impl RateDecision {
    /// Returns `true` for [`RateDecision::Allowed`].
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Mutable window state, owned by the router's deletion path.
#[derive(Debug)]
pub struct DeletionRateLimiter {
    config: RateLimitConfig,
    timestamps: VecDeque<DateTime<Utc>>,
    paused_until: Option<DateTime<Utc>>,
}

impl DeletionRateLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            timestamps: VecDeque::with_capacity(config.threshold.saturating_add(1)),
            paused_until: None,
        }
    }

    /// Records an event at `now` and decides whether it may proceed.
    pub fn check(&mut self, now: DateTime<Utc>) -> RateDecision {
        if let Some(until) = self.paused_until {
            if now < until {
                return RateDecision::Refused { until };
            }
            info!("Deletion logging pause has ended");
            self.paused_until = None;
        }

        let cutoff = now - self.config.window;
        while self.timestamps.front().is_some_and(|ts| *ts <= cutoff) {
            self.timestamps.pop_front();
        }

        self.timestamps.push_back(now);

        if self.timestamps.len() > self.config.threshold {
            let until = now + self.config.pause;
            self.paused_until = Some(until);
            warn!(
                observed = self.timestamps.len(),
                threshold = self.config.threshold,
                window_secs = self.config.window.num_seconds(),
                %until,
                "Deletion rate limit exceeded, pausing deletion logging"
            );
            return RateDecision::Tripped {
                until,
                observed: self.timestamps.len(),
            };
        }

        RateDecision::Allowed
    }

    /// Boolean form of [`check`](Self::check).
    pub fn allow(&mut self, now: DateTime<Utc>) -> bool {
        self.check(now).is_allowed()
    }

    /// End of the active pause, if any.
    #[must_use]
    pub const fn paused_until(&self) -> Option<DateTime<Utc>> {
        self.paused_until
    }

    /// Number of timestamps currently held in the window.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.timestamps.len()
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> RateLimitConfig {
        self.config
    }
}

//! Abuse detection for verified frames.
//!
//! The [`SpamFilter`] runs after a frame's signature and id have been
//! checked, in this order:
//!
//! 1. **Burst** — every frame counts towards the sender's sliding
//!    window. Crossing the threshold asks the caller to auto-block.
//! 2. **Rate limit** — one accepted frame per sender per interval.
//!
//! Only frames with a valid signature and an unseen id reach the filter,
//! so nobody can push an honest sender over the burst threshold by
//! replaying that sender's frames.

use pubchat_types::config::ChatConfig;
use pubchat_types::Address;

use crate::rate_limiter::{BurstDetector, RateLimiter};

// ---------------------------------------------------------------------------
// FilterResult
// ---------------------------------------------------------------------------

/// Outcome of the spam filter evaluation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterResult {
    /// Frame may proceed.
    Accept,
    /// Sender exceeded the burst threshold and should be blocked.
    Burst,
    /// Sender already had a frame accepted within the interval.
    RateLimited,
}

// ---------------------------------------------------------------------------
// SpamConfig
// ---------------------------------------------------------------------------

/// Anti-abuse settings extracted from [`ChatConfig`].
#[derive(Clone, Copy, Debug)]
pub struct SpamConfig {
    /// Minimum spacing between accepted frames from one sender.
    pub rate_limit_interval_ms: i64,
    /// Sliding window length.
    pub burst_window_ms: i64,
    /// Frames allowed inside the window.
    pub burst_max_frames: usize,
}

impl From<&ChatConfig> for SpamConfig {
    fn from(config: &ChatConfig) -> Self {
        Self {
            rate_limit_interval_ms: config.rate_limit_interval_ms,
            burst_window_ms: config.burst_window_ms,
            burst_max_frames: config.burst_max_frames,
        }
    }
}

// ---------------------------------------------------------------------------
// SpamFilter
// ---------------------------------------------------------------------------

/// Per-session burst detector plus rate limiter.
#[derive(Debug)]
pub struct SpamFilter {
    rate_limiter: RateLimiter,
    burst: BurstDetector,
}

impl SpamFilter {
    /// Creates an empty filter.
    pub fn new(config: SpamConfig) -> Self {
        Self {
            rate_limiter: RateLimiter::new(config.rate_limit_interval_ms),
            burst: BurstDetector::new(config.burst_window_ms, config.burst_max_frames),
        }
    }

    /// Evaluates one frame from `sender` received at `now_ms`.
    pub fn check(&mut self, sender: &Address, now_ms: i64) -> FilterResult {
        if self.burst.record(sender, now_ms) {
            self.burst.forget(sender);
            return FilterResult::Burst;
        }
        if !self.rate_limiter.check(sender, now_ms) {
            return FilterResult::RateLimited;
        }
        FilterResult::Accept
    }

    /// Frames currently counted for `sender`.
    pub fn burst_count(&self, sender: &Address) -> usize {
        self.burst.count(sender)
    }

    /// Forgets all per-sender state. Called on every new connect.
    pub fn reset(&mut self) {
        self.rate_limiter.clear();
        self.burst.clear();
    }
}

impl Default for SpamFilter {
    fn default() -> Self {
        Self::new(SpamConfig::from(&ChatConfig::default()))
    }
}

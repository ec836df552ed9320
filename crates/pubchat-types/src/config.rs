//! Chat configuration with sensible defaults.
//!
//! All operational parameters are centralized here. Every value has a
//! documented default; a JSON file may override any subset of them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{PubchatError, Result, MAX_NICK_LEN};

/// Highest accepted proof-of-work difficulty in leading zero bits.
pub const MAX_POW_DIFFICULTY: u8 = 24;

/// Upper bound for the history load limit.
pub const MAX_HISTORY_LOAD: usize = 2000;

/// Global chat configuration.
///
/// Missing fields in a config file take their default value.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Namespace prefix prepended to the lower-cased room name.
    pub topic_prefix: String,

    // ----- Proof-of-work ---------------------------------------------------

    /// Minimum leading zero bits of `SHA-256(payload)`.
    pub pow_difficulty: u8,

    /// The miner yields to the runtime after this many attempts.
    pub mining_yield_every: u32,

    // ----- Anti-abuse ------------------------------------------------------

    /// Minimum spacing between accepted frames from one sender.
    pub rate_limit_interval_ms: i64,

    /// Sliding window for the burst detector.
    pub burst_window_ms: i64,

    /// A sender with more frames than this inside the window is
    /// auto-blocked.
    pub burst_max_frames: usize,

    /// Per-sender nonce history size that triggers trimming.
    pub nonce_history_max: usize,

    /// Entries kept after trimming the nonce history.
    pub nonce_history_keep: usize,

    /// Longest accepted nonce, in characters.
    pub max_nonce_len: usize,

    /// Longest accepted message text, in characters.
    pub max_text_len: usize,

    // ----- History and view ------------------------------------------------

    /// Messages loaded from the store when a topic becomes active.
    pub history_load_limit: usize,

    /// The in-memory view trims when it grows past this.
    pub view_max: usize,

    /// Entries kept when the view trims.
    pub view_trim_to: usize,

    // ----- Liveness --------------------------------------------------------

    /// Delay before the first heartbeat after connecting.
    pub heartbeat_first_delay_ms: u64,

    /// Interval between heartbeats.
    pub heartbeat_interval_ms: u64,

    /// Interval between peer-list polls.
    pub peer_poll_interval_ms: u64,

    /// With no peers listed, the room counts as empty when nothing has
    /// been observed for this long.
    pub peer_stale_ms: i64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "lumen/pubsub_chat/v1/".into(),
            pow_difficulty: 12,
            mining_yield_every: 64,
            rate_limit_interval_ms: 1000,
            burst_window_ms: 2000,
            burst_max_frames: 10,
            nonce_history_max: 24,
            nonce_history_keep: 20,
            max_nonce_len: 20,
            max_text_len: 500,
            history_load_limit: 240,
            view_max: 240,
            view_trim_to: 200,
            heartbeat_first_delay_ms: 12_000,
            heartbeat_interval_ms: 60_000,
            peer_poll_interval_ms: 2_500,
            peer_stale_ms: 12_000,
        }
    }
}

impl ChatConfig {
    /// Loads a config from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`PubchatError::ConfigError`] if the file cannot be read,
    /// is not valid JSON, or fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| PubchatError::ConfigError {
            reason: format!("failed to read config file {}: {e}", path.display()),
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| PubchatError::ConfigError {
            reason: format!("failed to parse config file {}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// History load limit clamped to `1..=MAX_HISTORY_LOAD`.
    pub fn clamped_history_limit(&self) -> usize {
        self.history_load_limit.clamp(1, MAX_HISTORY_LOAD)
    }

    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.topic_prefix.is_empty() {
            return Err(PubchatError::ConfigError {
                reason: "topic_prefix must not be empty".into(),
            });
        }

        if self.pow_difficulty > MAX_POW_DIFFICULTY {
            return Err(PubchatError::ConfigError {
                reason: format!("pow_difficulty must be 0..={MAX_POW_DIFFICULTY}"),
            });
        }

        if self.mining_yield_every == 0 {
            return Err(PubchatError::ConfigError {
                reason: "mining_yield_every must be greater than 0".into(),
            });
        }

        if self.rate_limit_interval_ms < 0 || self.burst_window_ms <= 0 {
            return Err(PubchatError::ConfigError {
                reason: "rate_limit_interval_ms must be >= 0 and burst_window_ms > 0".into(),
            });
        }

        if self.burst_max_frames == 0 {
            return Err(PubchatError::ConfigError {
                reason: "burst_max_frames must be greater than 0".into(),
            });
        }

        if self.nonce_history_keep == 0 || self.nonce_history_keep > self.nonce_history_max {
            return Err(PubchatError::ConfigError {
                reason: "nonce_history_keep must be 1..=nonce_history_max".into(),
            });
        }

        if self.max_nonce_len == 0 {
            return Err(PubchatError::ConfigError {
                reason: "max_nonce_len must be greater than 0".into(),
            });
        }

        if self.max_text_len == 0 {
            return Err(PubchatError::ConfigError {
                reason: "max_text_len must be greater than 0".into(),
            });
        }

        if self.view_trim_to == 0 || self.view_trim_to > self.view_max {
            return Err(PubchatError::ConfigError {
                reason: "view_trim_to must be 1..=view_max".into(),
            });
        }

        if self.heartbeat_interval_ms == 0 || self.peer_poll_interval_ms == 0 {
            return Err(PubchatError::ConfigError {
                reason: "heartbeat and peer poll intervals must be greater than 0".into(),
            });
        }

        Ok(())
    }

    /// Longest accepted nickname, in characters.
    pub fn max_nick_len(&self) -> usize {
        MAX_NICK_LEN
    }
}

//! Replay and duplicate suppression.
//!
//! Two layers, both scoped to one session:
//!
//! 1. A set of every accepted message id (`sender:nonce`). Never
//!    evicted while the session lives; exact re-deliveries are dropped
//!    silently.
//! 2. A bounded per-sender nonce history. When a history reaches
//!    `max_per_sender` entries it is trimmed to the newest
//!    `keep_after_trim` before the next nonce is appended, so it never
//!    holds more than `max_per_sender` entries.
//!
//! Replays older than the nonce-history horizon are still caught by the
//! id set.

use std::collections::{HashMap, HashSet, VecDeque};

use pubchat_types::{Address, MessageId};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default per-sender history size that triggers trimming.
pub const DEFAULT_NONCE_HISTORY_MAX: usize = 24;

/// Default number of nonces kept after trimming.
pub const DEFAULT_NONCE_HISTORY_KEEP: usize = 20;

// ---------------------------------------------------------------------------
// ReplayGuard
// ---------------------------------------------------------------------------

/// Per-session replay state.
#[derive(Debug)]
pub struct ReplayGuard {
    seen_ids: HashSet<MessageId>,
    histories: HashMap<Address, VecDeque<String>>,
    max_per_sender: usize,
    keep_after_trim: usize,
}

impl ReplayGuard {
    /// Creates an empty guard.
    ///
    /// `keep_after_trim` is clamped to `1..=max_per_sender`.
    pub fn new(max_per_sender: usize, keep_after_trim: usize) -> Self {
        let max = max_per_sender.max(1);
        Self {
            seen_ids: HashSet::new(),
            histories: HashMap::new(),
            max_per_sender: max,
            keep_after_trim: keep_after_trim.clamp(1, max),
        }
    }

    /// Records `id` and returns `true` if it was not seen before.
    pub fn first_sighting(&mut self, id: &MessageId) -> bool {
        self.seen_ids.insert(id.clone())
    }

    /// Marks an id as seen without any other bookkeeping.
    ///
    /// Used for locally echoed messages so the bridge delivering them
    /// back does not duplicate them.
    pub fn remember_id(&mut self, id: MessageId) {
        self.seen_ids.insert(id);
    }

    /// Appends `nonce` to the sender's history.
    ///
    /// Returns `false`, leaving the history unchanged, if the nonce is
    /// already present.
    pub fn record_nonce(&mut self, sender: &Address, nonce: &str) -> bool {
        let history = self.histories.entry(sender.clone()).or_default();
        if history.iter().any(|n| n == nonce) {
            return false;
        }
        if history.len() >= self.max_per_sender {
            let excess = history.len() - self.keep_after_trim;
            history.drain(..excess);
        }
        history.push_back(nonce.to_string());
        true
    }

    /// Number of ids in the set.
    pub fn seen_count(&self) -> usize {
        self.seen_ids.len()
    }

    /// Current history length for `sender`.
    pub fn history_len(&self, sender: &Address) -> usize {
        self.histories.get(sender).map_or(0, VecDeque::len)
    }

    /// Forgets everything. Called on every new connect.
    pub fn reset(&mut self) {
        self.seen_ids.clear();
        self.histories.clear();
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_NONCE_HISTORY_MAX, DEFAULT_NONCE_HISTORY_KEEP)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

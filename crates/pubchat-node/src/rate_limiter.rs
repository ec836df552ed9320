//! Per-sender throttling.
//!
//! Two independent counters:
//!
//! - [`RateLimiter`]: at most one accepted frame per sender per
//!   interval. A frame arriving sooner is refused and does not move the
//!   window.
//! - [`BurstDetector`]: a sliding window over every frame a sender
//!   produced, whatever its type or rate-limit outcome.
//!
//! Both are owned by a single session and touched from one task, so
//! neither needs a lock. Times are milliseconds from the session clock.

use std::collections::{HashMap, VecDeque};

use pubchat_types::Address;

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Fixed-interval limiter keyed by sender.
#[derive(Debug)]
pub struct RateLimiter {
    interval_ms: i64,
    last_accepted: HashMap<Address, i64>,
}

impl RateLimiter {
    /// Creates a limiter allowing one frame per `interval_ms`.
    pub fn new(interval_ms: i64) -> Self {
        Self {
            interval_ms: interval_ms.max(0),
            last_accepted: HashMap::new(),
        }
    }

    /// Returns `true` and records `now_ms` if `sender` may send now.
    ///
    /// A sender accepted at `t` is refused until `t + interval_ms`.
    pub fn check(&mut self, sender: &Address, now_ms: i64) -> bool {
        if let Some(last) = self.last_accepted.get(sender) {
            if now_ms - last < self.interval_ms {
                return false;
            }
        }
        self.last_accepted.insert(sender.clone(), now_ms);
        true
    }

    /// Time of the last accepted frame from `sender`.
    pub fn last_accepted(&self, sender: &Address) -> Option<i64> {
        self.last_accepted.get(sender).copied()
    }

    /// Forgets every sender.
    pub fn clear(&mut self) {
        self.last_accepted.clear();
    }
}

// ---------------------------------------------------------------------------
// BurstDetector
// ---------------------------------------------------------------------------

/// Sliding-window frame counter keyed by sender.
#[derive(Debug)]
pub struct BurstDetector {
    window_ms: i64,
    max_frames: usize,
    windows: HashMap<Address, VecDeque<i64>>,
}

impl BurstDetector {
    /// Creates a detector that trips when a sender has more than
    /// `max_frames` frames within `window_ms`.
    pub fn new(window_ms: i64, max_frames: usize) -> Self {
        Self {
            window_ms: window_ms.max(1),
            max_frames: max_frames.max(1),
            windows: HashMap::new(),
        }
    }

    /// Counts one frame and returns `true` if the sender is now over the
    /// threshold.
    pub fn record(&mut self, sender: &Address, now_ms: i64) -> bool {
        let window = self.windows.entry(sender.clone()).or_default();
        window.push_back(now_ms);
        while let Some(&oldest) = window.front() {
            if now_ms - oldest < self.window_ms {
                break;
            }
            window.pop_front();
        }
        window.len() > self.max_frames
    }

    /// Frames currently in `sender`'s window.
    pub fn count(&self, sender: &Address) -> usize {
        self.windows.get(sender).map_or(0, VecDeque::len)
    }

    /// Drops a sender's window, e.g. once it has been blocked.
    pub fn forget(&mut self, sender: &Address) {
        self.windows.remove(sender);
    }

    /// Forgets every sender.
    pub fn clear(&mut self) {
        self.windows.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        match Address::new(s) {
            Ok(a) => a,
            Err(e) => panic!("test address: {e}"),
        }
    }

    #[test]
    fn one_per_interval() {
        let mut rl = RateLimiter::new(1000);
        let a = addr("lmn1a");
        assert!(rl.check(&a, 10_000));
        assert!(!rl.check(&a, 10_999));
        assert!(rl.check(&a, 11_000));
        assert_eq!(rl.last_accepted(&a), Some(11_000));
    }

    #[test]
    fn refused_frame_does_not_move_window() {
        let mut rl = RateLimiter::new(1000);
        let a = addr("lmn1a");
        assert!(rl.check(&a, 0));
        assert!(!rl.check(&a, 900));
        assert!(rl.check(&a, 1000));
    }

    #[test]
    fn senders_are_independent() {
        let mut rl = RateLimiter::new(1000);
        assert!(rl.check(&addr("lmn1a"), 0));
        assert!(rl.check(&addr("lmn1b"), 1));
    }

    #[test]
    fn eleventh_frame_in_window_trips() {
        let mut bd = BurstDetector::new(2000, 10);
        let a = addr("lmn1a");
        for i in 0..10 {
            assert!(!bd.record(&a, i * 100), "frame {i} tripped early");
        }
        assert!(bd.record(&a, 1000));
    }

    #[test]
    fn old_frames_slide_out() {
        let mut bd = BurstDetector::new(2000, 10);
        let a = addr("lmn1a");
        for i in 0..10 {
            bd.record(&a, i);
        }
        // Exactly one window later the first ten no longer count.
        assert!(!bd.record(&a, 2009));
        assert_eq!(bd.count(&a), 1);
    }

    #[test]
    fn clear_resets_everything() {
        let mut rl = RateLimiter::new(1000);
        let mut bd = BurstDetector::new(2000, 1);
        let a = addr("lmn1a");
        rl.check(&a, 0);
        bd.record(&a, 0);
        rl.clear();
        bd.clear();
        assert!(rl.check(&a, 1));
        assert_eq!(bd.count(&a), 0);
    }
}

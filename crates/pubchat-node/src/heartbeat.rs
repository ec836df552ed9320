//! Heartbeat schedule.
//!
//! While connected, a signed `ping` is due after an initial delay and
//! then once per interval. A due heartbeat is skipped when no peer has
//! been observed since connecting, or when the previous heartbeat went
//! out less than `interval - 500 ms` ago. Skipping still advances the
//! schedule to the next interval.

/// Slack subtracted from the interval when checking the last heartbeat.
const RECENT_SLACK_MS: i64 = 500;

/// What to do at a heartbeat check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HeartbeatDecision {
    /// Nothing is due yet.
    NotDue,
    /// Due, but nobody has been seen since connecting.
    SkipAlone,
    /// Due, but a heartbeat went out recently.
    SkipRecent,
    /// Publish a ping now.
    Send,
}

/// Per-connection heartbeat timer.
#[derive(Clone, Debug)]
pub struct HeartbeatSchedule {
    first_delay_ms: i64,
    interval_ms: i64,
    next_due_ms: Option<i64>,
    last_sent_ms: Option<i64>,
}

impl HeartbeatSchedule {
    /// Creates an idle schedule.
    pub fn new(first_delay_ms: u64, interval_ms: u64) -> Self {
        Self {
            first_delay_ms: i64::try_from(first_delay_ms).unwrap_or(i64::MAX),
            interval_ms: i64::try_from(interval_ms).unwrap_or(i64::MAX),
            next_due_ms: None,
            last_sent_ms: None,
        }
    }

    /// Arms the schedule for a connection made at `connected_at_ms`.
    pub fn start(&mut self, connected_at_ms: i64) {
        self.next_due_ms = Some(connected_at_ms.saturating_add(self.first_delay_ms));
        self.last_sent_ms = None;
    }

    /// Disarms the schedule.
    pub fn stop(&mut self) {
        self.next_due_ms = None;
    }

    /// Returns `true` while armed.
    pub fn is_armed(&self) -> bool {
        self.next_due_ms.is_some()
    }

    /// Checks the schedule at `now_ms`.
    ///
    /// A due check (anything other than [`HeartbeatDecision::NotDue`])
    /// moves the next due time one interval ahead.
    pub fn poll(&mut self, now_ms: i64, peer_observed: bool) -> HeartbeatDecision {
        let Some(due) = self.next_due_ms else {
            return HeartbeatDecision::NotDue;
        };
        if now_ms < due {
            return HeartbeatDecision::NotDue;
        }
        self.next_due_ms = Some(now_ms.saturating_add(self.interval_ms));

        if !peer_observed {
            return HeartbeatDecision::SkipAlone;
        }
        if let Some(last) = self.last_sent_ms {
            if now_ms - last < self.interval_ms - RECENT_SLACK_MS {
                return HeartbeatDecision::SkipRecent;
            }
        }
        HeartbeatDecision::Send
    }

    /// Records a published heartbeat.
    pub fn mark_sent(&mut self, now_ms: i64) {
        self.last_sent_ms = Some(now_ms);
    }

    /// Time of the last published heartbeat.
    pub fn last_sent(&self) -> Option<i64> {
        self.last_sent_ms
    }
}

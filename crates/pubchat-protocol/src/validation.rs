//! Field checks applied to decoded payloads.
//!
//! These run at ingress after decoding and, for message text, before
//! mining on the send path.

use pubchat_types::{PubchatError, Result, Topic};

use crate::codec::{Payload, FIELD_NICK, FIELD_NONCE, FIELD_ROOM, FIELD_TEXT, FIELD_TS};

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// Checks that the signed `room` equals the topic the frame arrived on.
///
/// # Errors
///
/// Returns [`PubchatError::InvalidPayload`] on mismatch.
pub fn validate_room(payload: &Payload, topic: &Topic) -> Result<()> {
    let room = payload.get(FIELD_ROOM).unwrap_or_default();
    if room != topic.as_str() {
        return Err(PubchatError::InvalidPayload {
            reason: format!("room '{room}' does not match topic '{topic}'"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Nonce
// ---------------------------------------------------------------------------

/// Returns the trimmed nonce if present and at most `max_len`
/// characters.
///
/// # Errors
///
/// Returns [`PubchatError::InvalidPayload`] when the nonce is missing,
/// blank or too long.
pub fn validate_nonce(payload: &Payload, max_len: usize) -> Result<String> {
    let nonce = payload.get(FIELD_NONCE).unwrap_or_default().trim();
    if nonce.is_empty() {
        return Err(PubchatError::InvalidPayload {
            reason: "nonce missing".into(),
        });
    }
    let len = nonce.chars().count();
    if len > max_len {
        return Err(PubchatError::InvalidPayload {
            reason: format!("nonce length {len} exceeds {max_len}"),
        });
    }
    Ok(nonce.to_string())
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Why message text was refused.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextDefect {
    /// Nothing left after trimming.
    Empty,
    /// Longer than the limit after trimming.
    TooLong {
        /// Trimmed length in characters.
        len: usize,
        /// Configured limit.
        max: usize,
    },
}

impl From<TextDefect> for PubchatError {
    fn from(defect: TextDefect) -> Self {
        match defect {
            TextDefect::Empty => PubchatError::InvalidPayload {
                reason: "message text is empty".into(),
            },
            TextDefect::TooLong { len, max } => PubchatError::InvalidPayload {
                reason: format!("message text is {len} characters, limit is {max}"),
            },
        }
    }
}

/// Trims message text and enforces the length limit.
pub fn normalize_text(raw: &str, max_len: usize) -> std::result::Result<String, TextDefect> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(TextDefect::Empty);
    }
    let len = text.chars().count();
    if len > max_len {
        return Err(TextDefect::TooLong { len, max: max_len });
    }
    Ok(text.to_string())
}

/// The `text` field of a `msg` payload, normalized.
pub fn payload_text(payload: &Payload, max_len: usize) -> std::result::Result<String, TextDefect> {
    normalize_text(payload.get(FIELD_TEXT).unwrap_or_default(), max_len)
}

// ---------------------------------------------------------------------------
// Advisory fields
// ---------------------------------------------------------------------------

/// Sender-claimed timestamp, or `fallback_ms` when absent, zero or not a
/// number. Display only.
pub fn claimed_timestamp(payload: &Payload, fallback_ms: i64) -> i64 {
    payload
        .get(FIELD_TS)
        .and_then(|ts| ts.trim().parse::<i64>().ok())
        .filter(|ts| *ts != 0)
        .unwrap_or(fallback_ms)
}

/// Sanitized nickname, if the payload carries a non-blank one.
pub fn claimed_nick(payload: &Payload) -> Option<String> {
    payload.get(FIELD_NICK).and_then(pubchat_types::sanitize_nick)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

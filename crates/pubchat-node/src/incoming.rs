//! Inbound frame processing.
//!
//! Raw bytes from the subscription pass two stages:
//!
//! 1. [`screen_frame`] — stateless checks, cheapest first: JSON shape,
//!    payload decoding, wire/payload type agreement, room, nonce, frame
//!    type, proof-of-work, then the bridge signature check. Produces the
//!    canonical (derived) sender address.
//! 2. [`ChatSession::handle_frame`] — session state: message-id dedup
//!    (this connection's ids, then the stored history), blocklist, nonce
//!    history, burst detector, rate limiter, and for `msg` frames the
//!    text checks. Only a frame that passes all of them updates the
//!    nickname directory.
//!
//! Nothing here returns an error to the transport. Every rejection is a
//! [`DropReason`] counted in [`RxStats`].

use std::fmt;

use pubchat_protocol::codec::{decode_payload, Payload};
use pubchat_protocol::frame::{FrameDefect, WireFrame};
use pubchat_protocol::pow::has_valid_pow;
use pubchat_protocol::signing::canonical_address;
use pubchat_protocol::validation::{
    claimed_nick, claimed_timestamp, payload_text, validate_nonce, validate_room, TextDefect,
};
use pubchat_types::config::ChatConfig;
use pubchat_types::{Address, BlockReason, ChatEvent, ChatMessage, FrameKind, MessageId, Topic};

use crate::bridge::HostBridge;
use crate::session::ChatSession;
use crate::spam_filter::FilterResult;

// ---------------------------------------------------------------------------
// DropReason
// ---------------------------------------------------------------------------

/// Why an inbound frame was not accepted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DropReason {
    /// Not a JSON object.
    BadJson,
    /// Payload, address, key or signature missing.
    MissingFields,
    /// Payload is not a canonical payload string.
    BadPayload,
    /// Wire `type` disagrees with the signed payload type.
    KindMismatch,
    /// Payload room is not the subscribed topic.
    WrongRoom,
    /// Nonce missing or too long.
    BadNonce,
    /// Not `msg`, `ping` or `profile`.
    UnknownType,
    /// Payload hash below the difficulty.
    BadPow,
    /// Signature invalid or verification failed.
    BadSig,
    /// Message id already handled in this session.
    Duplicate,
    /// Sender is on the blocklist.
    Blocked,
    /// Sender reused a recent nonce.
    NonceReplay,
    /// Sender crossed the burst threshold and was blocked.
    AutoBlocked,
    /// Sender already had a frame accepted within the interval.
    RateLimited,
    /// `msg` with blank text.
    EmptyText,
    /// `msg` text over the limit.
    TextTooLong,
}

impl DropReason {
    /// Stable diagnostic name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadJson => "bad_json",
            Self::MissingFields => "missing_fields",
            Self::BadPayload => "bad_payload",
            Self::KindMismatch => "kind_mismatch",
            Self::WrongRoom => "wrong_room",
            Self::BadNonce => "bad_nonce",
            Self::UnknownType => "unknown_type",
            Self::BadPow => "bad_pow",
            Self::BadSig => "bad_sig",
            Self::Duplicate => "duplicate",
            Self::Blocked => "blocked",
            Self::NonceReplay => "nonce_replay",
            Self::AutoBlocked => "auto_blocked",
            Self::RateLimited => "rate_limited",
            Self::EmptyText => "empty_text",
            Self::TextTooLong => "text_too_long",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FrameDefect> for DropReason {
    fn from(defect: FrameDefect) -> Self {
        match defect {
            FrameDefect::NotJson => Self::BadJson,
            FrameDefect::MissingFields => Self::MissingFields,
        }
    }
}

impl From<TextDefect> for DropReason {
    fn from(defect: TextDefect) -> Self {
        match defect {
            TextDefect::Empty => Self::EmptyText,
            TextDefect::TooLong { .. } => Self::TextTooLong,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome and statistics
// ---------------------------------------------------------------------------

/// Result of handling one inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum IngressOutcome {
    /// Frame accepted.
    Accepted {
        /// Frame type.
        kind: FrameKind,
        /// Canonical sender.
        sender: Address,
        /// The new message, for `msg` frames.
        message: Option<ChatMessage>,
    },
    /// Frame rejected.
    Dropped(DropReason),
    /// The session moved on while the frame was being verified.
    Stale,
}

/// Receive diagnostics, reset on every connect.
///
/// Duplicates and stale frames count towards `total` only.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RxStats {
    /// Frames received.
    pub total: u64,
    /// Frames accepted.
    pub accepted: u64,
    /// Frames dropped.
    pub dropped: u64,
    /// Reason of the most recent drop.
    pub last_drop: Option<DropReason>,
}

impl RxStats {
    /// Counts one outcome.
    pub fn record(&mut self, outcome: &IngressOutcome) {
        self.total += 1;
        match outcome {
            IngressOutcome::Accepted { .. } => self.accepted += 1,
            IngressOutcome::Dropped(DropReason::Duplicate) | IngressOutcome::Stale => {}
            IngressOutcome::Dropped(reason) => {
                self.dropped += 1;
                self.last_drop = Some(*reason);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stage 1: stateless screening
// ---------------------------------------------------------------------------

/// A frame that passed every stateless check.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedFrame {
    /// Frame type from the signed payload.
    pub kind: FrameKind,
    /// Decoded payload.
    pub payload: Payload,
    /// Address derived from the signature.
    pub sender: Address,
    /// Trimmed payload nonce.
    pub nonce: String,
}

/// Runs the stateless checks on raw frame bytes.
///
/// # Errors
///
/// The first failing check, as a [`DropReason`].
pub async fn screen_frame(
    bytes: &[u8],
    topic: &Topic,
    config: &ChatConfig,
    bridge: &dyn HostBridge,
) -> Result<VerifiedFrame, DropReason> {
    let frame = WireFrame::parse(bytes)?;
    let payload = decode_payload(&frame.payload).map_err(|_| DropReason::BadPayload)?;

    if !frame.kind.is_empty() && frame.kind != payload.kind() {
        return Err(DropReason::KindMismatch);
    }
    validate_room(&payload, topic).map_err(|_| DropReason::WrongRoom)?;
    let nonce = validate_nonce(&payload, config.max_nonce_len).map_err(|_| DropReason::BadNonce)?;
    let kind: FrameKind = payload.kind().parse().map_err(|_| DropReason::UnknownType)?;

    if !has_valid_pow(&frame.payload, config.pow_difficulty) {
        return Err(DropReason::BadPow);
    }

    let outcome = bridge
        .verify(
            &frame.payload,
            &frame.signature,
            &frame.public_key,
            &frame.sender_address,
        )
        .await
        .map_err(|e| {
            tracing::debug!(%e, "bridge verify failed");
            DropReason::BadSig
        })?;
    let sender =
        canonical_address(&outcome, &frame.sender_address).map_err(|_| DropReason::BadSig)?;

    Ok(VerifiedFrame {
        kind,
        payload,
        sender,
        nonce,
    })
}

// ---------------------------------------------------------------------------
// Stage 2: session admission
// ---------------------------------------------------------------------------

impl ChatSession {
    /// Processes one raw frame from the subscription.
    pub async fn handle_frame(&mut self, bytes: &[u8]) -> IngressOutcome {
        let outcome = match self.topic.clone() {
            None => IngressOutcome::Dropped(DropReason::WrongRoom),
            Some(topic) => {
                let generation = self.generation.current();
                let screened =
                    screen_frame(bytes, &topic, &self.config, self.bridge.as_ref()).await;
                match screened {
                    Err(reason) => IngressOutcome::Dropped(reason),
                    Ok(_) if !self.generation.is_current(generation) => IngressOutcome::Stale,
                    Ok(frame) => self.admit(frame, topic),
                }
            }
        };

        self.rx_stats.record(&outcome);
        if let IngressOutcome::Dropped(reason) = &outcome {
            tracing::debug!(reason = reason.as_str(), "dropped frame");
        }
        outcome
    }

    fn admit(&mut self, frame: VerifiedFrame, topic: Topic) -> IngressOutcome {
        let now = self.clock.now_ms();
        let sender = frame.sender;

        let id = MessageId::new(&sender, &frame.nonce);
        if !self.replay.first_sighting(&id) || self.is_stored(&topic, &id) {
            return IngressOutcome::Dropped(DropReason::Duplicate);
        }
        if self.blocklist.is_blocked(&sender) {
            return IngressOutcome::Dropped(DropReason::Blocked);
        }
        if !self.replay.record_nonce(&sender, &frame.nonce) {
            return IngressOutcome::Dropped(DropReason::NonceReplay);
        }

        let nick = claimed_nick(&frame.payload);
        let is_self = self.identity.as_ref().is_some_and(|i| i.address == sender);
        match self.spam.check(&sender, now) {
            FilterResult::Accept => {}
            FilterResult::Burst if is_self => {
                return IngressOutcome::Dropped(DropReason::RateLimited);
            }
            FilterResult::Burst => {
                tracing::info!(%sender, "burst threshold exceeded");
                self.block_sender(&sender, nick.as_deref(), BlockReason::AutoSpam);
                return IngressOutcome::Dropped(DropReason::AutoBlocked);
            }
            FilterResult::RateLimited => {
                return IngressOutcome::Dropped(DropReason::RateLimited);
            }
        }

        if !is_self {
            self.last_remote_seen_ms = Some(now);
        }

        let message = match frame.kind {
            FrameKind::Ping | FrameKind::Profile => None,
            FrameKind::Msg => match payload_text(&frame.payload, self.config.max_text_len) {
                Ok(text) => Some(ChatMessage {
                    id,
                    topic,
                    sender: sender.clone(),
                    text,
                    timestamp_ms: claimed_timestamp(&frame.payload, now),
                }),
                Err(defect) => return IngressOutcome::Dropped(defect.into()),
            },
        };

        // Accepted from here on.
        if let Some(nick) = &nick {
            if let Some(changed) = self.directory.observe(&sender, nick, now) {
                self.emit(ChatEvent::NicknameChanged {
                    address: sender.clone(),
                    nickname: changed,
                });
            }
        }
        if let Some(msg) = &message {
            self.accept_message(msg.clone());
        }

        IngressOutcome::Accepted {
            kind: frame.kind,
            sender,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

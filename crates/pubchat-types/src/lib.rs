//! Core shared types for the pubchat signed pub/sub chat protocol.
//!
//! This crate defines all fundamental types used across the workspace.
//! No other crate should define shared types — everything lives here.

pub mod config;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum nickname length in characters.
pub const MAX_NICK_LEN: usize = 22;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Account address as reported by the host bridge.
///
/// Addresses are opaque strings (typically Bech32). Downstream of
/// signature verification the only trusted address is the one the
/// bridge *derived* from the signature, never a caller-claimed one.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Creates an `Address`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`PubchatError::InvalidAddress`] if the trimmed value is
    /// empty or contains the payload delimiter `|` or the id separator
    /// `:`.
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(PubchatError::InvalidAddress {
                reason: "address is empty".into(),
            });
        }
        if trimmed.contains(['|', ':']) {
            return Err(PubchatError::InvalidAddress {
                reason: format!("address contains a reserved character: {trimmed}"),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines and toasts: `abcdefg…vwxyz`.
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 16 {
            return self.0.clone();
        }
        let head: String = chars[..7].iter().collect();
        let tail: String = chars[chars.len() - 5..].iter().collect();
        format!("{head}…{tail}")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = PubchatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Message identifier: `sender_address ":" nonce`.
///
/// Unique within a topic for the lifetime of the durable store.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Builds the id for a frame from its canonical sender and nonce.
    pub fn new(sender: &Address, nonce: &str) -> Self {
        Self(format!("{}:{}", sender.as_str(), nonce))
    }

    /// Returns the id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// A named publish/subscribe channel: namespace prefix plus the
/// lower-cased room identifier.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    /// Builds the topic for `room` under `prefix`.
    ///
    /// The room is trimmed and lower-cased; an empty room falls back to
    /// `lobby`.
    pub fn for_room(prefix: &str, room: &str) -> Self {
        let room = room.trim().to_lowercase();
        let room = if room.is_empty() { "lobby".to_string() } else { room };
        Self(format!("{prefix}{room}"))
    }

    /// Wraps an already-formed topic string.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the topic string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// FrameKind
// ---------------------------------------------------------------------------

/// Application-level frame type carried in the payload type tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// A chat message with a `text` field.
    Msg,
    /// A liveness heartbeat.
    Ping,
    /// A nickname announcement.
    Profile,
}

impl FrameKind {
    /// The type tag as it appears on the wire and in the payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Msg => "msg",
            Self::Ping => "ping",
            Self::Profile => "profile",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameKind {
    type Err = PubchatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "msg" => Ok(Self::Msg),
            "ping" => Ok(Self::Ping),
            "profile" => Ok(Self::Profile),
            other => Err(PubchatError::InvalidFrame {
                reason: format!("unknown frame type '{other}'"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// BlockReason
// ---------------------------------------------------------------------------

/// Why an address was put on a topic's blocklist.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Blocked by the local user.
    Manual,
    /// Blocked by the abuse detector after a frame burst.
    AutoSpam,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::AutoSpam => write!(f, "auto_spam"),
        }
    }
}

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// An accepted chat message. Immutable once created.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `sender:nonce`.
    pub id: MessageId,
    /// Topic the message was published on.
    pub topic: Topic,
    /// Canonical (derived) sender address.
    pub sender: Address,
    /// Trimmed message text.
    pub text: String,
    /// Sender-claimed timestamp in ms since epoch. Display only.
    pub timestamp_ms: i64,
}

// ---------------------------------------------------------------------------
// Nicknames
// ---------------------------------------------------------------------------

/// Trims a nickname and truncates it to [`MAX_NICK_LEN`] characters.
///
/// Returns `None` when nothing is left.
pub fn sanitize_nick(raw: &str) -> Option<String> {
    let nick: String = raw.trim().chars().take(MAX_NICK_LEN).collect();
    let nick = nick.trim_end().to_string();
    if nick.is_empty() {
        None
    } else {
        Some(nick)
    }
}

// ---------------------------------------------------------------------------
// ChatEvent
// ---------------------------------------------------------------------------

/// Events emitted by the chat node to UI consumers.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    /// Subscription established.
    Connected {
        /// Topic now active.
        topic: Topic,
        /// Local account address.
        address: Address,
    },
    /// Subscription torn down.
    Disconnected,
    /// A message entered the active view (remote or local echo).
    MessageAdded(ChatMessage),
    /// An address was blocked; its messages left the view.
    SenderBlocked {
        /// Blocked address.
        address: Address,
        /// Manual or automatic.
        reason: BlockReason,
    },
    /// An address was unblocked.
    SenderUnblocked {
        /// Unblocked address.
        address: Address,
    },
    /// A nickname changed in the directory.
    NicknameChanged {
        /// Address whose nickname changed.
        address: Address,
        /// New nickname.
        nickname: String,
    },
    /// A connect attempt failed; prior state was left intact.
    ConnectFailed {
        /// User-visible reason.
        reason: String,
    },
    /// A send or profile broadcast failed.
    SendFailed {
        /// User-visible reason.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// PubchatError
// ---------------------------------------------------------------------------

/// Central error type for the pubchat system.
///
/// All crates in the workspace convert their internal errors into variants
/// of this enum, ensuring a unified error handling surface.
#[derive(Debug, Error)]
pub enum PubchatError {
    /// The provided address is malformed.
    #[error("invalid address: {reason}")]
    InvalidAddress {
        /// Human-readable description of why the address is invalid.
        reason: String,
    },

    /// A payload string is not a valid canonical encoding or carries an
    /// out-of-range field.
    #[error("invalid payload: {reason}")]
    InvalidPayload {
        /// Human-readable description of the payload failure.
        reason: String,
    },

    /// A wire frame is malformed or of an unknown type.
    #[error("invalid frame: {reason}")]
    InvalidFrame {
        /// Human-readable description of the frame failure.
        reason: String,
    },

    /// A cryptographic operation failed.
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Human-readable description of the cryptographic failure.
        reason: String,
    },

    /// A host bridge capability is missing or returned an error.
    #[error("bridge error: {reason}")]
    BridgeError {
        /// Human-readable description of the bridge failure.
        reason: String,
    },

    /// A storage or database operation failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// A protocol-level error (proof-of-work, session state).
    #[error("protocol error: {reason}")]
    ProtocolError {
        /// Human-readable description of the protocol failure.
        reason: String,
    },

    /// The local client tried to send faster than the self-throttle.
    #[error("rate limit exceeded: {reason}")]
    RateLimitExceeded {
        /// Human-readable description including the limit.
        reason: String,
    },

    /// The operation needs an active subscription.
    #[error("not connected: {reason}")]
    NotConnected {
        /// Human-readable description of what was attempted.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`PubchatError`].
pub type Result<T> = std::result::Result<T, PubchatError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! JSON wire frame.
//!
//! One frame per published message:
//!
//! ```json
//! {"type":"msg","senderAddress":"lmn1...","publicKey":"...","signature":"...","payload":"pubsub_chat|v1|msg|..."}
//! ```
//!
//! `publicKey` and `signature` are opaque strings produced by the host
//! bridge. Only `payload` is signed; the wire `type` is a routing hint
//! and the payload's type tag is authoritative.

use serde::{Deserialize, Serialize};

use pubchat_types::{PubchatError, Result};

/// A frame as published on a topic.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireFrame {
    /// Frame type hint (`msg`, `ping`, `profile`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Address the sender claims to sign with.
    pub sender_address: String,
    /// Bridge-encoded public key.
    pub public_key: String,
    /// Bridge-encoded signature over `payload`.
    pub signature: String,
    /// Canonical payload string.
    pub payload: String,
}

/// Why raw bytes could not be turned into a usable [`WireFrame`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameDefect {
    /// Not a JSON object of the expected shape.
    NotJson,
    /// One of `payload`, `senderAddress`, `publicKey`, `signature` is
    /// empty or absent.
    MissingFields,
}

impl WireFrame {
    /// Parses raw bytes delivered by a subscription.
    ///
    /// Address, key and signature are trimmed; the payload is kept
    /// byte-for-byte since it is what the signature covers.
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, FrameDefect> {
        let mut frame: Self = serde_json::from_slice(bytes).map_err(|_| FrameDefect::NotJson)?;
        frame.kind = frame.kind.trim().to_string();
        frame.sender_address = frame.sender_address.trim().to_string();
        frame.public_key = frame.public_key.trim().to_string();
        frame.signature = frame.signature.trim().to_string();

        if frame.payload.is_empty()
            || frame.sender_address.is_empty()
            || frame.public_key.is_empty()
            || frame.signature.is_empty()
        {
            return Err(FrameDefect::MissingFields);
        }
        Ok(frame)
    }

    /// Serializes the frame for publishing.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| PubchatError::InvalidFrame {
            reason: format!("failed to serialize frame: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

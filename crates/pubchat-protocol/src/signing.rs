//! Signature adapter.
//!
//! Signing and verification are delegated to the host bridge; this
//! module fixes *what* is signed and *which* address is trusted.
//!
//! # Signed field set
//!
//! Every frame signs `room`, `ts`, `addr`, `nick` and the mined
//! `nonce`, plus `text` for `msg` frames. The signature covers the full
//! canonical payload string.
//!
//! # Canonical address
//!
//! The address used downstream is the one the bridge *derived* from
//! the signature. The caller-claimed `senderAddress` is only a fallback
//! for bridges that do not report a derived address.

use std::collections::BTreeMap;

use pubchat_types::{Address, FrameKind, PubchatError, Result, Topic};

use crate::codec::{FIELD_ADDR, FIELD_NICK, FIELD_ROOM, FIELD_TS};
use crate::frame::WireFrame;

/// Signature scheme identifier passed to the bridge.
pub const SIGNATURE_SCHEME: &str = "ADR-036";

/// Nickname signed when the local one is blank.
pub const FALLBACK_NICK: &str = "anon";

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Builds the common signed fields for an outbound frame.
///
/// The nickname is trimmed and cut to the maximum length; a blank
/// nickname is signed as [`FALLBACK_NICK`].
pub fn base_fields(topic: &Topic, ts_ms: i64, address: &Address, nick: &str) -> BTreeMap<String, String> {
    let nick = pubchat_types::sanitize_nick(nick).unwrap_or_else(|| FALLBACK_NICK.to_string());
    let mut fields = BTreeMap::new();
    fields.insert(FIELD_ROOM.to_string(), topic.as_str().to_string());
    fields.insert(FIELD_TS.to_string(), ts_ms.to_string());
    fields.insert(FIELD_ADDR.to_string(), address.as_str().to_string());
    fields.insert(FIELD_NICK.to_string(), nick);
    fields
}

/// A bridge signature over a payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PayloadSignature {
    /// Address the bridge signed with.
    pub address: Address,
    /// Bridge-encoded public key.
    pub public_key: String,
    /// Bridge-encoded signature.
    pub signature: String,
}

/// Assembles the wire frame for a signed payload.
pub fn build_frame(kind: FrameKind, payload: String, signature: PayloadSignature) -> WireFrame {
    WireFrame {
        kind: kind.as_str().to_string(),
        sender_address: signature.address.as_str().to_string(),
        public_key: signature.public_key,
        signature: signature.signature,
        payload,
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Outcome of a bridge verification.
///
/// The three values are independent: a valid signature may still come
/// with a claimed address that does not match.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VerifyOutcome {
    /// The signature is cryptographically valid for the payload and key.
    pub signature_valid: bool,
    /// The claimed address matches the key's derived address.
    pub address_matches: bool,
    /// Address derived from the public key. May be empty.
    pub derived_address: String,
}

/// Resolves the canonical sender address.
///
/// # Errors
///
/// - [`PubchatError::CryptoError`] if the signature is not valid,
///   whatever the address match says.
/// - [`PubchatError::InvalidAddress`] if neither the derived nor the
///   claimed address is usable.
pub fn canonical_address(outcome: &VerifyOutcome, claimed: &str) -> Result<Address> {
    if !outcome.signature_valid {
        return Err(PubchatError::CryptoError {
            reason: "signature is not valid".into(),
        });
    }

    let derived = outcome.derived_address.trim();
    if derived.is_empty() {
        Address::new(claimed)
    } else {
        Address::new(derived)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

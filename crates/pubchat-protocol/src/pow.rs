//! Proof-of-Work admission control.
//!
//! Every frame carries a mined `nonce` field. A payload is admissible
//! when `SHA-256(payload)` has at least `difficulty` leading zero bits.
//!
//! # Algorithm
//!
//! ```text
//! loop:
//!     nonce   = random_hex(16)
//!     payload = encode(type, base_fields + {nonce})
//!     if leading_zero_bits(SHA-256(payload)) >= difficulty: done
//! ```
//!
//! Verification is a single hash. Mining has no attempt limit; at the
//! default 12 bits it takes 4096 attempts on average (geometric
//! distribution, so ~1% of runs exceed 18 900 attempts).
//!
//! # Difficulty cap
//!
//! Difficulty is capped at [`MAX_DIFFICULTY`] (24 bits) to bound the
//! expected mining cost.

use std::collections::BTreeMap;

use pubchat_crypto::hash::{leading_zero_bits, sha256};
use pubchat_crypto::random::random_hex;
use pubchat_types::{PubchatError, Result};

use crate::codec::{encode_payload, FIELD_NONCE};

/// Maximum allowed PoW difficulty in leading zero bits.
pub const MAX_DIFFICULTY: u8 = 24;

/// Default difficulty.
pub const DEFAULT_DIFFICULTY: u8 = 12;

/// Hex characters in a mined nonce.
pub const NONCE_HEX_LEN: usize = 16;

// ---------------------------------------------------------------------------
// MinedPayload
// ---------------------------------------------------------------------------

/// Result of a successful mining run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MinedPayload {
    /// Canonical payload including the winning nonce.
    pub payload: String,
    /// The winning nonce.
    pub nonce: String,
    /// Number of hashes computed, including the winning one.
    pub attempts: u64,
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Returns `true` when the payload hash meets `difficulty`.
pub fn has_valid_pow(payload: &str, difficulty: u8) -> bool {
    leading_zero_bits(&sha256(payload.as_bytes())) >= u32::from(difficulty)
}

// ---------------------------------------------------------------------------
// Mining
// ---------------------------------------------------------------------------

/// Mines a payload of type `kind` over `base_fields`.
///
/// Any `nonce` in `base_fields` is replaced. The task yields to the
/// runtime every `yield_every` attempts so that other tasks keep
/// running while this one searches.
///
/// # Errors
///
/// Returns [`PubchatError::ProtocolError`] if `difficulty` exceeds
/// [`MAX_DIFFICULTY`].
pub async fn mine_payload(
    kind: &str,
    base_fields: &BTreeMap<String, String>,
    difficulty: u8,
    yield_every: u32,
) -> Result<MinedPayload> {
    if difficulty > MAX_DIFFICULTY {
        return Err(PubchatError::ProtocolError {
            reason: format!("PoW difficulty {difficulty} exceeds maximum {MAX_DIFFICULTY}"),
        });
    }

    let yield_every = u64::from(yield_every.max(1));
    let mut fields = base_fields.clone();
    let mut attempts: u64 = 0;

    loop {
        let nonce = random_hex(NONCE_HEX_LEN);
        fields.insert(FIELD_NONCE.to_string(), nonce.clone());
        let payload = encode_payload(kind, &fields);
        attempts += 1;

        if has_valid_pow(&payload, difficulty) {
            tracing::trace!(kind, attempts, "mined payload");
            return Ok(MinedPayload {
                payload,
                nonce,
                attempts,
            });
        }

        if attempts % yield_every == 0 {
            tokio::task::yield_now().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_payload;

    fn base() -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("room".to_string(), "lumen/pubsub_chat/v1/lobby".to_string());
        fields.insert("text".to_string(), "hi".to_string());
        fields
    }

    #[test]
    fn difficulty_zero_always_valid() {
        assert!(has_valid_pow("anything", 0));
    }

    #[test]
    fn known_payload_fails_high_difficulty() {
        // SHA-256("abc") starts with 0xba.
        assert!(!has_valid_pow("abc", 1));
    }

    #[tokio::test]
    async fn mined_payload_verifies() -> std::result::Result<(), PubchatError> {
        let mined = mine_payload("msg", &base(), 8, 64).await?;
        assert!(has_valid_pow(&mined.payload, 8));
        assert!(mined.attempts >= 1);
        assert_eq!(mined.nonce.len(), NONCE_HEX_LEN);

        let decoded = decode_payload(&mined.payload)?;
        assert_eq!(decoded.get("nonce"), Some(mined.nonce.as_str()));
        assert_eq!(decoded.get("text"), Some("hi"));
        Ok(())
    }

    #[tokio::test]
    async fn tampered_payload_fails_pow() -> std::result::Result<(), PubchatError> {
        let mined = mine_payload("msg", &base(), 16, 64).await?;
        let tampered = mined.payload.replace("text=hi", "text=ho");
        // 2^-16 chance that the tampered payload also qualifies.
        assert!(!has_valid_pow(&tampered, 16));
        Ok(())
    }

    #[tokio::test]
    async fn difficulty_exceeds_max_rejected() {
        let result = mine_payload("msg", &base(), MAX_DIFFICULTY + 1, 64).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn existing_nonce_is_replaced() -> std::result::Result<(), PubchatError> {
        let mut fields = base();
        fields.insert("nonce".to_string(), "stale".to_string());
        let mined = mine_payload("ping", &fields, 4, 64).await?;
        assert_ne!(mined.nonce, "stale");
        Ok(())
    }
}

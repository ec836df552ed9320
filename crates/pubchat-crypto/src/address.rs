//! Bech32 account addresses.
//!
//! An address is the Bech32 encoding (prefix `lmn`) of the first 20
//! bytes of `SHA-256(public_key)`. Bech32 carries its own checksum, so a
//! mistyped address fails to decode.

use bech32::{FromBase32, ToBase32, Variant};
use pubchat_types::{Address, PubchatError, Result};

use crate::hash::sha256;

/// Human-readable prefix for pubchat account addresses.
pub const ADDRESS_HRP: &str = "lmn";

/// Number of hash bytes carried in an address.
pub const ADDRESS_HASH_LEN: usize = 20;

/// Encodes a 20-byte account hash as a Bech32 address.
pub fn encode_address(hash: &[u8; ADDRESS_HASH_LEN]) -> Result<Address> {
    let encoded = bech32::encode(ADDRESS_HRP, hash.to_base32(), Variant::Bech32).map_err(|e| {
        PubchatError::CryptoError {
            reason: format!("bech32 encoding failed: {e}"),
        }
    })?;
    Address::new(encoded)
}

/// Decodes a Bech32 address back into its 20-byte account hash.
///
/// # Errors
///
/// Returns [`PubchatError::InvalidAddress`] when the string is not valid
/// Bech32, carries a different prefix, or has the wrong length.
pub fn decode_address(address: &Address) -> Result<[u8; ADDRESS_HASH_LEN]> {
    let (hrp, data, _variant) =
        bech32::decode(address.as_str()).map_err(|e| PubchatError::InvalidAddress {
            reason: format!("bech32 decoding failed: {e}"),
        })?;

    if hrp != ADDRESS_HRP {
        return Err(PubchatError::InvalidAddress {
            reason: format!("expected HRP '{ADDRESS_HRP}', got '{hrp}'"),
        });
    }

    let bytes = Vec::<u8>::from_base32(&data).map_err(|e| PubchatError::InvalidAddress {
        reason: format!("bech32 base32 conversion failed: {e}"),
    })?;

    if bytes.len() != ADDRESS_HASH_LEN {
        return Err(PubchatError::InvalidAddress {
            reason: format!("expected {ADDRESS_HASH_LEN} bytes, got {}", bytes.len()),
        });
    }

    let mut out = [0u8; ADDRESS_HASH_LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Derives the account address for a raw Ed25519 public key.
pub fn address_for_public_key(public_key: &[u8; 32]) -> Result<Address> {
    let digest = sha256(public_key);
    let mut hash = [0u8; ADDRESS_HASH_LEN];
    hash.copy_from_slice(&digest[..ADDRESS_HASH_LEN]);
    encode_address(&hash)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() -> std::result::Result<(), PubchatError> {
        let hash = [0x55; ADDRESS_HASH_LEN];
        let addr = encode_address(&hash)?;
        assert!(addr.as_str().starts_with("lmn1"));
        assert_eq!(decode_address(&addr)?, hash);
        Ok(())
    }

    #[test]
    fn wrong_hrp_rejected() -> std::result::Result<(), PubchatError> {
        let hash = [0x55; ADDRESS_HASH_LEN];
        let encoded = bech32::encode("cosmos", hash.to_base32(), Variant::Bech32).map_err(|e| {
            PubchatError::CryptoError {
                reason: e.to_string(),
            }
        })?;
        let addr = Address::new(encoded)?;
        assert!(decode_address(&addr).is_err());
        Ok(())
    }

    #[test]
    fn corrupted_address_rejected() -> std::result::Result<(), PubchatError> {
        let addr = encode_address(&[0x77; ADDRESS_HASH_LEN])?;
        let mut chars: Vec<char> = addr.as_str().chars().collect();
        chars[10] = if chars[10] == 'q' { 'p' } else { 'q' };
        let corrupted = Address::new(chars.into_iter().collect::<String>())?;
        assert!(decode_address(&corrupted).is_err());
        Ok(())
    }

    #[test]
    fn public_key_address_is_deterministic() -> std::result::Result<(), PubchatError> {
        let pk = [0x42u8; 32];
        assert_eq!(address_for_public_key(&pk)?, address_for_public_key(&pk)?);
        assert_ne!(address_for_public_key(&pk)?, address_for_public_key(&[0x43u8; 32])?);
        Ok(())
    }
}

//! SHA-256 hashing and leading-zero-bit counting.
//!
//! Proof-of-work in pubchat is measured as the number of leading zero
//! bits of `SHA-256(payload)`. Bits are counted most significant first,
//! starting at byte 0.

use sha2::{Digest, Sha256};

/// Computes the SHA-256 hash of arbitrary data.
///
/// Returns a fixed 32-byte digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// Lowercase hex of `SHA-256(data)`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Counts leading zero bits, MSB-first from byte 0.
pub fn leading_zero_bits(bytes: &[u8]) -> u32 {
    let mut count = 0u32;
    for &b in bytes {
        if b == 0 {
            count += 8;
            continue;
        }
        count += b.leading_zeros();
        break;
    }
    count
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Random hex strings for frame nonces and default nicknames.

use rand::rngs::OsRng;
use rand::RngCore;

/// Returns `len` lowercase hex characters drawn from OS entropy.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len.div_ceil(2)];
    OsRng.fill_bytes(&mut bytes);
    let mut out = hex::encode(bytes);
    out.truncate(len);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hex_has_requested_length() {
        for len in [0, 3, 16, 17] {
            let s = random_hex(len);
            assert_eq!(s.len(), len);
            assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn random_hex_differs() {
        assert_ne!(random_hex(16), random_hex(16));
    }
}

//! Opaque identifier generation and secret digest primitives.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// 32 symbols, so each character carries exactly 5 bits. Ambiguous glyphs
/// (`0`, `1`, `l`, `o`) are excluded to keep tokens transcribable.
const ALPHABET: &[u8; 32] = b"abcdefghijkmnpqrstuvwxyz23456789";

/// 32 chars x 5 bits = 160 bits of entropy.
const OPAQUE_ID_LEN: usize = 32;

pub const SECRET_DIGEST_BYTES: usize = 32;

/// Generate a fixed-length unguessable identifier from the OS CSPRNG.
pub fn generate_opaque_id() -> String {
    let mut bytes = [0u8; OPAQUE_ID_LEN];
    OsRng.fill_bytes(&mut bytes);

    let mut id = String::with_capacity(OPAQUE_ID_LEN);
    for byte in bytes {
        id.push(ALPHABET[(byte >> 3) as usize] as char);
    }
    id
}

/// One-way digest of a session secret.
pub fn hash_secret(secret: &str) -> [u8; SECRET_DIGEST_BYTES] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// Hex form of [`hash_secret`], the representation stored in the database.
pub fn hash_secret_hex(secret: &str) -> String {
    hex::encode(hash_secret(secret))
}

/// Compare two byte sequences in time independent of where they first
/// differ. A length mismatch returns false without touching the contents.
pub fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_id_has_fixed_length_and_alphabet() {
        let id = generate_opaque_id();
        assert_eq!(id.len(), OPAQUE_ID_LEN);
        assert!(id.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn opaque_ids_do_not_repeat() {
        let a = generate_opaque_id();
        let b = generate_opaque_id();
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_deterministic_and_input_sensitive() {
        assert_eq!(hash_secret("secret"), hash_secret("secret"));
        assert_ne!(hash_secret("secret"), hash_secret("secreu"));
        assert_eq!(hash_secret("secret").len(), SECRET_DIGEST_BYTES);
    }

    #[test]
    fn digest_never_equals_plaintext() {
        let secret = "abcdefghijkmnpqrstuvwxyz23456789";
        assert_ne!(&hash_secret(secret)[..], secret.as_bytes());
    }

    #[test]
    fn constant_time_equal_is_reflexive_and_commutative() {
        let a = [1u8, 2, 3, 4];
        let b = [1u8, 2, 3, 5];
        assert!(constant_time_equal(&a, &a));
        assert_eq!(constant_time_equal(&a, &b), constant_time_equal(&b, &a));
        assert!(!constant_time_equal(&a, &b));
    }

    #[test]
    fn constant_time_equal_rejects_length_mismatch() {
        assert!(!constant_time_equal(b"abc", b"abcd"));
        assert!(constant_time_equal(b"", b""));
    }
}

//! CSRF-state and PKCE artifacts for the authorization-code flow.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Raw entropy per verifier before encoding (RFC 7636 requires >= 32).
pub const VERIFIER_BYTES: usize = 32;

fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Single-use CSRF state for the login redirect.
pub fn generate_state() -> String {
    random_urlsafe(32)
}

/// PKCE code verifier: 32 random bytes, URL-safe base64, no padding.
pub fn generate_verifier() -> String {
    random_urlsafe(VERIFIER_BYTES)
}

/// S256 code challenge: unpadded base64url of the verifier's SHA-256.
pub fn challenge_s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_has_at_least_32_raw_bytes() {
        let verifier = generate_verifier();
        let raw = URL_SAFE_NO_PAD.decode(&verifier).unwrap();
        assert!(raw.len() >= 32);
    }

    #[test]
    fn test_verifier_is_unpadded_urlsafe() {
        let verifier = generate_verifier();
        assert!(!verifier.contains('='));
        assert!(!verifier.contains('+'));
        assert!(!verifier.contains('/'));
    }

    #[test]
    fn test_challenge_is_sha256_of_verifier() {
        let verifier = generate_verifier();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        assert_eq!(challenge_s256(&verifier), expected);
        assert!(!challenge_s256(&verifier).contains('='));
    }

    #[test]
    fn test_generated_values_are_unique() {
        assert_ne!(generate_state(), generate_state());
        assert_ne!(generate_verifier(), generate_verifier());
    }
}

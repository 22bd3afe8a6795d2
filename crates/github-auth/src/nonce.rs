//! State nonce generation
//!
//! A nonce binds an authorization request to the Slack user that started
//! it. It travels through the browser as the OAuth `state` parameter, so it
//! must be URL-safe.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;

use crate::constants::NONCE_BYTES;

/// Generate a cryptographically random, URL-safe nonce.
///
/// 32 random bytes encoded as base64url without padding (43 characters).
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Shortened form of a nonce for log fields.
pub(crate) fn redact(nonce: &str) -> &str {
    nonce.get(..6).unwrap_or(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn nonce_is_url_safe_base64() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), 43);
        assert!(
            nonce
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "nonce must be URL-safe base64 (no padding): {nonce}"
        );
    }

    #[test]
    fn nonce_decodes_to_full_entropy() {
        let decoded = URL_SAFE_NO_PAD.decode(generate_nonce()).unwrap();
        assert_eq!(decoded.len(), NONCE_BYTES);
    }

    #[test]
    fn nonces_do_not_repeat() {
        let nonces: HashSet<String> = (0..10_000).map(|_| generate_nonce()).collect();
        assert_eq!(nonces.len(), 10_000);
    }

    #[test]
    fn redact_keeps_prefix_only() {
        assert_eq!(redact("abcdefghijk"), "abcdef");
        assert_eq!(redact("abc"), "abc");
    }
}

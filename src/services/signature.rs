//! HMAC-SHA256 signing for commerce webhook bodies.

use ring::hmac;

/// Signs `payload` and returns the lowercase hex tag.
pub fn sign(payload: &[u8], key: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hex::encode(hmac::sign(&key, payload).as_ref())
}

/// Constant-time check of a hex signature produced by [`sign`].
pub fn verify(payload: &[u8], signature: &str, key: &[u8]) -> bool {
    let Ok(tag) = hex::decode(signature.trim()) else {
        return false;
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, payload, &tag).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let body = br#"{"id":123}"#;
        let sig = sign(body, b"webhook-secret");

        assert_eq!(sig.len(), 64);
        assert!(verify(body, &sig, b"webhook-secret"));
    }

    #[test]
    fn test_wrong_key_or_body_fails() {
        let body = br#"{"id":123}"#;
        let sig = sign(body, b"webhook-secret");

        assert!(!verify(body, &sig, b"other-secret"));
        assert!(!verify(br#"{"id":124}"#, &sig, b"webhook-secret"));
        assert!(!verify(body, "not-hex", b"webhook-secret"));
    }
}

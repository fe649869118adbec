//! Short-lived capability tokens for the stream endpoint.
//!
//! A token is `base64url(json payload) "." base64url(hmac-sha256)`. Nothing is
//! stored server side, so a token stays valid until its embedded expiry.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use ring::{digest, hmac};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TTL_SECS: i64 = 300;
pub const MIN_TTL_SECS: i64 = 60;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    MalformedToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Invalid token payload")]
    InvalidPayload,

    #[error("Token expired")]
    Expired,

    #[error("Token issued to a different user")]
    UserMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// User id.
    pub u: i64,
    /// Product id.
    pub p: i64,
    /// Expiry, unix seconds.
    pub e: i64,
    /// Random nonce.
    pub n: String,
}

pub struct TokenSigner {
    key: hmac::Key,
}

impl TokenSigner {
    /// Derives the signing key from install key material and the site URL so
    /// tokens from one deployment never verify on another.
    pub fn new(secret_key: &str, site_url: &str) -> Self {
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(secret_key.as_bytes());
        ctx.update(b"|");
        ctx.update(site_url.trim_end_matches('/').as_bytes());
        let derived = ctx.finish();

        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, derived.as_ref()),
        }
    }

    pub fn issue(&self, user_id: i64, product_id: i64, ttl_secs: i64) -> String {
        self.issue_at(user_id, product_id, ttl_secs, Utc::now().timestamp())
    }

    pub fn issue_at(&self, user_id: i64, product_id: i64, ttl_secs: i64, now: i64) -> String {
        let payload = TokenPayload {
            u: user_id,
            p: product_id,
            e: now.saturating_add(ttl_secs.max(MIN_TTL_SECS)),
            n: Uuid::new_v4().simple().to_string(),
        };

        // Serializing a struct of integers and a string cannot fail.
        let json = serde_json::to_vec(&payload).unwrap_or_default();
        let encoded = URL_SAFE_NO_PAD.encode(json);
        let tag = hmac::sign(&self.key, encoded.as_bytes());

        format!("{}.{}", encoded, URL_SAFE_NO_PAD.encode(tag.as_ref()))
    }

    pub fn verify(&self, token: &str) -> Result<TokenPayload, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<TokenPayload, TokenError> {
        let parts: Vec<&str> = token.trim().split('.').collect();
        let [encoded, signature] = parts.as_slice() else {
            return Err(TokenError::MalformedToken);
        };
        if encoded.is_empty() || signature.is_empty() {
            return Err(TokenError::MalformedToken);
        }

        let tag = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::InvalidSignature)?;
        hmac::verify(&self.key, encoded.as_bytes(), &tag)
            .map_err(|_| TokenError::InvalidSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::InvalidPayload)?;
        let payload: TokenPayload =
            serde_json::from_slice(&json).map_err(|_| TokenError::InvalidPayload)?;

        if now > payload.e {
            return Err(TokenError::Expired);
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn signer() -> TokenSigner {
        TokenSigner::new("install-secret-key", "https://videos.example.com")
    }

    #[test]
    fn test_issue_verify_roundtrip() {
        let signer = signer();
        let token = signer.issue_at(42, 7, DEFAULT_TTL_SECS, NOW);

        let payload = signer.verify_at(&token, NOW).unwrap();
        assert_eq!(payload.u, 42);
        assert_eq!(payload.p, 7);
        assert_eq!(payload.e, NOW + 300);
    }

    #[test]
    fn test_expires_after_ttl() {
        let signer = signer();
        let token = signer.issue_at(42, 7, 60, NOW);

        assert!(signer.verify_at(&token, NOW + 60).is_ok());
        assert_eq!(
            signer.verify_at(&token, NOW + 61),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_ttl_floor_applies() {
        let signer = signer();
        let token = signer.issue_at(1, 2, 5, NOW);

        let payload = signer.verify_at(&token, NOW).unwrap();
        assert_eq!(payload.e, NOW + MIN_TTL_SECS);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let signer = signer();
        let token = signer.issue_at(1, 2, i64::MAX, NOW);

        let payload = signer.verify_at(&token, NOW).unwrap();
        assert_eq!(payload.e, i64::MAX);
    }

    #[test]
    fn test_tampered_payload_fails_signature() {
        let signer = signer();
        let token = signer.issue_at(42, 7, 300, NOW);

        let mut chars: Vec<char> = token.chars().collect();
        chars[3] = if chars[3] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();

        assert_eq!(
            signer.verify_at(&tampered, NOW),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        let signer = signer();
        assert_eq!(signer.verify_at("abc", NOW), Err(TokenError::MalformedToken));
        assert_eq!(
            signer.verify_at("a.b.c", NOW),
            Err(TokenError::MalformedToken)
        );
        assert_eq!(signer.verify_at(".", NOW), Err(TokenError::MalformedToken));
    }

    #[test]
    fn test_signed_garbage_is_invalid_payload() {
        let signer = signer();
        let encoded = URL_SAFE_NO_PAD.encode(br#"{"u":1}"#);
        let tag = hmac::sign(&signer.key, encoded.as_bytes());
        let token = format!("{}.{}", encoded, URL_SAFE_NO_PAD.encode(tag.as_ref()));

        assert_eq!(
            signer.verify_at(&token, NOW),
            Err(TokenError::InvalidPayload)
        );
    }

    #[test]
    fn test_tokens_do_not_cross_sites() {
        let token = signer().issue_at(42, 7, 300, NOW);
        let other = TokenSigner::new("install-secret-key", "https://other.example.com");

        assert_eq!(
            other.verify_at(&token, NOW),
            Err(TokenError::InvalidSignature)
        );
    }
}

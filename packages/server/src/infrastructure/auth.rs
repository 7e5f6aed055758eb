//! HMAC-SHA256 bearer token verification.
//!
//! Tokens are `base64url(claims).base64url(tag)` where the tag authenticates
//! the encoded claims. The platform's auth service signs with the same shared
//! secret; `issue` exists for the dev server and the tests.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use roka_shared::time::Clock;

use crate::domain::{AuthError, AuthenticatedUser, TokenVerifier, UserId};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: String,
    /// Expiry, Unix milliseconds.
    exp: i64,
}

/// Shared-secret token verifier.
pub struct HmacTokenVerifier {
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl HmacTokenVerifier {
    pub fn new(secret: impl AsRef<[u8]>, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            clock,
        }
    }

    /// Sign a token for `user_id` valid for `ttl_ms` from now.
    pub fn issue(&self, user_id: &UserId, role: &str, ttl_ms: i64) -> String {
        let claims = Claims {
            sub: user_id.as_str().to_string(),
            role: role.to_string(),
            exp: self.clock.now_millis() + ttl_ms,
        };
        // Claims are a plain struct; serialization cannot fail.
        let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let tag = self.sign(encoded.as_bytes());
        format!("{}.{}", encoded, URL_SAFE_NO_PAD.encode(tag))
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

#[async_trait]
impl TokenVerifier for HmacTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<AuthenticatedUser, AuthError> {
        let (encoded, tag_b64) = credential
            .split_once('.')
            .ok_or(AuthError::InvalidCredential)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| AuthError::InvalidCredential)?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(encoded.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| AuthError::InvalidCredential)?;

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| AuthError::InvalidCredential)?;
        let claims: Claims =
            serde_json::from_slice(&claims_bytes).map_err(|_| AuthError::InvalidCredential)?;

        if claims.exp <= self.clock.now_millis() {
            return Err(AuthError::Expired);
        }

        Ok(AuthenticatedUser {
            user_id: UserId::new(claims.sub),
            role: claims.role,
        })
    }
}

//! Signed token encoding
//!
//! Tokens are HS256 JWTs: `header.claims.signature` in base64url, with the
//! claims segment holding the JSON form of [`Claims`] and the signature an
//! HMAC-SHA256 keyed by the shared signing secret. Claims are readable by
//! anyone holding a token but any change to them invalidates the signature.
//!
//! `jsonwebtoken` checks structure, algorithm and signature. Expiry is
//! checked here with [`Claims::is_expired_at`] and no leeway, so a token is
//! rejected from the second its `exp` is reached.
//!
//! Every decode failure (bad structure, bad signature, expired) surfaces as
//! the single [`CodecError::Invalid`] so callers cannot tell which check
//! rejected the token. The specific reason is only emitted at debug level.

use common::Secret;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

use crate::claims::{Claims, unix_now};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Errors from token encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The signing key is unusable. Fatal for the process, never retried.
    #[error("token encoding failed: {0}")]
    Encoding(String),

    /// Malformed, wrongly signed, or expired. Deliberately carries no detail.
    #[error("invalid token")]
    Invalid,
}

/// HMAC-SHA256 token encoder/decoder bound to one signing secret.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    key: Secret<Vec<u8>>,
}

impl TokenCodec {
    /// Build a codec from the shared signing secret.
    ///
    /// An empty secret is rejected as a corrupt key.
    pub fn new(signing_secret: &[u8]) -> Result<Self, CodecError> {
        if signing_secret.is_empty() {
            return Err(CodecError::Encoding("signing secret is empty".into()));
        }
        Ok(Self {
            key: Secret::new(signing_secret.to_vec()),
        })
    }

    /// Serialize and sign `claims`.
    pub fn encode(&self, claims: &Claims) -> Result<String, CodecError> {
        jsonwebtoken::encode(
            &Header::new(ALGORITHM),
            claims,
            &EncodingKey::from_secret(self.key.expose()),
        )
        .map_err(|e| CodecError::Encoding(e.to_string()))
    }

    /// Verify and decode a token against the current time.
    pub fn decode(&self, token: &str) -> Result<Claims, CodecError> {
        self.decode_at(token, unix_now())
    }

    /// Verify and decode a token as of `now` (unix seconds).
    pub fn decode_at(&self, token: &str, now: u64) -> Result<Claims, CodecError> {
        let claims = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.key.expose()),
            &validation(),
        )
        .map_err(|e| {
            debug!(reason = ?e.kind(), "token rejected");
            CodecError::Invalid
        })?
        .claims;

        if claims.is_expired_at(now) {
            debug!(reason = "expired", "token rejected");
            return Err(CodecError::Invalid);
        }

        Ok(claims)
    }
}

/// HS256 only; expiry is left to `Claims::is_expired_at`.
fn validation() -> Validation {
    let mut validation = Validation::new(ALGORITHM);
    validation.validate_exp = false;
    validation.leeway = 0;
    validation.required_spec_claims.clear();
    validation
}

//! One-way digests for client secrets
//!
//! Client secrets are only ever persisted and compared in digest form:
//! `digest = hex(SHA256(secret))`. Registration stores the digest, and
//! authentication digests the presented secret before comparing.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Digest compared against when no client matches the presented id.
///
/// No secret hashes to this value.
pub const UNKNOWN_CLIENT_DIGEST: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Compute the lowercase hex SHA-256 digest of a secret.
pub fn digest(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

/// Digest `presented` and compare it to `stored_digest` in constant time.
pub fn matches(presented: &str, stored_digest: &str) -> bool {
    let presented = digest(presented);
    presented.as_bytes().ct_eq(stored_digest.as_bytes()).into()
}

//! Token claims
//!
//! Claims are the fixed payload embedded in every issued token. The admin
//! flag is captured at issuance; changing a client's flag later does not
//! affect tokens already in circulation.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Payload carried by a signed token.
///
/// Timestamps are unix seconds. Field names on the wire follow the usual
/// JWT registered claim names (`sub`, `iat`, `exp`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Client id the token was issued for
    #[serde(rename = "sub")]
    pub subject_id: String,
    pub is_admin: bool,
    #[serde(rename = "iat")]
    pub issued_at: u64,
    #[serde(rename = "exp")]
    pub expires_at: u64,
}

impl Claims {
    /// Claims for `subject_id` issued now and expiring after `ttl`.
    pub fn issue(subject_id: impl Into<String>, is_admin: bool, ttl: Duration) -> Self {
        let issued_at = unix_now();
        Self {
            subject_id: subject_id.into(),
            is_admin,
            issued_at,
            expires_at: issued_at.saturating_add(ttl.as_secs()),
        }
    }

    /// Whether the claims are expired at `now` (unix seconds).
    ///
    /// A token whose `expires_at` equals the current second is already
    /// expired.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// Current time as unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

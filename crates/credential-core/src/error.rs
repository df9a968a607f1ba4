//! Error taxonomy for credential operations
//!
//! Variants carry no payload: callers only ever learn the kind of failure.
//! Store and codec detail is logged server-side where the failure occurs.

/// Outcome kinds of a failed credential operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Unknown client id or wrong secret; never says which
    #[error("authentication failed")]
    AuthFailure,

    /// Malformed, wrongly signed, expired, or revoked token
    #[error("invalid token")]
    VerifyFailure,

    /// Valid token without the admin capability
    #[error("access denied")]
    AccessDenied,

    #[error("credential store unavailable")]
    StoreUnavailable,

    /// Client id already registered
    #[error("client already exists")]
    Conflict,

    /// The signing key could not produce a token
    #[error("token encoding failed")]
    Encoding,
}

impl Error {
    /// Stable snake_case label used in responses and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::AuthFailure => "auth_failure",
            Error::VerifyFailure => "verify_failure",
            Error::AccessDenied => "access_denied",
            Error::StoreUnavailable => "store_unavailable",
            Error::Conflict => "conflict",
            Error::Encoding => "encoding_error",
        }
    }
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_generic() {
        assert_eq!(Error::AuthFailure.to_string(), "authentication failed");
        assert_eq!(Error::VerifyFailure.to_string(), "invalid token");
        assert_eq!(Error::AccessDenied.to_string(), "access denied");
    }

    #[test]
    fn kinds_are_distinct() {
        let all = [
            Error::AuthFailure,
            Error::VerifyFailure,
            Error::AccessDenied,
            Error::StoreUnavailable,
            Error::Conflict,
            Error::Encoding,
        ];
        let kinds: std::collections::HashSet<&str> = all.iter().map(Error::kind).collect();
        assert_eq!(kinds.len(), all.len());
    }
}

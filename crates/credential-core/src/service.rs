//! Credential lifecycle operations
//!
//! `CredentialService` is the only component with business rules. It ties
//! the store, the secret hasher and the token codec together:
//!
//! - `authenticate`: client lookup -> digest comparison -> signed token
//! - `verify`: revocation check -> signature/expiry decode -> claims
//! - `revoke`: record the raw token string as revoked
//! - `create_client`: verify requester -> require admin -> hash -> insert
//!
//! A token moves Unissued -> Valid on issuance and Valid -> Rejected once it
//! expires or is revoked. Verification observes that state without changing
//! it.
//!
//! The admin capability is read from the token's claims, captured at
//! issuance. Removing a client's admin rights therefore requires revoking
//! its outstanding tokens.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use serde::Serialize;
use tracing::{info, warn};

use crate::claims::Claims;
use crate::codec::{CodecError, TokenCodec};
use crate::error::{Error, Result};
use crate::hasher;
use crate::store::{self, ClientRecord, CredentialStore, StoreError, StoreFuture};

/// Read-only settings fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    /// Lifetime of issued tokens. Must be non-zero.
    pub token_ttl: Duration,
    /// Upper bound on any single store call
    pub store_timeout: Duration,
}

/// Successful authentication result.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
    pub is_admin: bool,
}

/// Registration request for a new client.
#[derive(Debug)]
pub struct NewClient {
    pub client_id: String,
    pub secret: Secret<String>,
    pub is_admin: bool,
}

impl NewClient {
    fn into_record(self) -> ClientRecord {
        ClientRecord {
            secret_digest: hasher::digest(self.secret.expose()),
            client_id: self.client_id,
            is_admin: self.is_admin,
        }
    }
}

/// Issues, verifies and revokes client tokens.
///
/// Cheap to clone; all clones share the same store.
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    config: ServiceConfig,
}

impl CredentialService {
    pub fn new(store: Arc<dyn CredentialStore>, codec: TokenCodec, config: ServiceConfig) -> Self {
        Self {
            store,
            codec,
            config,
        }
    }

    /// Backend label of the underlying store.
    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Await a store call, bounded by the configured store timeout.
    async fn bounded<T>(&self, operation: &'static str, call: StoreFuture<'_, T>) -> store::Result<T> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "{operation} timed out after {}s",
                self.config.store_timeout.as_secs_f64()
            ))),
        }
    }

    /// Exchange a client id and secret for a signed token.
    ///
    /// Unknown ids, wrong secrets and store failures all yield
    /// `AuthFailure`.
    pub async fn authenticate(&self, client_id: &str, secret: &str) -> Result<IssuedToken> {
        let client = match self.bounded("find_client", self.store.find_client(client_id)).await {
            Ok(Some(client)) => client,
            Ok(None) => {
                // Same digest and comparison cost as the found path.
                std::hint::black_box(hasher::matches(secret, hasher::UNKNOWN_CLIENT_DIGEST));
                info!(client_id, "authentication failed: unknown client");
                return Err(Error::AuthFailure);
            }
            Err(e) => {
                warn!(client_id, error = %e, "authentication failed: client lookup error");
                return Err(Error::AuthFailure);
            }
        };

        if !hasher::matches(secret, &client.secret_digest) {
            info!(client_id, "authentication failed: secret mismatch");
            return Err(Error::AuthFailure);
        }

        let claims = Claims::issue(client.client_id, client.is_admin, self.config.token_ttl);
        let token = self.codec.encode(&claims).map_err(|e| {
            warn!(error = %e, "token encoding failed");
            Error::Encoding
        })?;

        info!(
            client_id = claims.subject_id,
            is_admin = claims.is_admin,
            expires_at = claims.expires_at,
            "token issued"
        );

        Ok(IssuedToken {
            token,
            expires_in: self.config.token_ttl.as_secs(),
            is_admin: claims.is_admin,
        })
    }

    /// Validate a token and return its claims.
    ///
    /// The revocation list is consulted before the signature so a revoked
    /// token is rejected even while cryptographically valid. If revocation
    /// cannot be checked the token is not accepted.
    pub async fn verify(&self, token: &str) -> Result<Claims> {
        match self.bounded("is_revoked", self.store.is_revoked(token)).await {
            Ok(false) => {}
            Ok(true) => {
                info!("verification failed: token revoked");
                return Err(Error::VerifyFailure);
            }
            Err(e) => {
                warn!(error = %e, "verification failed: revocation check error");
                return Err(Error::StoreUnavailable);
            }
        }

        self.codec.decode(token).map_err(|e| match e {
            CodecError::Invalid => Error::VerifyFailure,
            CodecError::Encoding(msg) => {
                warn!(error = %msg, "token decoding failed on signing key");
                Error::Encoding
            }
        })
    }

    /// Mark a token string as revoked.
    ///
    /// The token is not decoded: malformed or already-expired strings are
    /// recorded too. Revoking twice succeeds both times.
    pub async fn revoke(&self, token: &str) -> Result<()> {
        self.bounded("insert_revocation", self.store.insert_revocation(token))
            .await
            .map_err(|e| {
                warn!(error = %e, "revocation failed");
                Error::StoreUnavailable
            })?;
        info!("token revoked");
        Ok(())
    }

    /// Register a new client on behalf of the holder of `requester_token`.
    ///
    /// The requester's token must verify and carry the admin flag.
    pub async fn create_client(&self, requester_token: &str, client: NewClient) -> Result<()> {
        let requester = self.verify(requester_token).await?;
        if !requester.is_admin {
            info!(
                requester = requester.subject_id,
                client_id = client.client_id,
                "client creation denied: requester is not admin"
            );
            return Err(Error::AccessDenied);
        }

        let client_id = client.client_id.clone();
        let is_admin = client.is_admin;
        self.insert(client).await?;

        info!(
            requester = requester.subject_id,
            client_id, is_admin, "client created"
        );
        Ok(())
    }

    /// Seed a client without an authorizing token.
    ///
    /// Only for process startup, to create the first administrator. Returns
    /// `false` when the id already exists.
    pub async fn bootstrap_client(&self, client: NewClient) -> Result<bool> {
        let client_id = client.client_id.clone();
        match self.insert(client).await {
            Ok(()) => {
                info!(client_id, "bootstrap client created");
                Ok(true)
            }
            Err(Error::Conflict) => {
                info!(client_id, "bootstrap client already present");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn insert(&self, client: NewClient) -> Result<()> {
        let record = client.into_record();
        let client_id = record.client_id.clone();
        match self.bounded("insert_client", self.store.insert_client(record)).await {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict) => {
                info!(client_id, "client creation failed: id already exists");
                Err(Error::Conflict)
            }
            Err(e) => {
                warn!(client_id, error = %e, "client creation failed: store error");
                Err(Error::StoreUnavailable)
            }
        }
    }
}

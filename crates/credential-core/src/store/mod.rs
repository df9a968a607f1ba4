//! Credential store abstraction
//!
//! The store is the only durable state in the system: registered clients
//! (id, secret digest, admin flag) and the set of revoked token strings.
//! Three adapters are provided:
//!
//! - [`MemoryStore`]: process-local maps, for tests and development
//! - [`FileStore`]: a single JSON document with atomic rewrites
//! - [`PgStore`]: PostgreSQL through a `sqlx` connection pool
//!
//! Contract for implementors:
//! - every query binds its arguments; values are never spliced into SQL text
//! - `insert_revocation` is insert-or-ignore, so concurrent revokes of the
//!   same token both succeed
//! - `insert_client` reports [`StoreError::Conflict`] for an existing id and
//!   never overwrites it
//! - transient failures are returned as [`StoreError::Unavailable`], never as
//!   "not found" or "not revoked"

pub mod file;
pub mod memory;
pub mod postgres;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// A registered API client as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub client_id: String,
    /// Hex SHA-256 of the client secret, never the secret itself
    pub secret_digest: String,
    pub is_admin: bool,
}

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("client already exists")]
    Conflict,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persistence for clients and revoked tokens.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn CredentialStore>`).
pub trait CredentialStore: Send + Sync {
    /// Backend label for logging and health reporting
    fn backend(&self) -> &'static str;

    /// Look up a client by id. `Ok(None)` when no such client exists.
    fn find_client<'a>(&'a self, client_id: &'a str) -> StoreFuture<'a, Option<ClientRecord>>;

    /// Insert a new client. Fails with `Conflict` if the id is taken.
    fn insert_client(&self, client: ClientRecord) -> StoreFuture<'_, ()>;

    /// Record a token string as revoked. Idempotent.
    fn insert_revocation<'a>(&'a self, token: &'a str) -> StoreFuture<'a, ()>;

    /// Whether a revocation record exists for the token string.
    fn is_revoked<'a>(&'a self, token: &'a str) -> StoreFuture<'a, bool>;
}

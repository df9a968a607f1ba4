//! Client credential lifecycle library
//!
//! Issues, verifies and revokes bearer tokens for machine clients identified
//! by a client id / client secret pair, and gates client registration behind
//! an admin-flagged token. This crate has no dependency on any transport; the
//! server binary wraps [`CredentialService`] in HTTP routes.
//!
//! Credential flow:
//! 1. An administrator registers a client via `CredentialService::create_client()`
//!    (the secret is stored only as `hasher::digest()`)
//! 2. The client exchanges id + secret via `CredentialService::authenticate()`
//! 3. Resource servers check presented tokens via `CredentialService::verify()`
//! 4. On logout the token is recorded via `CredentialService::revoke()`

pub mod claims;
pub mod codec;
pub mod error;
pub mod hasher;
pub mod service;
pub mod store;

pub use claims::Claims;
pub use codec::{CodecError, TokenCodec};
pub use error::{Error, Result};
pub use service::{CredentialService, IssuedToken, NewClient, ServiceConfig};
pub use store::{ClientRecord, CredentialStore, FileStore, MemoryStore, PgStore, StoreError};

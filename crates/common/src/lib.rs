//! Common types for the client credential service

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::{Secret, resolve_secret};

//! # Credential Cache Library
//!
//! Keeps one bearer token for an upstream API, exchanging client credentials
//! only when the held token has expired or was rejected, and sharing a single
//! in-flight exchange between concurrent callers.
//!
//! Modules:
//! - `cache` — token and the single-flight credential cache
//! - `sources` — client-credentials exchange and the authenticated resource client
//! - `config` — service configuration, loading and validation
//! - `server` — HTTP routes exposing the cache and the resource proxy

pub mod cache;
pub mod config;
pub mod error;
pub mod helpers;
pub mod observability;
pub mod resilience;
pub mod server;
pub mod sources;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::cache::{CredentialTokenCache, ExpiryPolicy, Token};
pub use crate::error::CacheError;

//! Sources module
//!
//! Credential exchange against the upstream token endpoint, and the resource
//! client that spends the resulting bearer tokens.

use std::future::Future;

use crate::error::CacheError;

pub mod oauth2;
pub mod resource;

/// What a successful credential exchange hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub access_token: String,
    /// provider-stated lifetime in seconds, if the provider states one
    pub expires_in: Option<u64>,
}

/// Trades configured client credentials for a bearer token.
pub trait TokenExchange: Send + Sync + 'static {
    fn exchange(&self) -> impl Future<Output = Result<AccessGrant, CacheError>> + Send;
}

use serde::Deserialize;
use std::{env, fs};

use crate::config::settings::SettingsConfig;
use crate::error::CacheError;

pub const DEFAULT_GRANT_TYPE: &str = "client_credentials";
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_REQUESTED_TTL_SECONDS: u64 = 3600;
pub const DEFAULT_SAFETY_MARGIN_SECONDS: u64 = 300;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub resource: Option<ResourceConfig>,
}

/// ================================
/// Credential exchange
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    pub token_url: String,
    #[serde(default = "default_grant_type")]
    pub grant_type: String,
    pub client_id: SecretValue,
    pub client_secret: SecretValue,
    pub scope: Option<SecretValue>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Where a credential value comes from
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum SecretValue {
    Literal {
        value: String,
    },
    FromEnv {
        from_env: String,
    },
    FromFile {
        path: String,
    },
}

impl SecretValue {
    /// Resolve to the actual value. Missing or blank values are configuration errors.
    pub fn resolve(&self, field: &str) -> Result<String, CacheError> {
        let value = match self {
            SecretValue::Literal { value } => value.to_owned(),
            SecretValue::FromEnv { from_env } => env::var(from_env).map_err(|err| {
                CacheError::Configuration(format!("{}: env '{}' unavailable: {}", field, from_env, err))
            })?,
            SecretValue::FromFile { path } => fs::read_to_string(path)
                .map(|res| res.trim().to_string())
                .map_err(|err| {
                    CacheError::Configuration(format!("{}: cannot read '{}': {}", field, path, err))
                })?,
        };
        if value.trim().is_empty() {
            return Err(CacheError::Configuration(format!("{} is empty", field)));
        }
        Ok(value)
    }
}

/// ================================
/// Token lifetime
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// lifetime assumed when the provider omits `expires_in`
    #[serde(default = "default_requested_ttl_seconds")]
    pub requested_ttl_seconds: u64,
    #[serde(default = "default_safety_margin_seconds")]
    pub safety_margin_seconds: u64,
    #[serde(default)]
    pub refresh_ahead_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            requested_ttl_seconds: DEFAULT_REQUESTED_TTL_SECONDS,
            safety_margin_seconds: DEFAULT_SAFETY_MARGIN_SECONDS,
            refresh_ahead_seconds: 0,
        }
    }
}

/// ================================
/// Protected resource API
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ResourceConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_grant_type() -> String {
    DEFAULT_GRANT_TYPE.to_owned()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}

fn default_requested_ttl_seconds() -> u64 {
    DEFAULT_REQUESTED_TTL_SECONDS
}

fn default_safety_margin_seconds() -> u64 {
    DEFAULT_SAFETY_MARGIN_SECONDS
}

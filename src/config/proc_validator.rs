//! Configuration validation with aggregated errors.
//! Every issue is collected so a broken config is fixed in one pass:
//!   * token endpoint and resource URLs
//!   * lifetime invariants (margin < ttl, refresh-ahead < lifetime)
//!   * server / metrics / logging / retry settings

use tracing::{error, info};

use crate::config::settings::{RetryConfig, SettingsConfig};
use crate::config::sources::{CacheConfig, CredentialsConfig, ResourceConfig, ServiceConfig, SecretValue};

/// Returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_credentials(&cfg.credentials, &mut errors);
    validate_cache(&cfg.cache, &mut errors);
    if let Some(resource) = &cfg.resource {
        validate_resource(resource, &mut errors);
    }

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        Err(errors)
    }
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if let Some(retry) = &settings.retry {
        validate_retry("settings.retry", retry, errors);
    }

    if settings.server.host.is_empty() {
        errors.push("settings.server.host must not be empty".to_string());
    }
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!(
            "settings.server.port '{}' must be an integer in range 0-65535",
            settings.server.port
        ));
    }

    // metrics endpoint start with '/'
    let metrics = &settings.metrics;
    if !metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            metrics.path
        ));
    }

    if let Some(logging) = &settings.logging {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' must be one of {:?}",
                logging.level, valid
            ));
        }
    }
}

fn validate_retry(scope: &str, retry: &RetryConfig, errors: &mut Vec<String>) {
    if retry.attempts == Some(0) {
        errors.push(format!("{}.attempts must be >= 1", scope));
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if max < base {
            errors.push(format!(
                "{}.max_delay_ms ({}) must be >= base_delay_ms ({})",
                scope, max, base
            ));
        }
    }
}

/// CREDENTIALS VALIDATION
fn validate_credentials(credentials: &CredentialsConfig, errors: &mut Vec<String>) {
    validate_url("credentials.token_url", &credentials.token_url, errors);

    if credentials.grant_type.trim().is_empty() {
        errors.push("credentials.grant_type must not be empty".to_string());
    }
    for (field, secret) in [
        ("credentials.client_id", &credentials.client_id),
        ("credentials.client_secret", &credentials.client_secret),
    ] {
        validate_secret_shape(field, secret, errors);
    }
    if credentials.timeout_ms == 0 {
        errors.push("credentials.timeout_ms must be > 0".to_string());
    }
}

/// Only the declaration is checked here; values are resolved when the exchange is built.
fn validate_secret_shape(field: &str, secret: &SecretValue, errors: &mut Vec<String>) {
    let reference = match secret {
        SecretValue::Literal { .. } => return,
        SecretValue::FromEnv { from_env } => from_env,
        SecretValue::FromFile { path } => path,
    };
    if reference.trim().is_empty() {
        errors.push(format!("{} must reference a non-empty env var or path", field));
    }
}

/// CACHE VALIDATION
fn validate_cache(cache: &CacheConfig, errors: &mut Vec<String>) {
    if cache.requested_ttl_seconds == 0 {
        errors.push("cache.requested_ttl_seconds must be > 0".to_string());
    }
    if cache.requested_ttl_seconds > 60 * 60 * 24 * 365 {
        errors.push(format!(
            "cache.requested_ttl_seconds ({}) is unreasonably large",
            cache.requested_ttl_seconds
        ));
    }
    if cache.safety_margin_seconds >= cache.requested_ttl_seconds {
        errors.push(format!(
            "cache.safety_margin_seconds ({}) must be < requested_ttl_seconds ({})",
            cache.safety_margin_seconds, cache.requested_ttl_seconds
        ));
    }
    let lifetime = cache
        .requested_ttl_seconds
        .saturating_sub(cache.safety_margin_seconds);
    if cache.refresh_ahead_seconds > 0 && cache.refresh_ahead_seconds >= lifetime {
        errors.push(format!(
            "cache.refresh_ahead_seconds ({}) must be < token lifetime ({})",
            cache.refresh_ahead_seconds, lifetime
        ));
    }
}

fn validate_resource(resource: &ResourceConfig, errors: &mut Vec<String>) {
    validate_url("resource.base_url", &resource.base_url, errors);
    if resource.timeout_ms == 0 {
        errors.push("resource.timeout_ms must be > 0".to_string());
    }
}

fn validate_url(field: &str, url: &str, errors: &mut Vec<String>) {
    match reqwest::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        Ok(parsed) => errors.push(format!(
            "{} '{}' must use http or https, got '{}'",
            field,
            url,
            parsed.scheme()
        )),
        Err(e) => errors.push(format!("{} '{}' is not a valid url: {}", field, url, e)),
    }
}

use std::time::Duration;

use http::{HeaderValue, StatusCode};
use reqwest::{header, Client};
use tracing::{debug, warn};

use crate::cache::{CredentialTokenCache, Token};
use crate::config::sources::ResourceConfig;
use crate::error::CacheError;
use crate::observability::metrics::get_metrics;
use crate::sources::TokenExchange;

/// What the resource API answered.
#[derive(Debug, Clone)]
pub struct ResourceResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Vec<u8>,
}

/// Authenticated GETs against the protected resource API.
///
/// A 401/403 on the cached token invalidates it and retries exactly once with
/// a freshly exchanged one.
pub struct ResourceClient<E> {
    client: Client,
    base_url: String,
    cache: CredentialTokenCache<E>,
}

impl<E> Clone for ResourceClient<E> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<E: TokenExchange> ResourceClient<E> {
    pub fn from_config(cfg: &ResourceConfig, cache: CredentialTokenCache<E>) -> Result<Self, CacheError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| CacheError::Configuration(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self::new(client, &cfg.base_url, cache))
    }

    pub fn new(client: Client, base_url: &str, cache: CredentialTokenCache<E>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            cache,
        }
    }

    pub fn cache(&self) -> &CredentialTokenCache<E> {
        &self.cache
    }

    /// GET `{base_url}/{path}?{query}`.
    pub async fn get(&self, path: &str, query: Option<&str>) -> Result<ResourceResponse, CacheError> {
        let url = self.url_for(path, query);

        let token = self.cache.get_token().await?;
        let response = self.send(&url, &token).await?;
        if !is_auth_rejection(response.status) {
            return Ok(response);
        }

        warn!(status = %response.status, "resource API rejected cached token, invalidating");
        get_metrics().resource_auth_retries.inc();
        self.cache.invalidate();

        let token = self.cache.get_token().await?;
        let response = self.send(&url, &token).await?;
        if is_auth_rejection(response.status) {
            return Err(CacheError::UpstreamAuthRejection {
                status: response.status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn send(&self, url: &str, token: &Token) -> Result<ResourceResponse, CacheError> {
        debug!(url, "resource request");
        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, token.bearer())
            .send()
            .await?;

        let status = response.status();
        get_metrics()
            .resource_requests
            .with_label_values(&[status.as_str()])
            .inc();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = response.bytes().await?.to_vec();
        Ok(ResourceResponse {
            status,
            content_type,
            body,
        })
    }

    fn url_for(&self, path: &str, query: Option<&str>) -> String {
        let path = path.trim_start_matches('/');
        match query.filter(|q| !q.is_empty()) {
            Some(query) => format!("{}/{}?{}", self.base_url, path, query),
            None => format!("{}/{}", self.base_url, path),
        }
    }
}

fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::sources::CredentialsConfig;
use crate::error::CacheError;
use crate::sources::{AccessGrant, TokenExchange};

/// OAuth2 client-credentials exchange against the provider's token endpoint.
#[derive(Clone)]
pub struct ClientCredentialsExchange {
    client: Client,
    token_url: String,
    form: Vec<(&'static str, String)>,
}

impl std::fmt::Debug for ClientCredentialsExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the form carries the client secret
        f.debug_struct("ClientCredentialsExchange")
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

impl ClientCredentialsExchange {
    /// Resolves client id/secret now, so missing credentials fail at startup.
    pub fn from_config(cfg: &CredentialsConfig) -> Result<Self, CacheError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| CacheError::Configuration(format!("cannot build HTTP client: {}", e)))?;
        Self::with_client(client, cfg)
    }

    pub fn with_client(client: Client, cfg: &CredentialsConfig) -> Result<Self, CacheError> {
        let mut form = vec![
            ("grant_type", cfg.grant_type.to_owned()),
            ("client_id", cfg.client_id.resolve("credentials.client_id")?),
            ("client_secret", cfg.client_secret.resolve("credentials.client_secret")?),
        ];
        if let Some(scope) = &cfg.scope {
            form.push(("scope", scope.resolve("credentials.scope")?));
        }
        Ok(Self {
            client,
            token_url: cfg.token_url.to_owned(),
            form,
        })
    }
}

impl TokenExchange for ClientCredentialsExchange {
    async fn exchange(&self) -> Result<AccessGrant, CacheError> {
        debug!(url = %self.token_url, "requesting access token");
        let response = self.client.post(&self.token_url).form(&self.form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CacheError::CredentialExchange {
                status: status.as_u16(),
                body,
            });
        }
        parse_token_response(status.as_u16(), body)
    }
}

/// `{ "access_token": "...", "expires_in": 3600 }`; anything less is an exchange error.
fn parse_token_response(status: u16, body: String) -> Result<AccessGrant, CacheError> {
    let parsed = match serde_json::from_str::<TokenResponse>(&body) {
        Ok(parsed) => parsed,
        Err(_) => return Err(CacheError::CredentialExchange { status, body }),
    };
    match parsed.access_token.filter(|t| !t.is_empty()) {
        Some(access_token) => Ok(AccessGrant {
            access_token,
            expires_in: parsed.expires_in,
        }),
        None => Err(CacheError::CredentialExchange { status, body }),
    }
}

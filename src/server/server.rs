use anyhow::{anyhow, Result};
use axum::Router;
use tracing::info;

use crate::cache::CredentialTokenCache;
use crate::config::settings::SettingsConfig;
use crate::observability::metrics::get_metrics;
use crate::observability::routes::MetricsState;
use crate::server::token_routes;
use crate::sources::resource::ResourceClient;
use crate::sources::TokenExchange;

pub struct AppState<E> {
    pub cache: CredentialTokenCache<E>,
    pub resource: Option<ResourceClient<E>>,
}

impl<E> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            resource: self.resource.clone(),
        }
    }
}

impl<E: TokenExchange> AppState<E> {
    pub fn new(cache: CredentialTokenCache<E>, resource: Option<ResourceClient<E>>) -> Self {
        Self { cache, resource }
    }
}

/// Token routes, the resource proxy (when configured) and the metrics scrape route.
pub fn router<E: TokenExchange>(settings_config: &SettingsConfig, state: AppState<E>) -> Router {
    let metrics_state = MetricsState::new(get_metrics().registry.clone());

    Router::new()
        .merge(token_routes::router(state))
        .merge(metrics_state.router::<()>(&settings_config.metrics))
}

/// Serve until ctrl-c.
pub async fn start<E: TokenExchange>(settings_config: &SettingsConfig, state: AppState<E>) -> Result<()> {
    let app = router(settings_config, state);

    let bind_addr = format!("{}:{}", settings_config.server.host, settings_config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow!("cannot bind {}: {}", bind_addr, e))?;
    info!(address = %bind_addr, "http server listening");

    let metrics = get_metrics();
    metrics.up.set(1);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    metrics.up.set(0);
    info!("http server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

use std::sync::Arc;

use crate::config::settings::MetricsConfig;
use axum::routing::get;
use axum::{extract::State, response::IntoResponse, Router};
use http::{header::CONTENT_TYPE, StatusCode};
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::error;

#[derive(Clone)]
pub struct MetricsState {
    pub registry: Arc<Registry>,
}

impl MetricsState {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Scrape route, mounted only when metrics are enabled.
    pub fn router<S>(&self, metrics_config: &MetricsConfig) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        if !metrics_config.is_enabled {
            return Router::new();
        }
        Router::new()
            .route(metrics_config.path.as_str(), get(scrape))
            .with_state(self.clone())
    }
}

async fn scrape(State(state): State<MetricsState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, [(CONTENT_TYPE, "text/plain")], String::new());
    }

    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        String::from_utf8_lossy(&buffer).into_owned(),
    )
}

use axum::{
    extract::{Path, RawQuery, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::error::CacheError;
use crate::server::server::AppState;
use crate::sources::TokenExchange;

#[derive(Debug, Serialize)]
struct TokenBody {
    access_token: String,
    token_type: &'static str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

pub fn router<E: TokenExchange>(state: AppState<E>) -> Router {
    let mut router = Router::new()
        .route("/token", get(get_token::<E>))
        .route("/token/invalidate", post(invalidate::<E>))
        .route("/health", get(health::<E>));
    if state.resource.is_some() {
        router = router.route("/proxy/{*path}", get(proxy::<E>));
    }
    router.with_state(state)
}

async fn get_token<E: TokenExchange>(State(state): State<AppState<E>>) -> Response {
    match state.cache.get_token().await {
        Ok(token) => Json(TokenBody {
            access_token: token.value().to_owned(),
            token_type: "Bearer",
            issued_at: token.issued_at(),
            expires_at: token.expires_at(),
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn invalidate<E: TokenExchange>(State(state): State<AppState<E>>) -> StatusCode {
    state.cache.invalidate();
    StatusCode::NO_CONTENT
}

async fn health<E: TokenExchange>(State(state): State<AppState<E>>) -> Response {
    Json(state.cache.status()).into_response()
}

async fn proxy<E: TokenExchange>(
    State(state): State<AppState<E>>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let Some(resource) = &state.resource else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match resource.get(&path, query.as_deref()).await {
        Ok(upstream) => {
            let mut response = (upstream.status, upstream.body).into_response();
            if let Some(content_type) = upstream.content_type {
                response.headers_mut().insert(CONTENT_TYPE, content_type);
            }
            response
        }
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Configuration(_) | CacheError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::CredentialExchange { .. }
            | CacheError::Transport(_)
            | CacheError::UpstreamAuthRejection { .. } => StatusCode::BAD_GATEWAY,
        };
        error!(error = %self, "request failed");
        (status, Json(json!({ "error": self.reason(), "message": self.to_string() }))).into_response()
    }
}

// Exercises the real HTTP exchange against mocked token endpoints:
//  - form encoded client credentials in, access_token/expires_in out
//  - non-2xx and incomplete bodies become exchange errors carrying status + body
//  - through the cache, repeated reads reach the endpoint once

#[cfg(test)]
mod tests {

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{extract::Form, http::StatusCode, routing::post, Json, Router};
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;
    use serial_test::serial;
    use std::collections::HashMap;

    use crate::cache::{CredentialTokenCache, ExpiryPolicy};
    use crate::config::sources::{CredentialsConfig, SecretValue, DEFAULT_GRANT_TYPE};
    use crate::error::CacheError;
    use crate::sources::oauth2::ClientCredentialsExchange;
    use crate::sources::TokenExchange;
    use crate::tests::common::spawn_axum;

    fn credentials(token_url: String) -> CredentialsConfig {
        CredentialsConfig {
            token_url,
            grant_type: DEFAULT_GRANT_TYPE.to_owned(),
            client_id: SecretValue::Literal { value: "mls-client".into() },
            client_secret: SecretValue::Literal { value: "mls-secret".into() },
            scope: Some(SecretValue::Literal { value: "api".into() }),
            timeout_ms: 2000,
        }
    }

    #[tokio::test]
    async fn exchanges_client_credentials_for_token() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST)
                .path("/oauth2/token")
                .header("content-type", "application/x-www-form-urlencoded");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({ "access_token": "mls-abc", "expires_in": 3600, "token_type": "Bearer" }));
        });

        let exchange = ClientCredentialsExchange::from_config(&credentials(server.url("/oauth2/token"))).unwrap();
        let grant = exchange.exchange().await.unwrap();

        assert_eq!(grant.access_token, "mls-abc");
        assert_eq!(grant.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn rejected_credentials_carry_status_and_body() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(401).body(r#"{"error":"invalid_client"}"#);
        });

        let exchange = ClientCredentialsExchange::from_config(&credentials(server.url("/oauth2/token"))).unwrap();

        assert_eq!(
            exchange.exchange().await.unwrap_err(),
            CacheError::CredentialExchange {
                status: 401,
                body: r#"{"error":"invalid_client"}"#.to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn success_without_access_token_is_an_exchange_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(200).json_body(json!({ "expires_in": 3600 }));
        });

        let exchange = ClientCredentialsExchange::from_config(&credentials(server.url("/oauth2/token"))).unwrap();

        assert!(matches!(
            exchange.exchange().await,
            Err(CacheError::CredentialExchange { status: 200, .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let exchange = ClientCredentialsExchange::from_config(&credentials(format!("http://{}/oauth2/token", addr))).unwrap();

        assert!(matches!(exchange.exchange().await, Err(CacheError::Transport(_))));
    }

    #[test]
    #[serial]
    fn missing_client_secret_is_a_configuration_error() {
        std::env::remove_var("CREDENTIAL_CACHE_TEST_SECRET");
        let mut cfg = credentials("http://127.0.0.1:1/oauth2/token".into());
        cfg.client_secret = SecretValue::FromEnv {
            from_env: "CREDENTIAL_CACHE_TEST_SECRET".into(),
        };

        assert!(matches!(
            ClientCredentialsExchange::from_config(&cfg),
            Err(CacheError::Configuration(msg)) if msg.contains("client_secret")
        ));
    }

    #[test]
    #[serial]
    fn client_secret_is_read_from_env() {
        std::env::set_var("CREDENTIAL_CACHE_TEST_SECRET", "from-env");
        let mut cfg = credentials("http://127.0.0.1:1/oauth2/token".into());
        cfg.client_secret = SecretValue::FromEnv {
            from_env: "CREDENTIAL_CACHE_TEST_SECRET".into(),
        };

        let built = ClientCredentialsExchange::from_config(&cfg);
        std::env::remove_var("CREDENTIAL_CACHE_TEST_SECRET");
        assert!(built.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cache_reaches_token_endpoint_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let router = Router::new().route(
            "/oauth2/token",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let c = counter_clone.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    let authorized = form.get("grant_type").map(String::as_str) == Some("client_credentials")
                        && form.get("client_id").map(String::as_str) == Some("mls-client")
                        && form.get("client_secret").map(String::as_str) == Some("mls-secret")
                        && form.get("scope").map(String::as_str) == Some("api");
                    if !authorized {
                        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_client" })));
                    }
                    (StatusCode::OK, Json(json!({ "access_token": format!("token-{}", n + 1), "expires_in": 3600 })))
                }
            }),
        );
        let (handle, addr) = spawn_axum(router).await;

        let exchange = ClientCredentialsExchange::from_config(&credentials(format!("http://{}/oauth2/token", addr))).unwrap();
        let cache = CredentialTokenCache::with_system_clock(exchange, ExpiryPolicy::default());

        let calls = futures::future::join_all((0..8).map(|_| cache.get_token())).await;
        for token in calls {
            assert_eq!(token.unwrap().value(), "token-1");
        }
        assert_eq!(cache.get_token().await.unwrap().value(), "token-1");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        cache.invalidate();
        assert_eq!(cache.get_token().await.unwrap().value(), "token-2");
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        handle.abort();
    }
}

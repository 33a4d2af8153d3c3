// tests/common/mod.rs
pub use axum::{Router, body::Body};
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::cache::{CredentialTokenCache, ExpiryPolicy};
use crate::error::CacheError;
use crate::helpers::time::ManualClock;
use crate::sources::{AccessGrant, TokenExchange};

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

type Script = dyn Fn(usize) -> Result<AccessGrant, CacheError> + Send + Sync;

/// In-memory exchange: answers the n-th call (0-based) with `script(n)`.
pub struct ScriptedExchange {
    calls: Arc<AtomicUsize>,
    delay: Duration,
    script: Box<Script>,
}

impl ScriptedExchange {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(usize) -> Result<AccessGrant, CacheError> + Send + Sync + 'static,
    {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            script: Box::new(script),
        }
    }

    /// "A", "B", "C", ... each stated to live 3600s.
    pub fn letters() -> Self {
        Self::new(|n| Ok(grant(&letter(n), Some(3600))))
    }

    pub fn failing(status: u16) -> Self {
        Self::new(move |_| Err(exchange_error(status)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl TokenExchange for ScriptedExchange {
    async fn exchange(&self) -> Result<AccessGrant, CacheError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(n)
    }
}

pub fn letter(n: usize) -> String {
    char::from(b'A' + (n % 26) as u8).to_string()
}

pub fn grant(token: &str, expires_in: Option<u64>) -> AccessGrant {
    AccessGrant {
        access_token: token.to_owned(),
        expires_in,
    }
}

pub fn exchange_error(status: u16) -> CacheError {
    CacheError::CredentialExchange {
        status,
        body: "upstream unavailable".to_owned(),
    }
}

/// Cache on a manual clock at t=0 with 3600s tokens trusted for 3300s.
pub fn manual_cache(
    exchange: ScriptedExchange,
    policy: ExpiryPolicy,
) -> (CredentialTokenCache<ScriptedExchange>, Arc<ManualClock>, Arc<AtomicUsize>) {
    let calls = exchange.calls();
    let clock = Arc::new(ManualClock::at_epoch());
    let cache = CredentialTokenCache::new(exchange, clock.clone(), policy);
    (cache, clock, calls)
}

/// Poll `condition` every 5ms for up to 2s.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within 2s");
}

pub fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

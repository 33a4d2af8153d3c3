use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::token::Token;
use crate::error::{CacheError, Result};
use crate::helpers::time::{get_instant, Clock, SystemClock};
use crate::observability::metrics::get_metrics;
use crate::sources::TokenExchange;

/// How long an exchanged token is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// used when the provider does not state `expires_in`
    pub requested_ttl: Duration,
    /// subtracted from the stated lifetime, absorbs clock drift and request latency
    pub safety_margin: Duration,
    /// zero disables background refresh
    pub refresh_ahead: Duration,
}

impl ExpiryPolicy {
    pub fn new(requested_ttl_seconds: u64, safety_margin_seconds: u64, refresh_ahead_seconds: u64) -> Self {
        Self {
            requested_ttl: seconds(requested_ttl_seconds),
            safety_margin: seconds(safety_margin_seconds),
            refresh_ahead: seconds(refresh_ahead_seconds),
        }
    }

    /// Cache lifetime for a token whose provider stated `expires_in` seconds.
    ///
    /// A stated lifetime that does not outlast the safety margin is trusted for
    /// half its length instead. `None` when the token is already expired.
    pub fn lifetime(&self, expires_in: Option<u64>) -> Option<Duration> {
        let stated = expires_in.map(seconds).unwrap_or(self.requested_ttl);
        let trimmed = stated - self.safety_margin;
        if trimmed > Duration::zero() {
            return Some(trimmed);
        }
        Some(stated / 2).filter(|half| *half > Duration::zero())
    }
}

impl Default for ExpiryPolicy {
    /// 60 minute tokens trusted for 55.
    fn default() -> Self {
        Self::new(3600, 300, 0)
    }
}

fn seconds(value: u64) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TokenState {
    Empty,
    Valid { expires_at: DateTime<Utc> },
    Stale { expired_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    #[serde(flatten)]
    pub token: TokenState,
    /// an exchange is in flight
    pub refreshing: bool,
}

type PendingExchange = Shared<BoxFuture<'static, Result<Token>>>;

#[derive(Default)]
struct Slots {
    token: Option<Token>,
    pending: Option<(u64, PendingExchange)>,
    exchange_seq: u64,
}

struct Inner<E> {
    exchange: E,
    clock: Arc<dyn Clock>,
    policy: ExpiryPolicy,
    slots: Mutex<Slots>,
}

/// Holds one bearer token and hands it out while valid.
///
/// Misses and forced refreshes share a single in-flight exchange: whoever
/// arrives while one is running awaits the same outcome. The exchange runs on
/// its own task, so callers giving up early do not cancel it for the others.
/// The slot lock is never held across an `.await`.
pub struct CredentialTokenCache<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for CredentialTokenCache<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: TokenExchange> fmt::Debug for CredentialTokenCache<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialTokenCache")
            .field("policy", &self.inner.policy)
            .field("status", &self.status())
            .finish()
    }
}

impl<E: TokenExchange> CredentialTokenCache<E> {
    pub fn new(exchange: E, clock: Arc<dyn Clock>, policy: ExpiryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                exchange,
                clock,
                policy,
                slots: Mutex::new(Slots::default()),
            }),
        }
    }

    pub fn with_system_clock(exchange: E, policy: ExpiryPolicy) -> Self {
        Self::new(exchange, Arc::new(SystemClock), policy)
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.inner.policy
    }

    /// A currently valid token, exchanging credentials only when none is held.
    pub async fn get_token(&self) -> Result<Token> {
        let metrics = get_metrics();
        let now = self.inner.clock.now();

        let pending = {
            let mut slots = self.inner.slots();
            if let Some(token) = slots.token.as_ref().filter(|t| t.is_valid_at(now)).cloned() {
                metrics.cache_hits.inc();
                if token.should_refresh_at(now) {
                    let (_, joined) = self.join_or_start(&mut slots);
                    if joined {
                        metrics.single_flight_joins.inc();
                    } else {
                        debug!(expires_at = %token.expires_at(), "refresh-ahead exchange started");
                    }
                }
                return Ok(token);
            }

            metrics.cache_misses.inc();
            let (pending, joined) = self.join_or_start(&mut slots);
            if joined {
                metrics.single_flight_joins.inc();
            }
            pending
        };

        pending.await
    }

    /// Exchange now, even if the held token is still valid.
    ///
    /// On failure the held token stays in place.
    pub async fn refresh(&self) -> Result<Token> {
        let pending = {
            let mut slots = self.inner.slots();
            let (pending, joined) = self.join_or_start(&mut slots);
            if joined {
                get_metrics().single_flight_joins.inc();
            }
            pending
        };
        pending.await
    }

    /// Drop the held token so the next `get_token` exchanges again.
    ///
    /// An exchange already in flight is left alone; its token is newer than
    /// the one dropped here and is stored when it lands.
    pub fn invalidate(&self) {
        let dropped = self.inner.slots().token.take();
        get_metrics().invalidations.inc();
        match dropped {
            Some(token) => info!(expires_at = %token.expires_at(), "cached token invalidated"),
            None => debug!("invalidate on empty cache"),
        }
    }

    pub fn status(&self) -> CacheStatus {
        let now = self.inner.clock.now();
        let slots = self.inner.slots();
        let token = match &slots.token {
            None => TokenState::Empty,
            Some(t) if t.is_valid_at(now) => TokenState::Valid {
                expires_at: t.expires_at(),
            },
            Some(t) => TokenState::Stale {
                expired_at: t.expires_at(),
            },
        };
        CacheStatus {
            token,
            refreshing: slots.pending.is_some(),
        }
    }

    /// Attach to the in-flight exchange, or start one. `true` when attached.
    fn join_or_start(&self, slots: &mut Slots) -> (PendingExchange, bool) {
        if let Some((_, pending)) = &slots.pending {
            return (pending.clone(), true);
        }

        slots.exchange_seq += 1;
        let seq = slots.exchange_seq;
        let handle = tokio::spawn(Arc::clone(&self.inner).run_exchange(seq));
        let inner = Arc::clone(&self.inner);
        let pending = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    // the task never reached its own cleanup
                    inner.clear_pending(&mut inner.slots(), seq);
                    Err(CacheError::Aborted(err.to_string()))
                }
            }
        }
        .boxed()
        .shared();

        slots.pending = Some((seq, pending.clone()));
        (pending, false)
    }
}

impl<E: TokenExchange> Inner<E> {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear_pending(&self, slots: &mut Slots, seq: u64) {
        if matches!(&slots.pending, Some((pending_seq, _)) if *pending_seq == seq) {
            slots.pending = None;
        }
    }

    async fn run_exchange(self: Arc<Self>, seq: u64) -> Result<Token> {
        let metrics = get_metrics();
        let issued_at = self.clock.now();
        let start = get_instant();
        metrics.exchange_requests.inc();

        let exchanged = match AssertUnwindSafe(self.exchange.exchange()).catch_unwind().await {
            Ok(exchanged) => exchanged,
            Err(panic) => Err(CacheError::Aborted(format!("exchange panicked: {}", panic_message(&*panic)))),
        };
        let outcome = exchanged.and_then(|grant| {
            match self.policy.lifetime(grant.expires_in) {
                Some(lifetime) => Ok(Token::new(grant.access_token, issued_at, lifetime, self.policy.refresh_ahead)),
                None => Err(CacheError::CredentialExchange {
                    status: 200,
                    body: format!("access token expires immediately (expires_in={:?})", grant.expires_in),
                }),
            }
        });
        metrics.exchange_duration.observe(start.elapsed().as_secs_f64());

        {
            let mut slots = self.slots();
            self.clear_pending(&mut slots, seq);
            match &outcome {
                Ok(token) => {
                    slots.token = Some(token.clone());
                    metrics.token_expiry_unix.set(token.expires_at().timestamp());
                }
                Err(err) => {
                    metrics.exchange_failures.with_label_values(&[err.reason()]).inc();
                }
            }
        }

        match &outcome {
            Ok(token) => info!(
                issued_at = %token.issued_at(),
                expires_at = %token.expires_at(),
                "credential exchange succeeded"
            ),
            Err(err) => warn!(error = %err, "credential exchange failed"),
        }
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifetime_prefers_provider_stated_ttl() {
        let policy = ExpiryPolicy::new(3600, 300, 0);
        assert_eq!(policy.lifetime(None), Some(Duration::seconds(3300)));
        assert_eq!(policy.lifetime(Some(1800)), Some(Duration::seconds(1500)));
    }

    #[test]
    fn short_lived_tokens_are_trusted_for_half_their_life() {
        let policy = ExpiryPolicy::new(3600, 300, 0);
        assert_eq!(policy.lifetime(Some(300)), Some(Duration::seconds(150)));
        assert_eq!(policy.lifetime(Some(120)), Some(Duration::seconds(60)));
        assert_eq!(policy.lifetime(Some(1)), Some(Duration::milliseconds(500)));
        assert_eq!(policy.lifetime(Some(0)), None);
    }
}

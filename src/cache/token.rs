use chrono::{DateTime, Duration, Utc};

/// Bearer token held by the cache.
///
/// Only the cache builds these; everyone else gets clones through
/// [`CredentialTokenCache::get_token`](crate::cache::token_cache::CredentialTokenCache::get_token).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    /// start refreshing in the background from here on
    refresh_at: DateTime<Utc>,
}

impl Token {
    pub(crate) fn new(
        value: String,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
        refresh_ahead: Duration,
    ) -> Self {
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let refresh_at = expires_at
            .checked_sub_signed(refresh_ahead)
            .unwrap_or(issued_at)
            .max(issued_at);
        Self {
            value,
            issued_at,
            expires_at,
            refresh_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn refresh_at(&self) -> DateTime<Utc> {
        self.refresh_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Valid, but inside the refresh-ahead window.
    pub fn should_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.is_valid_at(now) && now >= self.refresh_at
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn validity_window_is_half_open() {
        let token = Token::new("A".into(), at(0), Duration::seconds(3300), Duration::zero());

        assert!(token.is_valid_at(at(0)));
        assert!(token.is_valid_at(at(3299)));
        assert!(!token.is_valid_at(at(3300)));
        assert!(!token.should_refresh_at(at(3299)));
        assert_eq!(token.bearer(), "Bearer A");
    }

    #[test]
    fn refresh_window_precedes_expiry() {
        let token = Token::new("A".into(), at(100), Duration::seconds(300), Duration::seconds(60));

        assert_eq!(token.refresh_at(), at(340));
        assert!(!token.should_refresh_at(at(339)));
        assert!(token.should_refresh_at(at(340)));
        // stale tokens are not "refreshable", they are gone
        assert!(!token.should_refresh_at(at(400)));
    }

    #[test]
    fn refresh_ahead_longer_than_lifetime_clamps_to_issue_time() {
        let token = Token::new("A".into(), at(10), Duration::seconds(30), Duration::seconds(120));
        assert_eq!(token.refresh_at(), at(10));
    }
}

use thiserror::Error;

/// Errors surfaced by the credential cache and its collaborators.
///
/// `Clone` because one exchange outcome is handed to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Required credentials or settings are missing. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The token endpoint answered, but not with a usable token.
    #[error("credential exchange failed with status {status}: {body}")]
    CredentialExchange { status: u16, body: String },
    /// An upstream (token endpoint or resource API) could not be reached.
    #[error("upstream request failed: {0}")]
    Transport(String),
    /// The resource API rejected a freshly exchanged token too.
    #[error("upstream rejected credentials with status {status}")]
    UpstreamAuthRejection { status: u16 },
    #[error("credential exchange task aborted: {0}")]
    Aborted(String),
}

impl CacheError {
    /// Label used for failure metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            CacheError::Configuration(_) => "configuration",
            CacheError::CredentialExchange { .. } => "exchange",
            CacheError::Transport(_) => "transport",
            CacheError::UpstreamAuthRejection { .. } => "auth_rejection",
            CacheError::Aborted(_) => "aborted",
        }
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Transport(err.to_string())
    }
}

pub type Result<T> = core::result::Result<T, CacheError>;

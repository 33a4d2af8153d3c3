pub mod token;
pub mod token_cache;

pub use token::Token;
pub use token_cache::{CacheStatus, CredentialTokenCache, ExpiryPolicy, TokenState};

pub mod common;

mod client_credentials_exchange;

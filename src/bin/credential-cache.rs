use clap::arg;
use clap::command;
use clap::Parser;
use credential_cache::cache::{CredentialTokenCache, ExpiryPolicy};
use credential_cache::observability::service_resources_metrics::collect_process_metrics;
use credential_cache::resilience::retry::RetrySettings;
use credential_cache::server;
use credential_cache::server::server::AppState;
use credential_cache::sources::oauth2::ClientCredentialsExchange;
use credential_cache::sources::resource::ResourceClient;
use credential_cache::utils::config_loader;
use credential_cache::utils::logging;
use anyhow::Result;
use credential_cache::utils::logging::LogLevel;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "credential-cache.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL" , value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, init logging
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level);

    // -------------------------------
    // 2. Build the credential exchange
    //
    // missing client id/secret is fatal
    // -------------------------------

    let exchange = ClientCredentialsExchange::from_config(&service_config.credentials)?;

    // -------------------------------
    // 3. Build the cache
    // -------------------------------

    let cache_config = &service_config.cache;
    let policy = ExpiryPolicy::new(
        cache_config.requested_ttl_seconds,
        cache_config.safety_margin_seconds,
        cache_config.refresh_ahead_seconds,
    );
    let cache = CredentialTokenCache::with_system_clock(exchange, policy);

    // -------------------------------
    // 4. Prefetch the first token
    //
    // a failure here is not fatal, requests will exchange on demand
    // -------------------------------

    if service_config.settings.prefetch {
        let retry = RetrySettings::from(service_config.settings.retry.as_ref());
        match retry.run_with_retry(|| cache.get_token()).await {
            Ok(token) => info!(expires_at = %token.expires_at(), "initial token fetched"),
            Err(err) => error!(error = %err, "initial token fetch failed, serving anyway"),
        }
    }

    // -------------------------------
    // 5. Resource proxy
    // -------------------------------

    let resource = service_config
        .resource
        .as_ref()
        .map(|cfg| ResourceClient::from_config(cfg, cache.clone()))
        .transpose()?;

    // -------------------------------
    // 6. Http server and process metrics
    // -------------------------------

    let metrics_enabled = service_config.settings.metrics.is_enabled;
    tokio::spawn(async move {
        if let Err(err) = collect_process_metrics(metrics_enabled).await {
            error!(error = %err, "process metrics collector stopped");
        }
    });

    let state = AppState::new(cache, resource);
    info!("Service starting...");
    server::server::start(&service_config.settings, state).await
}

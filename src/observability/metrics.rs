use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use tracing::info;
use std::sync::{Arc, OnceLock};

// Declare the static OnceLock to hold the Metrics.
static METRICS_INSTANCE: OnceLock<Arc<Metrics>> = OnceLock::new();

/// Initializes on first use and returns the process-wide metrics.
pub fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE.get_or_init(|| {
        info!("Initializing Metrics ...");
        Metrics::new()
    })
}


#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Exchange metrics
    pub exchange_requests: IntCounter,
    pub exchange_failures: IntCounterVec,
    pub exchange_duration: Histogram,

    // Cache metrics
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub single_flight_joins: IntCounter,
    pub invalidations: IntCounter,
    pub token_expiry_unix: IntGauge,

    // Resource proxy metrics
    pub resource_requests: IntCounterVec,
    pub resource_auth_retries: IntCounter,

    // Config/runtime
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,

        // === Service resource metrics ===
    pub process_cpu_usage: Gauge,
    pub process_memory_usage: IntGauge,
    pub process_open_fds: IntGauge,
    pub process_start_time: IntGauge,
    pub process_uptime: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("credentialcache".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Exchange
            exchange_requests: IntCounter::new("exchange_requests_total", "Credential exchanges started").unwrap(),
            exchange_failures: IntCounterVec::new(Opts::new("exchange_failures_total", "Credential exchange failures by reason"),&["reason"],).unwrap(),
            exchange_duration: Histogram::with_opts(HistogramOpts::new("exchange_duration_seconds", "Credential exchange duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),).unwrap(),

            // Cache
            cache_hits: IntCounter::new("cache_hits_total", "Token requests served from cache").unwrap(),
            cache_misses: IntCounter::new("cache_misses_total", "Token requests that needed an exchange").unwrap(),
            single_flight_joins: IntCounter::new("single_flight_joins_total", "Requests that attached to an in-flight exchange").unwrap(),
            invalidations: IntCounter::new("invalidations_total", "Explicit token invalidations").unwrap(),
            token_expiry_unix: IntGauge::new("token_expiry_unix_seconds", "Cached token expiry timestamp").unwrap(),

            // Resource
            resource_requests: IntCounterVec::new(Opts::new("resource_requests_total", "Resource API requests by status"),&["status"],).unwrap(),
            resource_auth_retries: IntCounter::new("resource_auth_retries_total", "Resource requests retried after 401/403").unwrap(),

            // Config/runtime
            config_validation_errors: IntCounter::new("config_validation_errors_total","Validation errors during startup",).unwrap(),
            up: IntGauge::new("up", "1 if service is healthy").unwrap(),
            process_cpu_usage: Gauge::new("process_cpu_usage_percent", "CPU usage % of this process").unwrap(),
            process_memory_usage: IntGauge::new("process_memory_usage_bytes", "Resident memory used by this process").unwrap(),
            process_open_fds: IntGauge::new("process_open_fds", "Number of open file descriptors").unwrap(),
            process_start_time: IntGauge::new("process_start_time_seconds", "Process start time (UNIX seconds)").unwrap(),
            process_uptime: IntGauge::new("process_uptime_seconds", "Process uptime seconds").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.exchange_requests.clone())).unwrap();
        reg.register(Box::new(metrics.exchange_failures.clone())).unwrap();
        reg.register(Box::new(metrics.exchange_duration.clone())).unwrap();
        reg.register(Box::new(metrics.cache_hits.clone())).unwrap();
        reg.register(Box::new(metrics.cache_misses.clone())).unwrap();
        reg.register(Box::new(metrics.single_flight_joins.clone())).unwrap();
        reg.register(Box::new(metrics.invalidations.clone())).unwrap();
        reg.register(Box::new(metrics.token_expiry_unix.clone())).unwrap();
        reg.register(Box::new(metrics.resource_requests.clone())).unwrap();
        reg.register(Box::new(metrics.resource_auth_retries.clone())).unwrap();
        reg.register(Box::new(metrics.config_validation_errors.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        reg.register(Box::new(metrics.process_cpu_usage.clone())).unwrap();
        reg.register(Box::new(metrics.process_memory_usage.clone())).unwrap();
        reg.register(Box::new(metrics.process_open_fds.clone())).unwrap();
        reg.register(Box::new(metrics.process_start_time.clone())).unwrap();
        reg.register(Box::new(metrics.process_uptime.clone())).unwrap();

        metrics
    }
}

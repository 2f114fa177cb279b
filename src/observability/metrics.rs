use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tracing::info;

static METRICS_PREFIX: &str = "sessionagent";

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Refresh metrics
    pub refresh_requests: IntCounter,
    pub refresh_failures: IntCounterVec,
    pub refresh_duration: HistogramVec,
    pub waiters_joined: IntCounter,
    pub stale_responses_ignored: IntCounter,

    // Session metrics
    pub configuration_expiry_unix: IntGauge,

    // Runtime
    pub up: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Arc<Self>> {
        info!("Initializing Metrics ...");
        let registry = Registry::new_custom(Some(METRICS_PREFIX.into()), None)?;

        let metrics = Arc::new(Self {
            // Refresh
            refresh_requests: IntCounter::new("refresh_requests_total", "Token provider requests dispatched")?,
            refresh_failures: IntCounterVec::new(Opts::new("refresh_failures_total", "Failed refreshes by reason"), &["reason"])?,
            refresh_duration: HistogramVec::new(HistogramOpts::new("refresh_duration_seconds", "Time from dispatch to provider answer").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]), &["outcome"])?,
            waiters_joined: IntCounter::new("waiters_joined_total", "Callers attached to an in-flight refresh")?,
            stale_responses_ignored: IntCounter::new("stale_responses_ignored_total", "Provider answers with unknown or expired correlation ids")?,

            // Session
            configuration_expiry_unix: IntGauge::new("configuration_expiry_unix_seconds", "Expiry of the cached session configuration")?,

            up: IntGauge::new("up", "1 if service is healthy")?,

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.refresh_requests.clone()))?;
        reg.register(Box::new(metrics.refresh_failures.clone()))?;
        reg.register(Box::new(metrics.refresh_duration.clone()))?;
        reg.register(Box::new(metrics.waiters_joined.clone()))?;
        reg.register(Box::new(metrics.stale_responses_ignored.clone()))?;
        reg.register(Box::new(metrics.configuration_expiry_unix.clone()))?;
        reg.register(Box::new(metrics.up.clone()))?;

        Ok(metrics)
    }
}

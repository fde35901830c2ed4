use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: Outcome,
}

/// How a webhook call ended.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Resolved,
    Accepted,
    Rejected,
    MalformedIdentity,
    UserNotFound,
    KeyParseError,
    StoreError,
}

impl Outcome {
    pub fn labels(self) -> OutcomeLabels {
        OutcomeLabels { outcome: self }
    }
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Every Prometheus metric exposed by the service.
pub struct Metrics {
    pub config_requests_total: Family<OutcomeLabels, Counter>,
    pub pubkey_requests_total: Family<OutcomeLabels, Counter>,
    pub pubkey_duration_seconds: Histogram,
    pub trusted_fingerprints: Gauge,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let config_requests_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "sshgate_config_requests",
            "Route resolution webhook calls by outcome",
            config_requests_total.clone(),
        );

        let pubkey_requests_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "sshgate_pubkey_requests",
            "Public-key webhook calls by outcome",
            pubkey_requests_total.clone(),
        );

        let pubkey_duration_seconds = Histogram::new(exponential_buckets(0.0005, 2.0, 14));
        registry.register(
            "sshgate_pubkey_duration_seconds",
            "Public-key verification latency including the user lookup",
            pubkey_duration_seconds.clone(),
        );

        let trusted_fingerprints: Gauge = Gauge::default();
        registry.register(
            "sshgate_trusted_fingerprints",
            "Number of backend host-key fingerprints handed to the gateway",
            trusted_fingerprints.clone(),
        );

        Self {
            config_requests_total,
            pubkey_requests_total,
            pubkey_duration_seconds,
            trusted_fingerprints,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in [`crate::AppState`].
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }

    /// Render the registry in OpenMetrics text format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)
            .map_err(|e| anyhow::anyhow!("metrics encoding failed: {e}"))?;
        Ok(buf)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_outcomes() {
        let registry = MetricsRegistry::new();
        registry
            .metrics
            .pubkey_requests_total
            .get_or_create(&Outcome::Accepted.labels())
            .inc();
        registry
            .metrics
            .config_requests_total
            .get_or_create(&Outcome::MalformedIdentity.labels())
            .inc();
        registry.metrics.trusted_fingerprints.set(3);

        let text = registry.encode().unwrap();
        assert!(text.contains("sshgate_pubkey_requests_total{outcome=\"Accepted\"} 1"));
        assert!(text.contains("sshgate_config_requests_total{outcome=\"MalformedIdentity\"} 1"));
        assert!(text.contains("sshgate_trusted_fingerprints 3"));
        assert!(text.ends_with("# EOF\n"));
    }
}

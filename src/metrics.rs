//! Metrics collection and export module

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub requests_proxied: IntCounter,
    pub submissions_observed: IntCounter,
    pub submissions_rejected: IntCounter,
    pub bundles_tracked: IntCounter,
    pub bundles_confirmed: IntCounter,
    pub bundles_exhausted: IntCounter,
    pub bundles_skipped_zero_value: IntCounter,
    pub reattach_total: IntCounter,
    pub reattach_failed: IntCounter,
    pub promotions_total: IntCounter,
    pub promotions_failed: IntCounter,

    // Gauges
    pub active_trackers: IntGauge,

    // Histograms
    pub inclusion_check_latency: Histogram,
    pub reattach_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_proxied = IntCounter::with_opts(Opts::new(
            "requests_proxied_total",
            "Requests forwarded to the node",
        ))?;

        let submissions_observed = IntCounter::with_opts(Opts::new(
            "submissions_observed_total",
            "Transaction submissions seen at the ingestion boundary",
        ))?;

        let submissions_rejected = IntCounter::with_opts(Opts::new(
            "submissions_rejected_total",
            "Submissions dropped for malformed trytes or payloads",
        ))?;

        let bundles_tracked = IntCounter::with_opts(Opts::new(
            "bundles_tracked_total",
            "Bundle trackers scheduled",
        ))?;

        let bundles_confirmed = IntCounter::with_opts(Opts::new(
            "bundles_confirmed_total",
            "Bundles observed as confirmed",
        ))?;

        let bundles_exhausted = IntCounter::with_opts(Opts::new(
            "bundles_exhausted_total",
            "Bundles given up on after the attempt budget",
        ))?;

        let bundles_skipped_zero_value = IntCounter::with_opts(Opts::new(
            "bundles_skipped_zero_value_total",
            "Zero-value bundles never scheduled",
        ))?;

        let reattach_total = IntCounter::with_opts(Opts::new(
            "reattach_total",
            "Reattach invocations issued",
        ))?;

        let reattach_failed = IntCounter::with_opts(Opts::new(
            "reattach_failed_total",
            "Reattach invocations that failed",
        ))?;

        let promotions_total = IntCounter::with_opts(Opts::new(
            "promotions_total",
            "Promotion steps issued",
        ))?;

        let promotions_failed = IntCounter::with_opts(Opts::new(
            "promotions_failed_total",
            "Promotion steps that failed",
        ))?;

        let active_trackers = IntGauge::with_opts(Opts::new(
            "active_trackers",
            "Bundle trackers currently scheduled",
        ))?;

        let inclusion_check_latency = Histogram::with_opts(
            HistogramOpts::new(
                "inclusion_check_latency_seconds",
                "Latency of the three-call inclusion check",
            )
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;

        let reattach_latency = Histogram::with_opts(
            HistogramOpts::new(
                "reattach_latency_seconds",
                "Latency of a full reattach (tip selection + attach + broadcast)",
            )
            .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(requests_proxied.clone()))?;
        registry.register(Box::new(submissions_observed.clone()))?;
        registry.register(Box::new(submissions_rejected.clone()))?;
        registry.register(Box::new(bundles_tracked.clone()))?;
        registry.register(Box::new(bundles_confirmed.clone()))?;
        registry.register(Box::new(bundles_exhausted.clone()))?;
        registry.register(Box::new(bundles_skipped_zero_value.clone()))?;
        registry.register(Box::new(reattach_total.clone()))?;
        registry.register(Box::new(reattach_failed.clone()))?;
        registry.register(Box::new(promotions_total.clone()))?;
        registry.register(Box::new(promotions_failed.clone()))?;
        registry.register(Box::new(active_trackers.clone()))?;
        registry.register(Box::new(inclusion_check_latency.clone()))?;
        registry.register(Box::new(reattach_latency.clone()))?;

        Ok(Self {
            registry,
            requests_proxied,
            submissions_observed,
            submissions_rejected,
            bundles_tracked,
            bundles_confirmed,
            bundles_exhausted,
            bundles_skipped_zero_value,
            reattach_total,
            reattach_failed,
            promotions_total,
            promotions_failed,
            active_trackers,
            inclusion_check_latency,
            reattach_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_construct_and_register() {
        let m = Metrics::new().unwrap();
        m.bundles_tracked.inc();
        m.active_trackers.set(3);
        assert_eq!(m.bundles_tracked.get(), 1);
        assert_eq!(m.active_trackers.get(), 3);
        assert!(!m.registry().gather().is_empty());
    }

    #[test]
    fn test_global_instance_is_shared() {
        let before = metrics().requests_proxied.get();
        metrics().requests_proxied.inc();
        assert_eq!(metrics().requests_proxied.get(), before + 1);
    }
}

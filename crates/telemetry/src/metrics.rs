//! Prometheus metric families for the query pipeline.

use prometheus::{
    CounterVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};

/// All metric families, registered on an owned registry.
///
/// Explicitly constructed and passed around; there are no global statics, so
/// hosts and tests can each own an isolated registry.
pub struct MetricsRegistry {
    registry: Registry,
    pub requests_total: IntCounterVec,
    pub errors_total: IntCounterVec,
    pub tokens_total: IntCounterVec,
    pub cost_usd_total: CounterVec,
    pub request_duration_seconds: HistogramVec,
    pub active_requests: IntGauge,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("switchboard_requests_total", "Total queries processed"),
            &["framework", "model", "vector_store", "status"],
        )?;
        let errors_total = IntCounterVec::new(
            Opts::new("switchboard_errors_total", "Total failed queries"),
            &["framework", "model", "error_type"],
        )?;
        let tokens_total = IntCounterVec::new(
            Opts::new("switchboard_tokens_total", "Total tokens accounted"),
            &["framework", "model", "token_type"],
        )?;
        let cost_usd_total = CounterVec::new(
            Opts::new("switchboard_cost_usd_total", "Total cost accounted in USD"),
            &["framework", "model", "cost_type"],
        )?;
        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "switchboard_request_duration_seconds",
                "End-to-end query duration",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["framework", "model", "vector_store"],
        )?;
        let active_requests = IntGauge::new(
            "switchboard_active_requests",
            "Queries currently in flight",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(tokens_total.clone()))?;
        registry.register(Box::new(cost_usd_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(active_requests.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            errors_total,
            tokens_total,
            cost_usd_total,
            request_duration_seconds,
            active_requests,
        })
    }

    /// The underlying registry, for host exposition (`gather()`).
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_gathers_all_families() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics
            .requests_total
            .with_label_values(&["langgraph", "gpt-4o-mini", "faiss", "completed"])
            .inc();
        metrics.active_requests.inc();

        let families = metrics.registry().gather();
        let names: Vec<&str> = families.iter().map(|f| f.name()).collect();
        assert!(names.contains(&"switchboard_requests_total"));
        assert!(names.contains(&"switchboard_active_requests"));
    }

    #[test]
    fn two_registries_are_isolated() {
        let a = MetricsRegistry::new().unwrap();
        let b = MetricsRegistry::new().unwrap();
        a.active_requests.inc();
        assert_eq!(a.active_requests.get(), 1);
        assert_eq!(b.active_requests.get(), 0);
    }
}

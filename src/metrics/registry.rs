use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for latency metrics (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`,
/// `gauge!`, `histogram!`) can be used anywhere in the codebase. The
/// `PrometheusHandle` is retained solely for rendering the `/metrics`
/// endpoint.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric
    /// descriptions. Must be called once at startup before any `counter!` /
    /// `gauge!` / `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        describe_counter!(
            "limiter_decisions_total",
            Unit::Count,
            "Admission decisions, labeled by algorithm and outcome"
        );
        describe_counter!(
            "limiter_http_requests_total",
            Unit::Count,
            "HTTP requests served, labeled by method and status code"
        );
        describe_histogram!(
            "limiter_http_request_duration_seconds",
            Unit::Seconds,
            "End-to-end request handling duration"
        );
        describe_counter!(
            "limiter_connections_total",
            Unit::Count,
            "Accepted and failed TCP connections"
        );
        describe_gauge!(
            "limiter_connections_active",
            Unit::Count,
            "Currently open client connections"
        );

        Self { handle }
    }

    /// Render the current metric registry in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

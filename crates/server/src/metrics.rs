use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Registry and collectors bundled into one value held in app state, so tests
/// and multiple server instances never share counters.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    ai_requests_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("orbitask_http_requests_total", "HTTP request count."),
            &["route", "method", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "orbitask_http_request_duration_seconds",
                "HTTP request duration in seconds.",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["route", "method", "outcome"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        let ai_requests_total = IntCounterVec::new(
            Opts::new("orbitask_ai_requests_total", "Inference pass-through count."),
            &["scope", "outcome"],
        )?;
        registry.register(Box::new(ai_requests_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            ai_requests_total,
        })
    }

    pub fn observe_http_request(&self, route: &str, method: &str, status: u16, duration: Duration) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[route, method, status_str.as_str()])
            .inc();

        let outcome = if (200..400).contains(&status) {
            "success"
        } else {
            "error"
        };
        self.http_request_duration_seconds
            .with_label_values(&[route, method, outcome])
            .observe(duration.as_secs_f64());
    }

    /// `scope` is station/board/task; `outcome` is answered/fallback.
    pub fn observe_ai_request(&self, scope: &str, outcome: &str) {
        self.ai_requests_total
            .with_label_values(&[scope, outcome])
            .inc();
    }

    pub fn render(&self) -> Result<(Vec<u8>, String), prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok((buffer, encoder.format_type().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_do_not_share_counters() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();

        a.observe_http_request("/api/stations", "GET", 200, Duration::from_millis(5));

        let (body_a, _) = a.render().unwrap();
        let (body_b, _) = b.render().unwrap();
        assert!(String::from_utf8(body_a).unwrap().contains("orbitask_http_requests_total"));
        assert!(!String::from_utf8(body_b).unwrap().contains("/api/stations"));
    }

    #[test]
    fn error_statuses_land_in_the_error_outcome() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_http_request("/api/auth/login", "POST", 401, Duration::from_millis(2));

        let (body, _) = metrics.render().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("outcome=\"error\""));
    }
}

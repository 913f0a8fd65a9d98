//! Hand-rolled Prometheus-style metrics surface.
//!
//! This codebase does not depend on the `prometheus` crate: counters,
//! gauges, and histograms are plain label-keyed maps behind a mutex, and the
//! `/metrics` handler formats `# HELP` / `# TYPE` exposition text directly,
//! consistent with this codebase's existing metrics handler.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

const DURATION_BUCKETS: [f64; 12] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

type Labels = Vec<String>;

#[derive(Default)]
struct CounterFamily {
    values: Mutex<HashMap<Labels, u64>>,
}

impl CounterFamily {
    fn inc(&self, labels: Labels) {
        *self.values.lock().unwrap().entry(labels).or_insert(0) += 1;
    }

    fn render(&self, name: &str, help: &str, label_names: &[&str], out: &mut String) {
        let values = self.values.lock().unwrap();
        if values.is_empty() {
            return;
        }
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} counter");
        for (labels, value) in values.iter() {
            let _ = writeln!(out, "{name}{{{}}} {value}", format_labels(label_names, labels));
        }
    }
}

#[derive(Default)]
struct GaugeFamily {
    values: Mutex<HashMap<Labels, f64>>,
}

impl GaugeFamily {
    fn set(&self, labels: Labels, value: f64) {
        self.values.lock().unwrap().insert(labels, value);
    }

    fn render(&self, name: &str, help: &str, label_names: &[&str], out: &mut String) {
        let values = self.values.lock().unwrap();
        if values.is_empty() {
            return;
        }
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} gauge");
        for (labels, value) in values.iter() {
            let _ = writeln!(out, "{name}{{{}}} {value}", format_labels(label_names, labels));
        }
    }
}

struct HistogramEntry {
    bucket_counts: [u64; DURATION_BUCKETS.len()],
    sum: f64,
    count: u64,
}

impl Default for HistogramEntry {
    fn default() -> Self {
        Self {
            bucket_counts: [0; DURATION_BUCKETS.len()],
            sum: 0.0,
            count: 0,
        }
    }
}

#[derive(Default)]
struct HistogramFamily {
    entries: Mutex<HashMap<Labels, HistogramEntry>>,
}

impl HistogramFamily {
    fn observe(&self, labels: Labels, value_secs: f64) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(labels).or_default();
        entry.sum += value_secs;
        entry.count += 1;
        for (i, bucket) in DURATION_BUCKETS.iter().enumerate() {
            if value_secs <= *bucket {
                entry.bucket_counts[i] += 1;
            }
        }
    }

    fn render(&self, name: &str, help: &str, label_names: &[&str], out: &mut String) {
        let entries = self.entries.lock().unwrap();
        if entries.is_empty() {
            return;
        }
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} histogram");
        for (labels, entry) in entries.iter() {
            let label_str = format_labels(label_names, labels);
            let joined = if label_str.is_empty() {
                String::new()
            } else {
                format!("{label_str},")
            };
            for (i, bucket) in DURATION_BUCKETS.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{name}_bucket{{{joined}le=\"{bucket}\"}} {}",
                    entry.bucket_counts[i]
                );
            }
            let _ = writeln!(out, "{name}_bucket{{{joined}le=\"+Inf\"}} {}", entry.count);
            let _ = writeln!(out, "{name}_sum{{{label_str}}} {}", entry.sum);
            let _ = writeln!(out, "{name}_count{{{label_str}}} {}", entry.count);
        }
    }
}

fn format_labels(names: &[&str], values: &[String]) -> String {
    names
        .iter()
        .zip(values.iter())
        .map(|(name, value)| format!("{name}=\"{}\"", escape(value)))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Strips `http(s)://` and a trailing `/` from an upstream URL, per the
/// metrics label normalisation rule.
pub fn normalize_upstream_label(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

#[derive(Default)]
pub struct MetricsRegistry {
    http_requests_total: CounterFamily,
    http_request_duration_seconds: HistogramFamily,
    active_connections: AtomicI64,
    upstream_requests_total: CounterFamily,
    upstream_request_duration_seconds: HistogramFamily,
    circuit_breaker_state: GaugeFamily,
    circuit_breaker_transitions_total: CounterFamily,
    rate_limit_hits_total: CounterFamily,
    rate_limit_remaining: GaugeFamily,
    health_check_status: GaugeFamily,
    retry_attempts_total: CounterFamily,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_http_request(
        &self,
        tenant_id: &str,
        method: &str,
        route: &str,
        status_code: u16,
        duration_secs: f64,
    ) {
        let labels = vec![
            tenant_id.to_string(),
            method.to_string(),
            route.to_string(),
            status_code.to_string(),
        ];
        self.http_requests_total.inc(labels.clone());
        self.http_request_duration_seconds.observe(
            vec![tenant_id.to_string(), method.to_string(), route.to_string()],
            duration_secs,
        );
    }

    pub fn inc_active_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_active_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_upstream_request(
        &self,
        tenant_id: &str,
        upstream: &str,
        method: &str,
        status_code: u16,
        duration_secs: f64,
    ) {
        let upstream = normalize_upstream_label(upstream);
        self.upstream_requests_total.inc(vec![
            tenant_id.to_string(),
            upstream.clone(),
            method.to_string(),
            status_code.to_string(),
        ]);
        self.upstream_request_duration_seconds.observe(
            vec![tenant_id.to_string(), upstream, method.to_string()],
            duration_secs,
        );
    }

    pub fn set_circuit_breaker_state(
        &self,
        tenant_id: &str,
        route_id: &str,
        upstream: &str,
        gauge_value: f64,
    ) {
        self.circuit_breaker_state.set(
            vec![
                tenant_id.to_string(),
                route_id.to_string(),
                normalize_upstream_label(upstream),
            ],
            gauge_value,
        );
    }

    pub fn record_circuit_breaker_transition(
        &self,
        tenant_id: &str,
        route_id: &str,
        upstream: &str,
        from_state: &str,
        to_state: &str,
    ) {
        self.circuit_breaker_transitions_total.inc(vec![
            tenant_id.to_string(),
            route_id.to_string(),
            normalize_upstream_label(upstream),
            from_state.to_string(),
            to_state.to_string(),
        ]);
    }

    pub fn record_rate_limit_hit(&self, tenant_id: &str) {
        self.rate_limit_hits_total.inc(vec![tenant_id.to_string()]);
    }

    pub fn set_rate_limit_remaining(&self, tenant_id: &str, remaining: u64) {
        self.rate_limit_remaining
            .set(vec![tenant_id.to_string()], remaining as f64);
    }

    pub fn set_health_check_status(
        &self,
        tenant_id: &str,
        route_id: &str,
        upstream: &str,
        healthy: bool,
    ) {
        self.health_check_status.set(
            vec![
                tenant_id.to_string(),
                route_id.to_string(),
                normalize_upstream_label(upstream),
            ],
            if healthy { 1.0 } else { 0.0 },
        );
    }

    pub fn record_retry_attempt(&self, tenant_id: &str, route_id: &str, attempt: u32) {
        self.retry_attempts_total.inc(vec![
            tenant_id.to_string(),
            route_id.to_string(),
            attempt.to_string(),
        ]);
    }

    /// Renders the full exposition text in one pass.
    pub fn render(&self) -> String {
        let mut out = String::new();

        self.http_requests_total.render(
            "gateway_http_requests_total",
            "Total number of HTTP requests processed",
            &["tenant_id", "method", "route", "status_code"],
            &mut out,
        );
        self.http_request_duration_seconds.render(
            "gateway_http_request_duration_seconds",
            "HTTP request duration in seconds",
            &["tenant_id", "method", "route"],
            &mut out,
        );
        let _ = writeln!(out, "# HELP gateway_active_connections Current number of active connections");
        let _ = writeln!(out, "# TYPE gateway_active_connections gauge");
        let _ = writeln!(
            out,
            "gateway_active_connections {}",
            self.active_connections.load(Ordering::Relaxed)
        );
        self.upstream_requests_total.render(
            "gateway_upstream_requests_total",
            "Total number of upstream requests",
            &["tenant_id", "upstream", "method", "status_code"],
            &mut out,
        );
        self.upstream_request_duration_seconds.render(
            "gateway_upstream_request_duration_seconds",
            "Upstream request duration in seconds",
            &["tenant_id", "upstream", "method"],
            &mut out,
        );
        self.circuit_breaker_state.render(
            "gateway_circuit_breaker_state",
            "Circuit breaker state (0=CLOSED,1=OPEN,2=HALF_OPEN)",
            &["tenant_id", "route_id", "upstream"],
            &mut out,
        );
        self.circuit_breaker_transitions_total.render(
            "gateway_circuit_breaker_transitions_total",
            "Total number of circuit breaker state transitions",
            &["tenant_id", "route_id", "upstream", "from_state", "to_state"],
            &mut out,
        );
        self.rate_limit_hits_total.render(
            "gateway_rate_limit_hits_total",
            "Total number of requests denied by the rate limiter",
            &["tenant_id"],
            &mut out,
        );
        self.rate_limit_remaining.render(
            "gateway_rate_limit_remaining",
            "Remaining requests in the current rate limit window",
            &["tenant_id"],
            &mut out,
        );
        self.health_check_status.render(
            "gateway_health_check_status",
            "Upstream health status (0=unhealthy,1=healthy)",
            &["tenant_id", "route_id", "upstream"],
            &mut out,
        );
        self.retry_attempts_total.render(
            "gateway_retry_attempts_total",
            "Total number of retry attempts",
            &["tenant_id", "route_id", "attempt"],
            &mut out,
        );

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_upstream_labels() {
        assert_eq!(normalize_upstream_label("http://svc:8080/"), "svc:8080");
        assert_eq!(normalize_upstream_label("https://svc:8080"), "svc:8080");
    }

    #[test]
    fn render_includes_recorded_series() {
        let registry = MetricsRegistry::new();
        registry.record_http_request("t1", "GET", "r1", 200, 0.01);
        registry.inc_active_connections();
        registry.record_rate_limit_hit("t1");

        let rendered = registry.render();
        assert!(rendered.contains("gateway_http_requests_total"));
        assert!(rendered.contains("tenant_id=\"t1\""));
        assert!(rendered.contains("gateway_active_connections 1"));
        assert!(rendered.contains("gateway_rate_limit_hits_total"));
    }

    #[test]
    fn empty_families_are_omitted() {
        let registry = MetricsRegistry::new();
        let rendered = registry.render();
        assert!(!rendered.contains("gateway_http_requests_total"));
    }
}

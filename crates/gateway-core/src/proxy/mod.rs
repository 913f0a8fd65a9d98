//! Proxy orchestrator: the pipeline stage that turns a matched
//! route into an upstream call, wrapping it with the health, circuit
//! breaker, retry, and transform machinery built elsewhere in this crate.

use crate::metrics::MetricsRegistry;
use crate::models::{CircuitBreakerConfig, ResilienceConfig, Route, UpstreamConfig};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::fallback::fallback_response;
use crate::resilience::health::HealthChecker;
use crate::resilience::retry::{with_retry, RetryableError};
use crate::routing::matcher::{MatchError, RouteMatch, RouteMatcher};
use crate::transform::{apply_header_ops, apply_path_rewrite};
use actix_web::http::header::{HeaderMap as ActixHeaderMap, HeaderName, HeaderValue};
use actix_web::web::Bytes;
use actix_web::HttpResponse;
use std::sync::Arc;
use std::time::{Duration, Instant};

const FORWARDED_REQUEST_HEADER_ALLOWLIST: [&str; 6] = [
    "content-type",
    "accept",
    "accept-language",
    "accept-encoding",
    "user-agent",
    "authorization",
];

const HOP_BY_HOP_RESPONSE_HEADERS: [&str; 3] = ["connection", "keep-alive", "transfer-encoding"];

const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("no route matched {method} {path}")]
    NoRoute { method: String, path: String },
    #[error("no healthy upstream available")]
    UpstreamUnhealthy,
    #[error("circuit breaker is open")]
    CircuitOpen,
}

/// Everything a request needs in order to be forwarded, pulled out of the
/// inbound `HttpRequest` by the caller so this module stays framework-agnostic
/// about where the request came from.
pub struct InboundRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a ActixHeaderMap,
    pub peer_addr: Option<&'a str>,
    pub host: Option<&'a str>,
    pub scheme: &'a str,
    pub body: Bytes,
}

struct UpstreamSuccess {
    status: u16,
    headers: reqwest::header::HeaderMap,
    body: Bytes,
}

enum UpstreamAttemptError {
    Timeout,
    Network(String),
    Status {
        status: u16,
        headers: reqwest::header::HeaderMap,
        body: Bytes,
    },
}

impl RetryableError for UpstreamAttemptError {
    fn is_retryable(&self, retryable_status_codes: &[u16]) -> bool {
        match self {
            UpstreamAttemptError::Timeout => true,
            UpstreamAttemptError::Network(_) => true,
            UpstreamAttemptError::Status { status, .. } => retryable_status_codes.contains(status),
        }
    }
}

pub struct ProxyOrchestrator {
    matcher: RouteMatcher,
    circuit_breaker: CircuitBreaker,
    health_checker: Arc<HealthChecker>,
    metrics: Arc<MetricsRegistry>,
    http: reqwest::Client,
}

impl ProxyOrchestrator {
    pub fn new(
        matcher: RouteMatcher,
        circuit_breaker: CircuitBreaker,
        health_checker: Arc<HealthChecker>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            matcher,
            circuit_breaker,
            health_checker,
            metrics,
            http: reqwest::Client::builder()
                .pool_idle_timeout(Duration::from_secs(30))
                .pool_max_idle_per_host(32)
                .build()
                .expect("failed to build upstream http client"),
        }
    }

    pub fn match_route(&self, routes: &[Route], method: &str, path: &str) -> Result<Option<RouteMatch>, MatchError> {
        self.matcher.match_route(routes, method, path)
    }

    /// Runs the full health/breaker/retry/transform pipeline against an
    /// already-matched route and returns the response to send the client.
    /// `tenant_id` is used for
    /// breaker/health keys and metrics labels.
    pub async fn forward(
        &self,
        tenant_id: &str,
        route_match: &RouteMatch,
        inbound: InboundRequest<'_>,
        now_ms: i64,
    ) -> HttpResponse {
        let route = &route_match.route;
        let upstream = &route_match.upstream;
        let resilience = route.resilience.as_ref();

        if let Some(health_cfg) = resilience.and_then(|r| r.health_check.as_ref()) {
            if health_cfg.enabled {
                let status = self.health_checker.status(tenant_id, &route.id, &upstream.url).await;
                self.metrics
                    .set_health_check_status(tenant_id, &route.id, &upstream.url, status.healthy);
                if !status.healthy {
                    return self.deny_with_fallback(resilience, 503);
                }
            }
        }

        let breaker_cfg = resilience.and_then(|r| r.circuit_breaker.as_ref());
        if let Some(cb_cfg) = breaker_cfg {
            if cb_cfg.enabled {
                let allowed = self
                    .circuit_breaker
                    .can_execute(tenant_id, &route.id, &upstream.url, cb_cfg, now_ms)
                    .await;
                if !allowed {
                    self.report_breaker_gauge(tenant_id, route, upstream, now_ms).await;
                    return self.deny_with_fallback(resilience, 503);
                }
            }
        }

        let target_base = build_target_url(upstream, route, inbound.path, inbound.query);
        let request_headers = self.build_request_headers(&inbound, tenant_id, route);
        let timeout_ms = resolve_timeout_ms(resilience, upstream, inbound.method);
        let retry_config = resilience
            .and_then(|r| r.retry.as_ref())
            .cloned()
            .unwrap_or_default();
        let send_body = !matches!(inbound.method, "GET" | "HEAD");
        let body = inbound.body.clone();
        let method = inbound.method.to_string();
        let upstream_url = upstream.url.clone();

        let this = self;
        let start = Instant::now();
        let outcome = with_retry(
            &retry_config,
            |_attempt| {
                let method = method.clone();
                let target = target_base.clone();
                let headers = request_headers.clone();
                let body = if send_body { Some(body.clone()) } else { None };
                let upstream_url = upstream_url.clone();
                let retryable_status_codes = retry_config.retryable_status_codes.clone();
                async move {
                    this.execute_once(
                        &method,
                        &target,
                        headers,
                        body,
                        timeout_ms,
                        &upstream_url,
                        tenant_id,
                        &retryable_status_codes,
                    )
                    .await
                }
            },
            |attempt_index, _delay| {
                this.metrics.record_retry_attempt(tenant_id, &route.id, attempt_index + 1);
            },
        )
        .await;
        let total_duration = start.elapsed().as_secs_f64();

        let (status_code, response) = match outcome {
            Ok(success) => {
                if success.status < 500 {
                    self.record_breaker_success(tenant_id, route, upstream, breaker_cfg, now_ms).await;
                } else {
                    self.record_breaker_failure(tenant_id, route, upstream, breaker_cfg, now_ms).await;
                }
                (success.status, self.build_forward_response(route, success))
            }
            Err(UpstreamAttemptError::Status { .. }) => {
                self.record_breaker_failure(tenant_id, route, upstream, breaker_cfg, now_ms).await;
                (502, self.deny_with_fallback(resilience, 502))
            }
            Err(UpstreamAttemptError::Timeout) => {
                self.record_breaker_failure(tenant_id, route, upstream, breaker_cfg, now_ms).await;
                (504, self.deny_with_fallback(resilience, 504))
            }
            Err(UpstreamAttemptError::Network(_)) => {
                self.record_breaker_failure(tenant_id, route, upstream, breaker_cfg, now_ms).await;
                (502, self.deny_with_fallback(resilience, 502))
            }
        };

        self.metrics
            .record_http_request(tenant_id, &method, &route.id, status_code, total_duration);
        response
    }

    async fn execute_once(
        &self,
        method: &str,
        target: &str,
        headers: reqwest::header::HeaderMap,
        body: Option<Bytes>,
        timeout_ms: u64,
        upstream_url: &str,
        tenant_id: &str,
        retryable_status_codes: &[u16],
    ) -> Result<UpstreamSuccess, UpstreamAttemptError> {
        let reqwest_method = reqwest::Method::from_bytes(method.as_bytes()).unwrap_or(reqwest::Method::GET);
        let mut builder = self.http.request(reqwest_method, target).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let attempt_start = Instant::now();
        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), builder.send()).await;
        let duration = attempt_start.elapsed().as_secs_f64();

        match outcome {
            Err(_) => {
                self.metrics.record_upstream_request(tenant_id, upstream_url, method, 504, duration);
                Err(UpstreamAttemptError::Timeout)
            }
            Ok(Err(e)) => {
                log::warn!("upstream request to {target} failed: {e}");
                self.metrics.record_upstream_request(tenant_id, upstream_url, method, 502, duration);
                Err(UpstreamAttemptError::Network(e.to_string()))
            }
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                let headers = response.headers().clone();
                let body = match response.bytes().await {
                    Ok(b) => b,
                    Err(e) => {
                        self.metrics.record_upstream_request(tenant_id, upstream_url, method, 502, duration);
                        return Err(UpstreamAttemptError::Network(e.to_string()));
                    }
                };
                self.metrics.record_upstream_request(tenant_id, upstream_url, method, status, duration);
                if retryable_status_codes.contains(&status) {
                    Err(UpstreamAttemptError::Status { status, headers, body })
                } else {
                    Ok(UpstreamSuccess { status, headers, body })
                }
            }
        }
    }

    fn build_request_headers(
        &self,
        inbound: &InboundRequest<'_>,
        tenant_id: &str,
        route: &Route,
    ) -> reqwest::header::HeaderMap {
        let mut headers = ActixHeaderMap::new();
        for name in FORWARDED_REQUEST_HEADER_ALLOWLIST {
            if let Some(value) = inbound.headers.get(name) {
                if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
                    headers.insert(header_name, value.clone());
                }
            }
        }
        insert_str_header(&mut headers, "x-forwarded-for", inbound.peer_addr.unwrap_or("unknown"));
        insert_str_header(&mut headers, "x-forwarded-host", inbound.host.unwrap_or(""));
        insert_str_header(&mut headers, "x-forwarded-proto", inbound.scheme);
        insert_str_header(&mut headers, "x-tenant-id", tenant_id);

        if let Some(request_transform) = route.transform.as_ref().and_then(|t| t.request.as_ref()) {
            apply_header_ops(&mut headers, &request_transform.headers);
        }

        to_reqwest_headers(&headers)
    }

    fn build_forward_response(&self, route: &Route, upstream: UpstreamSuccess) -> HttpResponse {
        let mut response_headers = to_actix_headers(&upstream.headers);
        for name in HOP_BY_HOP_RESPONSE_HEADERS {
            response_headers.remove(name);
        }
        if let Some(response_transform) = route.transform.as_ref().and_then(|t| t.response.as_ref()) {
            apply_header_ops(&mut response_headers, &response_transform.headers);
        }

        let status = actix_web::http::StatusCode::from_u16(upstream.status)
            .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY);
        let mut builder = HttpResponse::build(status);
        for (name, value) in response_headers.iter() {
            builder.insert_header((name.clone(), value.clone()));
        }
        builder.body(upstream.body)
    }

    fn deny_with_fallback(&self, resilience: Option<&ResilienceConfig>, default_status: u16) -> HttpResponse {
        if let Some(fallback_cfg) = resilience.and_then(|r| r.fallback.as_ref()) {
            if fallback_cfg.enabled {
                return fallback_response(fallback_cfg);
            }
        }
        let status = actix_web::http::StatusCode::from_u16(default_status)
            .unwrap_or(actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
        HttpResponse::build(status).finish()
    }

    async fn record_breaker_success(
        &self,
        tenant_id: &str,
        route: &Route,
        upstream: &UpstreamConfig,
        breaker_cfg: Option<&CircuitBreakerConfig>,
        now_ms: i64,
    ) {
        if let Some(cfg) = breaker_cfg.filter(|c| c.enabled) {
            self.circuit_breaker
                .record_success(tenant_id, &route.id, &upstream.url, cfg, now_ms)
                .await;
            self.report_breaker_gauge(tenant_id, route, upstream, now_ms).await;
        }
    }

    async fn record_breaker_failure(
        &self,
        tenant_id: &str,
        route: &Route,
        upstream: &UpstreamConfig,
        breaker_cfg: Option<&CircuitBreakerConfig>,
        now_ms: i64,
    ) {
        if let Some(cfg) = breaker_cfg.filter(|c| c.enabled) {
            self.circuit_breaker
                .record_failure(tenant_id, &route.id, &upstream.url, cfg, now_ms)
                .await;
            self.report_breaker_gauge(tenant_id, route, upstream, now_ms).await;
        }
    }

    async fn report_breaker_gauge(&self, tenant_id: &str, route: &Route, upstream: &UpstreamConfig, now_ms: i64) {
        let state = self
            .circuit_breaker
            .current_state(tenant_id, &route.id, &upstream.url, now_ms)
            .await;
        self.metrics
            .set_circuit_breaker_state(tenant_id, &route.id, &upstream.url, state.as_gauge_value());
    }
}

fn insert_str_header(headers: &mut ActixHeaderMap, name: &str, value: &str) {
    if let (Ok(header_name), Ok(header_value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
        headers.insert(header_name, header_value);
    }
}

fn to_reqwest_headers(headers: &ActixHeaderMap) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if let (Ok(header_name), Ok(header_value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(header_name, header_value);
        }
    }
    out
}

fn to_actix_headers(headers: &reqwest::header::HeaderMap) -> ActixHeaderMap {
    let mut out = ActixHeaderMap::new();
    for (name, value) in headers.iter() {
        if let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(header_name, header_value);
        }
    }
    out
}

/// Resolution order: `timeout.byMethod[method]`, then `timeout.default`,
/// then the selected upstream's own `timeout`, then 30s.
fn resolve_timeout_ms(resilience: Option<&ResilienceConfig>, upstream: &UpstreamConfig, method: &str) -> u64 {
    if let Some(timeout_cfg) = resilience.and_then(|r| r.timeout.as_ref()) {
        if let Some(by_method) = timeout_cfg.by_method.get(method) {
            return *by_method;
        }
        if let Some(default) = timeout_cfg.default {
            return default;
        }
    }
    upstream.timeout.unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_MS)
}

/// The path+query appended to the selected upstream's base URL. When the
/// route carries a `pathRewrite`, it takes over entirely and is applied to
/// the full inbound path. Otherwise, a `prefix` route forwards the path
/// remainder after its matched prefix; `exact`/`regex` routes forward
/// nothing beyond the upstream's own URL.
fn build_target_url(upstream: &UpstreamConfig, route: &Route, inbound_path: &str, query: Option<&str>) -> String {
    let suffix = forwarded_path_suffix(route, inbound_path);
    let base = upstream.url.trim_end_matches('/');
    let mut url = format!("{base}{suffix}");
    if let Some(q) = query {
        if !q.is_empty() {
            url.push('?');
            url.push_str(q);
        }
    }
    url
}

fn forwarded_path_suffix(route: &Route, inbound_path: &str) -> String {
    if let Some(rewrite) = route
        .transform
        .as_ref()
        .and_then(|t| t.request.as_ref())
        .and_then(|r| r.path_rewrite.as_ref())
    {
        return apply_path_rewrite(inbound_path, rewrite);
    }

    match route.path_type {
        crate::models::PathType::Prefix => {
            if inbound_path.len() > route.path.len() {
                inbound_path[route.path.len()..].to_string()
            } else {
                String::new()
            }
        }
        _ => String::new(),
    }
}

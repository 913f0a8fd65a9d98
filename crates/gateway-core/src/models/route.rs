use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a route's `path` is matched against an inbound request path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    Exact,
    Prefix,
    Regex,
}

/// Upstream-selection strategy for a route with more than one upstream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancingStrategy {
    #[default]
    RoundRobin,
    Weighted,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    pub timeout: Option<u64>,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransformConfig {
    pub request: Option<RequestTransform>,
    pub response: Option<ResponseTransform>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RequestTransform {
    #[serde(default)]
    pub headers: HeaderOps,
    pub path_rewrite: Option<PathRewrite>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponseTransform {
    #[serde(default)]
    pub headers: HeaderOps,
}

/// Three ordered operations, always applied `remove` then `set` then `add`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeaderOps {
    #[serde(default)]
    pub remove: Vec<String>,
    #[serde(default)]
    pub set: HashMap<String, String>,
    #[serde(default)]
    pub add: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRewrite {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResilienceConfig {
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub retry: Option<RetryConfig>,
    pub timeout: Option<TimeoutConfig>,
    pub health_check: Option<HealthCheckConfig>,
    pub fallback: Option<FallbackConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_breaker_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_success_threshold() -> u32 {
    2
}
fn default_breaker_timeout_ms() -> u64 {
    30_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            timeout_ms: default_breaker_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: Vec<u16>,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_retryable_status_codes() -> Vec<u16> {
    vec![500, 502, 503, 504]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retryable_status_codes: default_retryable_status_codes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimeoutConfig {
    pub default: Option<u64>,
    #[serde(default)]
    pub by_method: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

fn default_interval_ms() -> u64 {
    5000
}
fn default_health_timeout_ms() -> u64 {
    2000
}
fn default_healthy_threshold() -> u32 {
    2
}
fn default_unhealthy_threshold() -> u32 {
    3
}

impl HealthCheckConfig {
    /// Intervals below 5s are clamped, per the health-checker contract.
    pub fn clamped_interval_ms(&self) -> u64 {
        self.interval_ms.max(default_interval_ms())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackContentType {
    #[serde(rename = "application/json")]
    Json,
    #[serde(rename = "text/plain")]
    Text,
    #[serde(rename = "text/html")]
    Html,
}

impl FallbackContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackContentType::Json => "application/json",
            FallbackContentType::Text => "text/plain",
            FallbackContentType::Html => "text/html",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub enabled: bool,
    pub status_code: u16,
    pub content_type: FallbackContentType,
    pub body: String,
}

/// A tenant-owned declarative route: `(method, path, pathType, upstreams, strategy, transform, resilience)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub tenant_id: String,
    /// HTTP verb, or `"*"` to match any method.
    pub method: String,
    pub path: String,
    pub path_type: PathType,
    pub upstreams: Vec<UpstreamConfig>,
    #[serde(default)]
    pub load_balancing: LoadBalancingStrategy,
    pub transform: Option<TransformConfig>,
    pub resilience: Option<ResilienceConfig>,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteValidationError {
    #[error("route path must not exceed 1024 characters")]
    PathTooLong,
    #[error("route must declare at least one upstream")]
    NoUpstreams,
    #[error("route path is not a valid regular expression: {0}")]
    InvalidRegex(String),
    #[error("upstream weight must be at least 1")]
    InvalidWeight,
}

impl Route {
    /// Validates admission-time invariants: non-empty upstreams, path length,
    /// and (for `pathType=regex`) that the path compiles.
    pub fn validate(&self) -> Result<(), RouteValidationError> {
        if self.path.len() > 1024 {
            return Err(RouteValidationError::PathTooLong);
        }
        if self.upstreams.is_empty() {
            return Err(RouteValidationError::NoUpstreams);
        }
        if self.upstreams.iter().any(|u| u.weight < 1) {
            return Err(RouteValidationError::InvalidWeight);
        }
        if self.path_type == PathType::Regex {
            regex::Regex::new(&format!("^{}$", self.path))
                .map_err(|e| RouteValidationError::InvalidRegex(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_route(path_type: PathType, path: &str) -> Route {
        Route {
            id: "r1".into(),
            tenant_id: "t1".into(),
            method: "GET".into(),
            path: path.into(),
            path_type,
            upstreams: vec![UpstreamConfig {
                url: "http://svc".into(),
                weight: 1,
                timeout: None,
            }],
            load_balancing: LoadBalancingStrategy::RoundRobin,
            transform: None,
            resilience: None,
            is_active: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn rejects_empty_upstreams() {
        let mut route = sample_route(PathType::Exact, "/x");
        route.upstreams.clear();
        assert!(matches!(
            route.validate(),
            Err(RouteValidationError::NoUpstreams)
        ));
    }

    #[test]
    fn rejects_invalid_regex() {
        let route = sample_route(PathType::Regex, "(unterminated");
        assert!(matches!(
            route.validate(),
            Err(RouteValidationError::InvalidRegex(_))
        ));
    }

    #[test]
    fn accepts_valid_regex() {
        let route = sample_route(PathType::Regex, "/users/[0-9]+");
        assert!(route.validate().is_ok());
    }
}

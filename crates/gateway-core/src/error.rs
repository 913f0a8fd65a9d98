use actix_web::{http::StatusCode, HttpResponse};
use serde_json::json;

/// The gateway's error hierarchy, one variant per classified failure in the
/// request pipeline. Every variant carries enough context to render the
/// `{error, message}` body without a second lookup.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing or invalid api key")]
    Unauthorized,

    #[error("tenant is not active")]
    Forbidden,

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("no route matches {method} {path}")]
    NoRoute { method: String, path: String },

    #[error("upstream service is unhealthy")]
    UpstreamUnhealthy,

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("upstream is unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    fn kind(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "client_auth",
            GatewayError::Forbidden => "client_auth",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::NoRoute { .. } => "no_route",
            GatewayError::UpstreamUnhealthy => "upstream_unhealthy",
            GatewayError::CircuitOpen => "circuit_open",
            GatewayError::UpstreamTimeout => "upstream_timeout",
            GatewayError::UpstreamUnreachable(_) => "upstream_unreachable",
            GatewayError::Internal(_) => "internal",
        }
    }
}

impl actix_web::error::ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NoRoute { .. } => StatusCode::NOT_FOUND,
            GatewayError::UpstreamUnhealthy => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });

        let mut builder = HttpResponse::build(self.status_code());

        if let GatewayError::RateLimited { retry_after_secs } = self {
            builder.insert_header(("Retry-After", retry_after_secs.to_string()));
            body["retryAfter"] = json!(retry_after_secs);
        }

        builder.json(body)
    }
}

//! Static fallback responses.

use crate::models::FallbackConfig;
use actix_web::HttpResponse;

pub fn should_use_fallback(config: Option<&FallbackConfig>) -> bool {
    config.map(|c| c.enabled).unwrap_or(false)
}

/// Builds the static response verbatim; no templating is applied to `body`.
pub fn fallback_response(config: &FallbackConfig) -> HttpResponse {
    HttpResponse::build(
        actix_web::http::StatusCode::from_u16(config.status_code)
            .unwrap_or(actix_web::http::StatusCode::SERVICE_UNAVAILABLE),
    )
    .content_type(config.content_type.as_str())
    .body(config.body.clone())
}

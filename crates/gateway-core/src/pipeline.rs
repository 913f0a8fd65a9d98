//! The pipeline host: the single `actix-web` handler wired
//! behind the catch-all proxy resource, composing tenant authentication,
//! rate limiting, and the proxy orchestrator in that order.

use crate::auth::{AuthOutcome, TenantAuthenticator};
use crate::cache::CacheClient;
use crate::error::GatewayError;
use crate::metrics::MetricsRegistry;
use crate::models::TenantRateLimit;
use crate::proxy::{InboundRequest, ProxyOrchestrator};
use crate::ratelimit::RateLimiter;
use crate::store::RouteTenantStore;
use actix_web::http::header::HeaderValue;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;

/// The collaborators a single proxied request needs. Constructed once at
/// startup and shared across workers behind `web::Data`.
pub struct GatewayContext {
    pub store: Arc<dyn RouteTenantStore>,
    pub authenticator: TenantAuthenticator,
    pub rate_limiter: RateLimiter,
    pub proxy: ProxyOrchestrator,
    pub metrics: Arc<MetricsRegistry>,
}

impl GatewayContext {
    pub fn new(
        cache: Arc<dyn CacheClient>,
        store: Arc<dyn RouteTenantStore>,
        authenticator: TenantAuthenticator,
        proxy: ProxyOrchestrator,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            store,
            authenticator,
            rate_limiter: RateLimiter::new(cache),
            proxy,
            metrics,
        }
    }
}

const DEFAULT_RATE_LIMIT: TenantRateLimit = TenantRateLimit {
    requests_per_second: 100,
    burst_size: None,
};

/// Registered as the catch-all resource for every method and path not
/// already claimed by `/health`, `/ready`, `/live`, or `/metrics`.
pub async fn handle_proxy_request(
    ctx: web::Data<GatewayContext>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, GatewayError> {
    let now_ms = Utc::now().timestamp_millis();

    let api_key = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(GatewayError::Unauthorized)?;

    let tenant = match ctx
        .authenticator
        .validate_api_key(api_key)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?
    {
        AuthOutcome::Active(tenant) => tenant,
        AuthOutcome::CachedInactive => return Err(GatewayError::Forbidden),
        AuthOutcome::Denied => return Err(GatewayError::Unauthorized),
    };

    let rate_limit_cfg = tenant.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT);
    let decision = ctx
        .rate_limiter
        .check(&format!("tenant:{}", tenant.id), &rate_limit_cfg, now_ms)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    ctx.metrics.set_rate_limit_remaining(&tenant.id, decision.remaining);
    if !decision.allowed {
        ctx.metrics.record_rate_limit_hit(&tenant.id);
        let remaining_ms = (decision.reset_at_ms - now_ms).max(0) as u64;
        let retry_after_secs = ((remaining_ms + 999) / 1000).max(1);
        return Err(GatewayError::RateLimited { retry_after_secs });
    }

    let routes = ctx
        .store
        .find_active_routes_by_tenant_id(&tenant.id)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    let method = req.method().as_str().to_string();
    let path = req.path().to_string();

    let route_match = ctx
        .proxy
        .match_route(&routes, &method, &path)
        .map_err(|e| GatewayError::Internal(e.to_string()))?
        .ok_or_else(|| GatewayError::NoRoute {
            method: method.clone(),
            path: path.clone(),
        })?;

    let peer_addr = req.peer_addr().map(|a| a.ip().to_string());
    let host = req
        .headers()
        .get("host")
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .map(|s| s.to_string());
    let scheme = req.connection_info().scheme().to_string();
    let query = req.query_string();

    let inbound = InboundRequest {
        method: &method,
        path: &path,
        query: if query.is_empty() { None } else { Some(query) },
        headers: req.headers(),
        peer_addr: peer_addr.as_deref(),
        host: host.as_deref(),
        scheme: &scheme,
        body,
    };

    let mut decision_headers = vec![
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_at_ms.to_string()),
    ];

    let mut response = ctx.proxy.forward(&tenant.id, &route_match, inbound, now_ms).await;
    for (name, value) in decision_headers.drain(..) {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            response
                .headers_mut()
                .insert(actix_web::http::header::HeaderName::from_static(name), header_value);
        }
    }
    Ok(response)
}

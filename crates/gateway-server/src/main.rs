//! Gateway server entry point: loads configuration, wires the shared cache,
//! route/tenant store, and resilience collaborators, and starts the
//! `actix-web` server behind the tenant-authentication/rate-limit pipeline.

use gateway_core::cache::memory_cache::InMemoryCache;
use gateway_core::cache::redis_cache::RedisCache;
use gateway_core::cache::CacheClient;
use gateway_core::config::Settings;
use gateway_core::logging::configure_logger;
use gateway_core::metrics::MetricsRegistry;
use gateway_core::pipeline::{handle_proxy_request, GatewayContext};
use gateway_core::proxy::ProxyOrchestrator;
use gateway_core::resilience::circuit_breaker::CircuitBreaker;
use gateway_core::resilience::health::HealthChecker;
use gateway_core::routes::{configure_health, configure_metrics};
use gateway_core::routing::load_balancer::LoadBalancer;
use gateway_core::routing::matcher::RouteMatcher;
use gateway_core::store::{InMemoryStore, RouteTenantStore};
use gateway_core::auth::TenantAuthenticator;

use actix_web::dev::Service;
use actix_web::{web, App, HttpServer};
use log::{error, info, warn};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = Settings::from_env().unwrap_or_else(|e| {
        eprintln!("failed to load configuration: {e}");
        std::process::exit(1);
    });
    configure_logger(settings.log_level);

    info!("starting gateway on port {} ({:?})", settings.port, settings.environment);

    let cache: Arc<dyn CacheClient> = match RedisCache::connect(&settings.redis_url).await {
        Ok(redis) => Arc::new(redis),
        Err(e) => {
            warn!("could not connect to redis at startup ({e}); falling back to an in-process cache, which does not share state across gateway instances");
            Arc::new(InMemoryCache::new())
        }
    };

    // The route/tenant store is populated by an external administrative
    // control plane; this core only reads it. Nothing is seeded here.
    let store: Arc<dyn RouteTenantStore> = Arc::new(InMemoryStore::default());

    let authenticator = TenantAuthenticator::new(cache.clone(), store.clone());
    let health_checker = Arc::new(HealthChecker::new(cache.clone()));
    let metrics = Arc::new(MetricsRegistry::new());
    let circuit_breaker = CircuitBreaker::new(cache.clone(), metrics.clone());
    let matcher = RouteMatcher::new(LoadBalancer::new());
    let proxy = ProxyOrchestrator::new(matcher, circuit_breaker, health_checker.clone(), metrics.clone());

    register_health_probers(&store, &health_checker).await;

    let ctx = web::Data::new(GatewayContext::new(cache, store, authenticator, proxy, metrics.clone()));
    let metrics_data = web::Data::new(metrics);

    let port = settings.port;
    let server = HttpServer::new(move || {
        let connection_metrics = metrics_data.as_ref().clone();
        App::new()
            .app_data(ctx.clone())
            .app_data(metrics_data.clone())
            .wrap_fn(move |req, srv| {
                connection_metrics.inc_active_connections();
                let connection_metrics = connection_metrics.clone();
                let fut = srv.call(req);
                async move {
                    let res = fut.await;
                    connection_metrics.dec_active_connections();
                    res
                }
            })
            .configure(configure_health)
            .configure(configure_metrics)
            .default_service(web::route().to(handle_proxy_request))
    })
    .bind(("0.0.0.0", port))?
    .run();

    let server_handle = server.handle();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install shutdown signal handler: {e}");
            return;
        }
        info!("shutdown signal received, stopping gracefully");
        health_checker.shutdown();
        server_handle.stop(true).await;
    });

    server.await
}

/// Registers a background prober for every active route's upstreams that
/// have health checking enabled. Run once at startup; routes added later by
/// the administrative control plane are outside this core's lifecycle.
async fn register_health_probers(store: &Arc<dyn RouteTenantStore>, health_checker: &Arc<HealthChecker>) {
    let tenants = match store.find_active_tenants().await {
        Ok(tenants) => tenants,
        Err(e) => {
            warn!("could not list tenants to register health probers: {e}");
            return;
        }
    };

    for tenant in tenants {
        let routes = match store.find_active_routes_by_tenant_id(&tenant.id).await {
            Ok(routes) => routes,
            Err(e) => {
                warn!("could not list routes for tenant {}: {e}", tenant.id);
                continue;
            }
        };
        for route in routes {
            let Some(health_cfg) = route.resilience.as_ref().and_then(|r| r.health_check.as_ref()) else {
                continue;
            };
            if !health_cfg.enabled {
                continue;
            }
            for upstream in &route.upstreams {
                health_checker.register(
                    tenant.id.clone(),
                    route.id.clone(),
                    upstream.url.clone(),
                    health_cfg.clone(),
                );
            }
        }
    }
}

//! `/metrics` handler: renders [`crate::metrics::MetricsRegistry`] as
//! Prometheus exposition text. No authentication required.

use crate::metrics::MetricsRegistry;
use actix_web::{web, HttpResponse};
use std::sync::Arc;

async fn metrics_handler(registry: web::Data<Arc<MetricsRegistry>>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(registry.render())
}

pub fn configure_metrics(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_handler));
}

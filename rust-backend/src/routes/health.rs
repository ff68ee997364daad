use actix_web::{get, web, HttpResponse, Scope};
use metrics_exporter_prometheus::PrometheusHandle;

#[get("/health")]
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Prometheus text exposition of every recorded counter / histogram.
#[get("/metrics")]
async fn metrics(handle: web::Data<PrometheusHandle>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(handle.render())
}

pub fn health_scope() -> Scope {
    web::scope("")
        .service(health_check)
        .service(metrics)
}

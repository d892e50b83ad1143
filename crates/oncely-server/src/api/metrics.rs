use actix_web::{HttpResponse, Scope, get, web};

use crate::model::common::AppState;

/// Prometheus text exposition
#[get("")]
async fn metrics(data: web::Data<AppState>) -> HttpResponse {
    match &data.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}

pub fn routes() -> Scope {
    web::scope("/metrics").service(metrics)
}

//! HTTP API of the reference server.

use actix_web::web;
use oncely_server_common::IdempotencyGuard;

pub mod health;
pub mod metrics;
pub mod order;

/// Register every route; only order creation sits behind `guard`
pub fn configure(cfg: &mut web::ServiceConfig, guard: IdempotencyGuard) {
    cfg.service(health::routes())
        .service(metrics::routes())
        .service(order::routes().wrap(guard));
}

//! HTTP server setup.

use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, http::header::HeaderName, middleware::Logger, web};
use oncely_server_common::IdempotencyGuard;

use crate::{api, model::common::AppState};

/// Creates and binds the API server.
///
/// Order creation is wrapped in the idempotency guard reading `header`;
/// health and metrics endpoints are not.
pub fn api_server(
    app_state: Arc<AppState>,
    header: HeaderName,
    address: String,
    port: u16,
) -> Result<Server, std::io::Error> {
    Ok(HttpServer::new(move || {
        let guard =
            IdempotencyGuard::new(app_state.idempotency.clone()).with_header(header.clone());

        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::from(app_state.clone()))
            .configure(|cfg| api::configure(cfg, guard))
    })
    .bind((address, port))?
    .run())
}

//! Main entry point for the Oncely reference server.

use std::sync::Arc;

use oncely_core::Idempotency;
use oncely_server::{
    model::{common::AppState, config::Configuration},
    startup,
};
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;

    let logging_config = configuration.logging_config();
    let _logging_guard = startup::init_logging(&logging_config)?;

    let metrics_handle = startup::init_metrics()?;

    let store = startup::build_store(&configuration).await?;
    let idempotency_config = configuration.idempotency_config();
    info!(
        result_ttl = ?idempotency_config.result_ttl,
        lock_ttl = ?idempotency_config.lock_ttl,
        wait_timeout = ?idempotency_config.wait_timeout,
        key_prefix = %idempotency_config.key_prefix,
        "Idempotency configured"
    );
    let idempotency = Arc::new(Idempotency::with_config(store, idempotency_config)?);

    let app_state = Arc::new(AppState::new(idempotency, Some(metrics_handle)));

    let address = configuration.server_address();
    let port = configuration.server_port();
    let header = configuration.http_header()?;

    info!("Starting Oncely server on {}:{}", address, port);

    // actix-web stops on Ctrl+C / SIGTERM and drains in-flight requests
    startup::api_server(app_state, header, address, port)?.await?;

    info!("Oncely server stopped");
    Ok(())
}

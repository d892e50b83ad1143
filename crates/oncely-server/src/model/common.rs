use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use oncely_core::{Idempotency, Store};

use super::order::OrderBook;

/// Shared state handed to every HTTP worker
pub struct AppState {
    pub idempotency: Arc<Idempotency>,
    pub orders: OrderBook,
    /// `None` when no Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(idempotency: Arc<Idempotency>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            idempotency,
            orders: OrderBook::new(),
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.idempotency.store()
    }
}

// Oncely reference server
//
// Serves an order API whose creation endpoint is idempotent: retries carrying
// the same Idempotency-Key header replay the first response.
//
// Provides:
// - api: HTTP handlers (orders, health, metrics)
// - model: configuration, application state, order domain
// - startup: logging, metrics, store selection, HTTP server

pub mod api;
pub mod model;
pub mod startup;

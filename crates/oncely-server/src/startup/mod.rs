//! Application startup utilities module.
//!
//! Logging, metrics, store selection and the HTTP server used by the binary.

mod http;
pub mod logging;
mod metrics;
mod store;

pub use http::api_server;
pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use metrics::init_metrics;
pub use store::{build_store, start_purge_task};

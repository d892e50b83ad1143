//! Oncely Core - Idempotent execution orchestrator
//!
//! This crate provides:
//! - `Idempotency`: `execute` / `consume` over any `Store`
//! - The wait-or-lock protocol with capped exponential polling
//! - A lock renewal watchdog for refreshable stores
//! - `ExecContext` carrying deadline and cancellation
//! - Protocol metrics

pub mod config;
pub mod context;
pub mod idempotency;
pub mod metrics;

mod owner;
mod wait;
mod watchdog;

pub use config::{IdempotencyConfig, MIN_RENEWAL_INTERVAL};
pub use context::ExecContext;
pub use idempotency::Idempotency;
pub use metrics::init_metrics;

// Re-export the shared vocabulary so adapters need a single import
pub use oncely_common::{
    CONSUMED_MARKER, IdempotencyError, LockToken, StoreError, StoreKind, WaitExpiry,
};
pub use oncely_persistence::{DistributedStore, MemoryStore, RefreshableStore, Store};

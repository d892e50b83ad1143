//! Oncely Persistence - Store abstraction and backends
//!
//! This crate provides:
//! - The `Store` trait and the optional `RefreshableStore` capability
//! - `MemoryStore`: single-process backend (mutex + maps, lazy TTL eviction)
//! - `DistributedStore`: shared SQL backend (MySQL/PostgreSQL/SQLite via SeaORM)
//! - SeaORM entity definitions for the lock and result tables

pub mod entity;
pub mod memory;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

// Re-export store traits
pub use traits::{RefreshableStore, Store};

// Re-export backends
pub use memory::{MemoryStore, MemoryStoreStats};
pub use sql::DistributedStore;

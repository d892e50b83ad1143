//! Oncely Common - Shared types, errors, and utilities
//!
//! This crate provides the foundational types used across all Oncely components:
//! - Error types and error codes
//! - Lock token generation
//! - Utility functions
//! - Common constants

pub mod error;
pub mod token;
pub mod utils;

// Re-exports for convenience
pub use error::{ErrorCode, IdempotencyError, StoreError, WaitExpiry};
pub use token::LockToken;
pub use utils::{current_timestamp, normalize_key};

/// Default namespace prefix applied to every idempotency key
pub const DEFAULT_KEY_PREFIX: &str = "idem:";

/// Default HTTP header carrying the idempotency key
pub const DEFAULT_HTTP_HEADER: &str = "Idempotency-Key";

/// Default RPC metadata header carrying the idempotency key
pub const DEFAULT_RPC_METADATA_KEY: &str = "idempotency-key";

/// Value stored by `consume` once a message has been processed
pub const CONSUMED_MARKER: &[u8] = b"consumed";

/// Store backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Memory,
    Database,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
            StoreKind::Database => "database",
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "database" | "db" => Ok(StoreKind::Database),
            _ => Err(format!("Invalid store kind: {}", s)),
        }
    }
}

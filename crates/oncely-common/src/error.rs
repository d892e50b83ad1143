//! Error types and error codes for Oncely
//!
//! This module defines:
//! - `IdempotencyError`: failures of the idempotent execution protocol itself
//! - `StoreError`: failures reported by a `Store` backend
//! - `ErrorCode`: Structured error codes for adapter responses

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Why a wait-or-lock round gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitExpiry {
    /// The effective deadline passed
    Deadline,
    /// The ambient context was cancelled
    Cancelled,
}

impl Display for WaitExpiry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitExpiry::Deadline => write!(f, "deadline exceeded"),
            WaitExpiry::Cancelled => write!(f, "context cancelled"),
        }
    }
}

/// Errors reported by a store backend
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The presented token no longer owns the lock
    #[error("lock for '{key}' is no longer held by this owner")]
    LockLost { key: String },

    /// Indeterminate infrastructure failure
    #[error("store backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        StoreError::Backend(err.into())
    }

    pub fn is_lock_lost(&self) -> bool {
        matches!(self, StoreError::LockLost { .. })
    }
}

/// Errors produced by the idempotent execution protocol
///
/// Business errors returned by the wrapped operation never appear here; they
/// travel back to the caller in the caller's own error type.
#[derive(thiserror::Error, Debug)]
pub enum IdempotencyError {
    #[error("invalid idempotency key: {0}")]
    InvalidKey(String),

    #[error("no result for idempotency key '{key}' within the wait window ({reason})")]
    ConcurrencyTimeout { key: String, reason: WaitExpiry },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cached result for '{key}' could not be decoded: {source}")]
    Deserialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("result for '{key}' could not be encoded: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl IdempotencyError {
    /// Whether the caller may retry the same key later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IdempotencyError::ConcurrencyTimeout { .. }
                | IdempotencyError::Store(StoreError::Backend(_))
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, IdempotencyError::ConcurrencyTimeout { .. })
    }

    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            IdempotencyError::InvalidKey(_) => INVALID_IDEMPOTENCY_KEY,
            IdempotencyError::ConcurrencyTimeout { .. } => REQUEST_IN_PROGRESS,
            IdempotencyError::Store(_) => STORE_UNAVAILABLE,
            IdempotencyError::Deserialization { .. } | IdempotencyError::Serialization { .. } => {
                RESULT_CODEC_ERROR
            }
            IdempotencyError::ConfigError(_) => SERVER_ERROR,
        }
    }
}

/// Error code structure for adapter responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10000,
    message: "parameter validate error",
};

pub const INVALID_IDEMPOTENCY_KEY: ErrorCode<'static> = ErrorCode {
    code: 30001,
    message: "invalid idempotency key",
};

pub const REQUEST_IN_PROGRESS: ErrorCode<'static> = ErrorCode {
    code: 30002,
    message: "a request with the same idempotency key is still in progress",
};

pub const STORE_UNAVAILABLE: ErrorCode<'static> = ErrorCode {
    code: 30003,
    message: "idempotency store unavailable",
};

pub const RESULT_CODEC_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30004,
    message: "idempotent result could not be encoded or decoded",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "server error",
};

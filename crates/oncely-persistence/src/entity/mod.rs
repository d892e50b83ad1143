//! SeaORM entity definitions for the idempotency tables

pub mod idempotency_lock;
pub mod idempotency_result;

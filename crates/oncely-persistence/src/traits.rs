//! Store traits for idempotent execution
//!
//! A `Store` persists two kinds of entries per key: a short-lived lock proving
//! that one owner is executing the operation, and the memoized result. Every
//! mutation of a lock entry is guarded by the `LockToken` handed out by `lock`,
//! so an owner whose lock expired and was taken over can never release or
//! overwrite the new owner's state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oncely_common::{LockToken, StoreError};

/// Persistence boundary used by the orchestrator
///
/// A zero `ttl` means the entry never expires.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create the lock entry if none exists or the existing one expired.
    ///
    /// Returns `Ok(None)` when another valid owner holds the lock.
    async fn lock(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, StoreError>;

    /// Delete the lock entry if `token` still owns it; a mismatch is a no-op.
    async fn unlock(&self, key: &str, token: &LockToken) -> Result<(), StoreError>;

    /// Publish the result and release the matching lock as one atomic step.
    ///
    /// Ownership is decided by the token alone: a lock that expired without
    /// being taken over still belongs to its owner.
    /// With a stale token nothing is written and `StoreError::LockLost` is
    /// returned. An unexpired result is never overwritten.
    async fn set_result(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        token: &LockToken,
    ) -> Result<(), StoreError>;

    /// Read the memoized result; `Ok(None)` when absent or expired.
    async fn get_result(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Lock renewal capability, if the backend supports it
    fn as_refreshable(self: Arc<Self>) -> Option<Arc<dyn RefreshableStore>> {
        None
    }

    /// Backend label used in logs and metrics
    fn kind(&self) -> &'static str;
}

/// Optional capability: extend the TTL of a held lock
#[async_trait]
pub trait RefreshableStore: Store {
    /// Push the lock's expiry to `now + ttl`; `StoreError::LockLost` when
    /// `token` no longer owns it.
    async fn refresh(&self, key: &str, token: &LockToken, ttl: Duration)
    -> Result<(), StoreError>;
}

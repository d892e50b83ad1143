//! Ownership of one idempotency key for the duration of an execution

use std::sync::Arc;
use std::time::Duration;

use oncely_common::{LockToken, StoreError};
use oncely_persistence::Store;

use crate::watchdog::Watchdog;

/// Guard over a held lock
///
/// Exactly one of `commit` or `release` should end the guard. If the owning
/// future is dropped first (caller cancelled, task aborted, panic), the lock
/// is released from a detached task so waiters don't block until TTL expiry.
pub(crate) struct OwnerGuard {
    store: Arc<dyn Store>,
    key: String,
    token: LockToken,
    watchdog: Option<Watchdog>,
    released: bool,
}

impl OwnerGuard {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        key: String,
        token: LockToken,
        lock_ttl: Duration,
        renewal_interval: Option<Duration>,
    ) -> Self {
        let watchdog = renewal_interval.and_then(|period| {
            let refreshable = store.clone().as_refreshable()?;
            Some(Watchdog::start(
                refreshable,
                key.clone(),
                token.clone(),
                lock_ttl,
                period,
            ))
        });

        Self {
            store,
            key,
            token,
            watchdog,
            released: false,
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    async fn stop_watchdog(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.stop().await;
        }
    }

    /// Publish the result, releasing the lock in the same store operation
    ///
    /// On `LockLost` the lock is no longer ours, so there is nothing left to
    /// release. Any other error leaves the lock for the caller to release.
    pub(crate) async fn commit(&mut self, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        self.stop_watchdog().await;
        let result = self
            .store
            .set_result(&self.key, value, ttl, &self.token)
            .await;
        if matches!(result, Ok(()) | Err(StoreError::LockLost { .. })) {
            self.released = true;
        }
        result
    }

    /// Drop the lock without publishing anything
    pub(crate) async fn release(mut self) {
        self.stop_watchdog().await;
        self.released = true;
        if let Err(e) = self.store.unlock(&self.key, &self.token).await {
            tracing::warn!(key = %self.key, error = %e, "Failed to release idempotency lock");
        }
    }
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // The watchdog's own Drop stops renewal
        self.watchdog.take();

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                key = %self.key,
                "No runtime to release abandoned idempotency lock, it expires with its TTL"
            );
            return;
        };

        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = self.token.clone();
        tracing::debug!(key = %key, "Releasing idempotency lock of abandoned execution");
        handle.spawn(async move {
            if let Err(e) = store.unlock(&key, &token).await {
                tracing::warn!(key = %key, error = %e, "Failed to release idempotency lock");
            }
        });
    }
}

//! Lock renewal watchdog
//!
//! While an owner runs its operation, a background task keeps pushing the
//! lock's expiry forward. A failed renewal is logged and counted but never
//! interrupts the operation; losing the lock surfaces when the result is
//! published.

use std::sync::Arc;
use std::time::Duration;

use oncely_common::{LockToken, StoreError};
use oncely_persistence::RefreshableStore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::metrics;

/// Renewal task scoped to one owned critical section
///
/// Dropping the handle cancels the task, so every exit path stops renewing.
pub(crate) struct Watchdog {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub(crate) fn start(
        store: Arc<dyn RefreshableStore>,
        key: String,
        token: LockToken,
        ttl: Duration,
        period: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        // A first renewal past the clock's range would never fire
        let Some(first_tick) = Instant::now().checked_add(period) else {
            return Self {
                cancel,
                handle: None,
            };
        };

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        match store.refresh(&key, &token, ttl).await {
                            Ok(()) => {
                                tracing::trace!(key = %key, "Idempotency lock renewed");
                            }
                            Err(StoreError::LockLost { .. }) => {
                                metrics::record_refresh_failure(store.kind());
                                tracing::warn!(
                                    key = %key,
                                    "Idempotency lock lost during renewal, stopping watchdog"
                                );
                                break;
                            }
                            Err(e) => {
                                metrics::record_refresh_failure(store.kind());
                                tracing::warn!(
                                    key = %key,
                                    error = %e,
                                    "Idempotency lock renewal failed"
                                );
                            }
                        }
                    }
                }
            }
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Cancel the task and wait for an in-flight renewal to finish
    pub(crate) async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

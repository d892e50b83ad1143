//! Wait-or-lock protocol
//!
//! A caller either observes a published result or becomes the single owner of
//! the key. While another owner holds the lock the caller polls with a capped,
//! doubling interval; every pause is interruptible by cancellation and clamped
//! to the effective deadline.

use std::time::Duration;

use oncely_common::{IdempotencyError, LockToken, WaitExpiry};
use oncely_persistence::Store;
use tokio::time::{Instant, sleep, sleep_until};

use crate::config::IdempotencyConfig;
use crate::context::ExecContext;
use crate::metrics;

/// Outcome of a successful wait-or-lock round
#[derive(Debug)]
pub(crate) enum Acquisition {
    /// A result was already published
    Hit(Vec<u8>),
    /// This caller owns the key and must run the operation
    Owner(LockToken),
}

/// Capped exponential poll interval
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub(crate) fn new(min: Duration, max: Duration) -> Self {
        Self {
            current: min.min(max),
            max,
        }
    }

    /// Interval to wait now; the following one doubles up to the ceiling
    pub(crate) fn next_interval(&mut self) -> Duration {
        let interval = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        interval
    }
}

/// The tighter of the caller's deadline and the configured wait bound
pub(crate) fn effective_deadline(
    ctx_deadline: Option<Instant>,
    wait_timeout: Duration,
    now: Instant,
) -> Option<Instant> {
    // Zero, or a bound past the clock's range, leaves waiting unbounded
    let configured = if wait_timeout.is_zero() {
        None
    } else {
        now.checked_add(wait_timeout)
    };
    match (ctx_deadline, configured) {
        (Some(ctx), Some(configured)) => Some(ctx.min(configured)),
        (ctx, configured) => ctx.or(configured),
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

pub(crate) async fn wait_or_lock(
    store: &dyn Store,
    config: &IdempotencyConfig,
    ctx: &ExecContext,
    key: &str,
) -> Result<Acquisition, IdempotencyError> {
    let deadline = effective_deadline(ctx.deadline(), config.wait_timeout, Instant::now());
    let mut backoff = Backoff::new(config.poll_interval_min, config.poll_interval_max);
    let give_up = |reason: WaitExpiry| -> Result<Acquisition, IdempotencyError> {
        metrics::record_wait_timeout(store.kind());
        tracing::debug!(key, %reason, "Gave up waiting for idempotency key");
        Err(IdempotencyError::ConcurrencyTimeout {
            key: key.to_string(),
            reason,
        })
    };

    loop {
        if ctx.is_cancelled() {
            return give_up(WaitExpiry::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return give_up(WaitExpiry::Deadline);
        }

        let published = tokio::select! {
            biased;
            _ = ctx.cancelled() => return give_up(WaitExpiry::Cancelled),
            _ = deadline_elapsed(deadline) => return give_up(WaitExpiry::Deadline),
            result = store.get_result(key) => result?,
        };
        if let Some(value) = published {
            return Ok(Acquisition::Hit(value));
        }

        if let Some(token) = store.lock(key, config.lock_ttl).await? {
            // A result published between the read above and the lock still wins
            return match store.get_result(key).await {
                Ok(None) => Ok(Acquisition::Owner(token)),
                Ok(Some(value)) => {
                    release_quietly(store, key, &token).await;
                    Ok(Acquisition::Hit(value))
                }
                Err(e) => {
                    release_quietly(store, key, &token).await;
                    Err(e.into())
                }
            };
        }

        let pause = backoff.next_interval();
        tracing::debug!(key, ?pause, "Idempotency key held by another owner, polling");

        tokio::select! {
            biased;
            _ = ctx.cancelled() => return give_up(WaitExpiry::Cancelled),
            _ = deadline_elapsed(deadline) => return give_up(WaitExpiry::Deadline),
            _ = sleep(pause) => {}
        }
    }
}

async fn release_quietly(store: &dyn Store, key: &str, token: &LockToken) {
    if let Err(e) = store.unlock(key, token).await {
        tracing::warn!(key, error = %e, "Failed to release idempotency lock");
    }
}

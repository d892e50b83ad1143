//! Idempotent execution orchestrator
//!
//! `Idempotency` guarantees that for a given key the wrapped operation runs at
//! most once while its result is retained: concurrent callers wait for the
//! owner's result, later callers replay it.
//!
//! Only successful results are memoized. A failing operation releases the key
//! so the next caller may retry, and its error reaches the caller untouched.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use oncely_common::{CONSUMED_MARKER, IdempotencyError, StoreError, normalize_key};
use oncely_persistence::Store;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::IdempotencyConfig;
use crate::context::ExecContext;
use crate::metrics;
use crate::owner::OwnerGuard;
use crate::wait::{Acquisition, wait_or_lock};

enum Claim {
    Hit(Vec<u8>),
    Owner(OwnerGuard),
}

/// Idempotent execution over a pluggable `Store`
#[derive(Clone)]
pub struct Idempotency {
    store: Arc<dyn Store>,
    config: IdempotencyConfig,
}

impl std::fmt::Debug for Idempotency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Idempotency")
            .field("store", &self.store.kind())
            .field("config", &self.config)
            .finish()
    }
}

impl Idempotency {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            config: IdempotencyConfig::default(),
        }
    }

    pub fn with_config(
        store: Arc<dyn Store>,
        config: IdempotencyConfig,
    ) -> Result<Self, IdempotencyError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run `f` at most once for `key`, memoizing its result for `result_ttl`
    pub async fn execute<T, E, F, Fut>(&self, ctx: &ExecContext, key: &str, f: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<IdempotencyError>,
        F: FnOnce(ExecContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_ttl(ctx, key, self.config.result_ttl, f)
            .await
    }

    /// Like `execute`, with an explicit result TTL (zero keeps it forever)
    pub async fn execute_with_ttl<T, E, F, Fut>(
        &self,
        ctx: &ExecContext,
        key: &str,
        ttl: Duration,
        f: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<IdempotencyError>,
        F: FnOnce(ExecContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.store_key(key)?;

        let guard = match self.acquire(ctx, &key).await? {
            Claim::Hit(bytes) => {
                metrics::record_cache_hit(self.store.kind());
                tracing::debug!(key = %key, "Replaying memoized result");
                return serde_json::from_slice(&bytes)
                    .map_err(|source| IdempotencyError::Deserialization { key, source }.into());
            }
            Claim::Owner(guard) => guard,
        };

        metrics::record_execution(self.store.kind());
        match f(ctx.clone()).await {
            Ok(value) => {
                let bytes = match serde_json::to_vec(&value) {
                    Ok(bytes) => bytes,
                    Err(source) => {
                        guard.release().await;
                        return Err(IdempotencyError::Serialization { key, source }.into());
                    }
                };
                self.commit(guard, &bytes, ttl).await?;
                Ok(value)
            }
            Err(e) => {
                metrics::record_execution_failure(self.store.kind());
                tracing::debug!(key = %key, "Operation failed, releasing idempotency key");
                guard.release().await;
                Err(e)
            }
        }
    }

    /// Process a message at most once
    ///
    /// Returns `Ok(true)` when this call ran `f`, `Ok(false)` when the key was
    /// already consumed.
    pub async fn consume<E, F, Fut>(
        &self,
        ctx: &ExecContext,
        key: &str,
        ttl: Duration,
        f: F,
    ) -> Result<bool, E>
    where
        E: From<IdempotencyError>,
        F: FnOnce(ExecContext) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let key = self.store_key(key)?;

        let guard = match self.acquire(ctx, &key).await? {
            Claim::Hit(_) => {
                metrics::record_cache_hit(self.store.kind());
                tracing::debug!(key = %key, "Message already consumed");
                return Ok(false);
            }
            Claim::Owner(guard) => guard,
        };

        metrics::record_execution(self.store.kind());
        if let Err(e) = f(ctx.clone()).await {
            metrics::record_execution_failure(self.store.kind());
            guard.release().await;
            return Err(e);
        }

        self.commit(guard, CONSUMED_MARKER, ttl).await?;
        Ok(true)
    }

    fn store_key(&self, key: &str) -> Result<String, IdempotencyError> {
        normalize_key(key)
            .map(|key| self.config.namespaced(key))
            .ok_or_else(|| IdempotencyError::InvalidKey("key must not be empty".to_string()))
    }

    async fn acquire(&self, ctx: &ExecContext, key: &str) -> Result<Claim, IdempotencyError> {
        Ok(
            match wait_or_lock(self.store.as_ref(), &self.config, ctx, key).await? {
                Acquisition::Hit(bytes) => Claim::Hit(bytes),
                Acquisition::Owner(token) => {
                    tracing::debug!(key, "Acquired idempotency key");
                    Claim::Owner(OwnerGuard::new(
                        self.store.clone(),
                        key.to_string(),
                        token,
                        self.config.lock_ttl,
                        self.config.renewal_interval(),
                    ))
                }
            },
        )
    }

    async fn commit(
        &self,
        mut guard: OwnerGuard,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), IdempotencyError> {
        match guard.commit(value, ttl).await {
            Ok(()) => Ok(()),
            Err(StoreError::LockLost { .. }) => {
                // The operation already ran; its value is still the caller's answer
                tracing::warn!(
                    key = %guard.key(),
                    "Idempotency lock was taken over before the result was stored, result not memoized"
                );
                Ok(())
            }
            Err(e) => {
                guard.release().await;
                Err(e.into())
            }
        }
    }
}

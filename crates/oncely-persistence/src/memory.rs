//! In-memory store implementation
//!
//! Provides:
//! - Atomic lock acquire/release under a single mutex
//! - Result memoization with lazy TTL eviction
//! - Optional background sweep of expired entries

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use oncely_common::{LockToken, StoreError, StoreKind};
use parking_lot::Mutex;
use tokio::time::interval;

use crate::traits::{RefreshableStore, Store};

struct LockEntry {
    token: LockToken,
    expires_at: Option<Instant>,
}

struct ResultEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

fn is_expired(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.is_some_and(|at| now >= at)
}

fn expiry_from(now: Instant, ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        now.checked_add(ttl)
    }
}

#[derive(Default)]
struct Tables {
    locks: HashMap<String, LockEntry>,
    results: HashMap<String, ResultEntry>,
}

impl Tables {
    fn purge(&mut self, now: Instant) -> usize {
        let before = self.locks.len() + self.results.len();
        self.locks.retain(|_, l| !is_expired(l.expires_at, now));
        self.results.retain(|_, r| !is_expired(r.expires_at, now));
        before - (self.locks.len() + self.results.len())
    }
}

/// Live entry counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub locks: usize,
    pub results: usize,
}

/// Single-process store
///
/// All state lives inside this instance, so it only coordinates callers that
/// share the same `MemoryStore` (tasks of one process). It is not a substitute
/// for `DistributedStore` when several processes or machines must agree.
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    /// Background sweep task handle
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            cleanup_handle: None,
        }
    }

    /// Start a background sweep of expired entries
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_cleanup(mut self, period: Duration) -> Self {
        let tables = self.tables.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                let evicted = tables.lock().purge(Instant::now());
                if evicted > 0 {
                    tracing::debug!(evicted, "Swept expired idempotency entries");
                }
            }
        });

        self.cleanup_handle = Some(handle);
        self
    }

    /// Evict every expired lock and result, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        self.tables.lock().purge(Instant::now())
    }

    /// Count unexpired entries
    pub fn stats(&self) -> MemoryStoreStats {
        let now = Instant::now();
        let tables = self.tables.lock();
        MemoryStoreStats {
            locks: tables
                .locks
                .values()
                .filter(|l| !is_expired(l.expires_at, now))
                .count(),
            results: tables
                .results
                .values()
                .filter(|r| !is_expired(r.expires_at, now))
                .count(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn lock(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, StoreError> {
        let now = Instant::now();
        let mut tables = self.tables.lock();

        if let Some(existing) = tables.locks.get(key)
            && !is_expired(existing.expires_at, now)
        {
            return Ok(None);
        }

        let token = LockToken::generate();
        tables.locks.insert(
            key.to_string(),
            LockEntry {
                token: token.clone(),
                expires_at: expiry_from(now, ttl),
            },
        );
        Ok(Some(token))
    }

    async fn unlock(&self, key: &str, token: &LockToken) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if tables.locks.get(key).is_some_and(|l| &l.token == token) {
            tables.locks.remove(key);
        }
        Ok(())
    }

    async fn set_result(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        token: &LockToken,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut tables = self.tables.lock();

        // A matching token means nobody has taken the lock over, even if it expired
        if !tables.locks.get(key).is_some_and(|l| &l.token == token) {
            return Err(StoreError::LockLost {
                key: key.to_string(),
            });
        }

        tables.locks.remove(key);

        let live = tables
            .results
            .get(key)
            .is_some_and(|r| !is_expired(r.expires_at, now));
        if !live {
            tables.results.insert(
                key.to_string(),
                ResultEntry {
                    value: value.to_vec(),
                    expires_at: expiry_from(now, ttl),
                },
            );
        }
        Ok(())
    }

    async fn get_result(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        let mut tables = self.tables.lock();

        match tables.results.get(key) {
            Some(entry) if is_expired(entry.expires_at, now) => {
                tables.results.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    fn as_refreshable(self: Arc<Self>) -> Option<Arc<dyn RefreshableStore>> {
        Some(self)
    }

    fn kind(&self) -> &'static str {
        StoreKind::Memory.as_str()
    }
}

#[async_trait]
impl RefreshableStore for MemoryStore {
    async fn refresh(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut tables = self.tables.lock();

        match tables.locks.get_mut(key) {
            Some(lock) if &lock.token == token => {
                lock.expires_at = expiry_from(now, ttl);
                Ok(())
            }
            _ => Err(StoreError::LockLost {
                key: key.to_string(),
            }),
        }
    }
}

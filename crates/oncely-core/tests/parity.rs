//! Behavioral parity between store backends
//!
//! Every scenario below runs against `MemoryStore` and against
//! `DistributedStore` on in-memory SQLite. Two `DistributedStore` instances
//! sharing one SQLite file stand in for separate processes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use oncely_core::{
    CONSUMED_MARKER, DistributedStore, ExecContext, Idempotency, IdempotencyConfig,
    IdempotencyError, MemoryStore, Store, StoreError, WaitExpiry,
};
use oncely_persistence::sea_orm::ConnectOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
enum AppError {
    Idempotency(IdempotencyError),
    Business(String),
}

impl From<IdempotencyError> for AppError {
    fn from(e: IdempotencyError) -> Self {
        AppError::Idempotency(e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    order_id: u64,
    status: String,
}

async fn memory_store() -> Arc<dyn Store> {
    Arc::new(MemoryStore::new())
}

async fn sqlite_store() -> Arc<dyn Store> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1);

    let store = DistributedStore::connect(options).await.unwrap();
    store.ensure_schema().await.unwrap();
    Arc::new(store)
}

// ============================================================================
// Scenarios
// ============================================================================

async fn check_at_most_one_execution(store: Arc<dyn Store>) {
    let idem = Arc::new(Idempotency::new(store));
    let counter = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let idem = idem.clone();
        let counter = counter.clone();
        handles.push(tokio::spawn(async move {
            idem.execute(&ExecContext::new(), "race", move |_| async move {
                let run = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, AppError>(run)
            })
            .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| *r == 1));
}

async fn check_sequential_replay(store: Arc<dyn Store>) {
    let idem = Idempotency::new(store);
    let counter = &AtomicUsize::new(0);
    let ctx = ExecContext::new();

    let mut results = Vec::new();
    for _ in 0..3 {
        let value: String = idem
            .execute(&ctx, "replay", move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AppError>("first-run".to_string())
            })
            .await
            .unwrap();
        results.push(value);
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(results, vec!["first-run"; 3]);
}

async fn check_failure_is_not_cached(store: Arc<dyn Store>) {
    let idem = Idempotency::new(store);
    let counter = &AtomicUsize::new(0);
    let ctx = ExecContext::new();

    let first = idem
        .execute(&ctx, "flaky", move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(AppError::Business("transient".to_string()))
        })
        .await;
    assert!(matches!(first, Err(AppError::Business(_))));

    let second = idem
        .execute(&ctx, "flaky", move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<u32, AppError>(2)
        })
        .await
        .unwrap();

    assert_eq!(second, 2);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

async fn check_empty_key_rejected(store: Arc<dyn Store>) {
    let idem = Idempotency::new(store);
    let counter = &AtomicUsize::new(0);
    let ctx = ExecContext::new();

    let executed = idem
        .execute(&ctx, "", move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<u32, AppError>(1)
        })
        .await;
    assert!(matches!(
        executed,
        Err(AppError::Idempotency(IdempotencyError::InvalidKey(_)))
    ));

    let consumed = idem
        .consume(&ctx, "", Duration::from_secs(60), move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), AppError>(())
        })
        .await;
    assert!(matches!(
        consumed,
        Err(AppError::Idempotency(IdempotencyError::InvalidKey(_)))
    ));

    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

async fn check_result_ttl_expiry(store: Arc<dyn Store>) {
    let idem = Idempotency::new(store.clone());
    let counter = &AtomicUsize::new(0);
    let ctx = ExecContext::new();
    let ttl = Duration::from_millis(200);

    let run = move |_: ExecContext| async move {
        Ok::<_, AppError>(counter.fetch_add(1, Ordering::SeqCst) + 1)
    };

    assert_eq!(idem.execute_with_ttl(&ctx, "ttl", ttl, run).await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.get_result("idem:ttl").await.unwrap().is_some());
    assert_eq!(idem.execute_with_ttl(&ctx, "ttl", ttl, run).await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(store.get_result("idem:ttl").await.unwrap().is_none());
    assert_eq!(idem.execute_with_ttl(&ctx, "ttl", ttl, run).await.unwrap(), 2);
}

async fn check_token_safety(store: Arc<dyn Store>) {
    let stale = store
        .lock("fenced", Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let current = store
        .lock("fenced", Duration::from_secs(30))
        .await
        .unwrap()
        .expect("expired lock should be taken over");
    assert_ne!(stale, current);

    store.unlock("fenced", &stale).await.unwrap();
    assert!(
        store
            .lock("fenced", Duration::from_secs(30))
            .await
            .unwrap()
            .is_none()
    );

    let err = store
        .set_result("fenced", b"stale", Duration::from_secs(60), &stale)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::LockLost { .. }));
    assert!(store.get_result("fenced").await.unwrap().is_none());

    store
        .set_result("fenced", b"current", Duration::from_secs(60), &current)
        .await
        .unwrap();
    assert_eq!(
        store.get_result("fenced").await.unwrap(),
        Some(b"current".to_vec())
    );
}

async fn check_order_creation_replays(store: Arc<dyn Store>) {
    let idem = Idempotency::new(store);
    let counter = &AtomicUsize::new(0);
    let ctx = ExecContext::new();

    let create = move |_: ExecContext| async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, AppError>(Order {
            order_id: 42,
            status: "created".to_string(),
        })
    };

    let first = idem.execute(&ctx, "order:create:42", create).await.unwrap();
    let second = idem.execute(&ctx, "order:create:42", create).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.order_id, 42);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

async fn check_boom_then_success(store: Arc<dyn Store>) {
    let idem = Idempotency::new(store);
    let ctx = ExecContext::new();
    let runs = &AtomicUsize::new(0);

    let err = idem
        .execute(&ctx, "payment:7", move |_| async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(AppError::Business("boom".to_string()))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Business(ref m) if m == "boom"));

    let ok = idem
        .execute(&ctx, "payment:7", move |_| async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>("paid".to_string())
        })
        .await
        .unwrap();
    assert_eq!(ok, "paid");

    // The success is memoized, so a third call replays it
    let replayed = idem
        .execute(&ctx, "payment:7", move |_| async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>("charged again".to_string())
        })
        .await
        .unwrap();
    assert_eq!(replayed, "paid");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

async fn check_wait_timeout(store: Arc<dyn Store>) {
    store
        .lock("idem:busy", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();

    let config = IdempotencyConfig::default().with_wait_timeout(Duration::from_millis(200));
    let idem = Idempotency::with_config(store, config).unwrap();
    let counter = &AtomicUsize::new(0);

    let err = idem
        .execute(&ExecContext::new(), "busy", move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<u32, AppError>(1)
        })
        .await
        .unwrap_err();

    match err {
        AppError::Idempotency(e) => {
            assert!(matches!(
                e,
                IdempotencyError::ConcurrencyTimeout {
                    reason: WaitExpiry::Deadline,
                    ..
                }
            ));
            assert!(e.is_retryable());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

async fn check_cancellation_while_waiting(store: Arc<dyn Store>) {
    store
        .lock("idem:held", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();

    let config = IdempotencyConfig::default().with_wait_timeout(Duration::ZERO);
    let idem = Idempotency::with_config(store, config).unwrap();

    let ctx = ExecContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        canceller.cancel();
    });

    let err = idem
        .execute(&ctx, "held", |_| async { Ok::<u32, AppError>(1) })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Idempotency(IdempotencyError::ConcurrencyTimeout {
            reason: WaitExpiry::Cancelled,
            ..
        })
    ));
}

async fn check_watchdog_keeps_lock_alive(store: Arc<dyn Store>) {
    let config = IdempotencyConfig::default().with_lock_ttl(Duration::from_secs(1));
    let idem = Idempotency::with_config(store.clone(), config).unwrap();

    let owner = tokio::spawn(async move {
        idem.execute(&ExecContext::new(), "slow", |_| async {
            tokio::time::sleep(Duration::from_millis(2_500)).await;
            Ok::<_, AppError>("finished".to_string())
        })
        .await
    });

    // Well past the original TTL the lock must still be held
    tokio::time::sleep(Duration::from_millis(1_800)).await;
    assert!(
        store
            .lock("idem:slow", Duration::from_secs(30))
            .await
            .unwrap()
            .is_none()
    );

    assert_eq!(owner.await.unwrap().unwrap(), "finished");
    assert!(store.get_result("idem:slow").await.unwrap().is_some());
}

async fn check_consume_marks_message(store: Arc<dyn Store>) {
    let idem = Idempotency::new(store.clone());
    let counter = &AtomicUsize::new(0);
    let ctx = ExecContext::new();

    let handle = move |_: ExecContext| async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<(), AppError>(())
    };

    assert!(
        idem.consume(&ctx, "msg:1", Duration::from_secs(60), handle)
            .await
            .unwrap()
    );
    assert!(
        !idem
            .consume(&ctx, "msg:1", Duration::from_secs(60), handle)
            .await
            .unwrap()
    );
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.get_result("idem:msg:1").await.unwrap(),
        Some(CONSUMED_MARKER.to_vec())
    );
}

// ============================================================================
// Backend matrix
// ============================================================================

macro_rules! parity_suite {
    ($backend:ident, $store:expr) => {
        mod $backend {
            use super::*;

            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn at_most_one_execution() {
                check_at_most_one_execution($store.await).await;
            }

            #[tokio::test]
            async fn sequential_replay() {
                check_sequential_replay($store.await).await;
            }

            #[tokio::test]
            async fn failure_is_not_cached() {
                check_failure_is_not_cached($store.await).await;
            }

            #[tokio::test]
            async fn empty_key_rejected() {
                check_empty_key_rejected($store.await).await;
            }

            #[tokio::test]
            async fn result_ttl_expiry() {
                check_result_ttl_expiry($store.await).await;
            }

            #[tokio::test]
            async fn token_safety() {
                check_token_safety($store.await).await;
            }

            #[tokio::test]
            async fn order_creation_replays() {
                check_order_creation_replays($store.await).await;
            }

            #[tokio::test]
            async fn boom_then_success() {
                check_boom_then_success($store.await).await;
            }

            #[tokio::test]
            async fn wait_timeout() {
                check_wait_timeout($store.await).await;
            }

            #[tokio::test]
            async fn cancellation_while_waiting() {
                check_cancellation_while_waiting($store.await).await;
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
            async fn watchdog_keeps_lock_alive() {
                check_watchdog_keeps_lock_alive($store.await).await;
            }

            #[tokio::test]
            async fn consume_marks_message() {
                check_consume_marks_message($store.await).await;
            }
        }
    };
}

parity_suite!(memory, memory_store());
parity_suite!(sqlite, sqlite_store());

// ============================================================================
// Separate connections to one database
// ============================================================================

async fn file_store(url: &str) -> DistributedStore {
    let mut options = ConnectOptions::new(url);
    options.max_connections(1).min_connections(1);
    DistributedStore::connect(options).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_database_runs_once_across_stores() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}/oncely.db?mode=rwc", dir.path().display());

    let first = file_store(&url).await;
    first.ensure_schema().await.unwrap();
    let second = file_store(&url).await;

    let nodes = [
        Arc::new(Idempotency::new(Arc::new(first))),
        Arc::new(Idempotency::new(Arc::new(second))),
    ];
    let counter = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..8 {
        let idem = nodes[i % 2].clone();
        let counter = counter.clone();
        handles.push(tokio::spawn(async move {
            idem.execute(&ExecContext::new(), "order:shared", move |_| async move {
                let run = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, AppError>(Order {
                    order_id: run as u64,
                    status: "created".to_string(),
                })
            })
            .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|order| *order == results[0]));
    assert_eq!(results[0].order_id, 1);

    // A later caller on either node replays the stored order
    for idem in &nodes {
        let replayed = idem
            .execute(&ExecContext::new(), "order:shared", |_| async {
                Ok::<_, AppError>(Order {
                    order_id: 99,
                    status: "duplicate".to_string(),
                })
            })
            .await
            .unwrap();
        assert_eq!(replayed, results[0]);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

//! Store backend selection.

use std::sync::Arc;
use std::time::Duration;

use oncely_common::StoreKind;
use oncely_core::{DistributedStore, MemoryStore, Store};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::model::config::Configuration;

/// Build the store selected by `store.mode`.
///
/// The memory store sweeps expired entries on its own; the database store gets
/// its schema created and, when `store.database.purge_interval_secs` is non-zero,
/// a background purge task.
pub async fn build_store(configuration: &Configuration) -> anyhow::Result<Arc<dyn Store>> {
    let kind = configuration.store_kind()?;
    info!("Store mode: {}", kind);

    match kind {
        StoreKind::Memory => {
            let interval = configuration.memory_cleanup_interval();
            let store = if interval.is_zero() {
                MemoryStore::new()
            } else {
                MemoryStore::new().with_cleanup(interval)
            };
            Ok(Arc::new(store))
        }
        StoreKind::Database => {
            let options = configuration.database_connect_options()?;
            let store = Arc::new(DistributedStore::connect(options).await?);
            store.ensure_schema().await?;

            let interval = configuration.database_purge_interval();
            if !interval.is_zero() {
                start_purge_task(store.clone(), interval);
            }

            Ok(store)
        }
    }
}

/// Periodically delete expired rows; stops when the runtime shuts down
pub fn start_purge_task(store: Arc<DistributedStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired idempotency rows"),
                Err(e) => warn!(error = %e, "Failed to purge expired idempotency rows"),
            }
        }
    })
}

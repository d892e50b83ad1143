// Metrics for the idempotent execution protocol
// Counters are labelled with the store backend kind

use metrics::{counter, describe_counter};

/// Register metric descriptions; call once at application startup
pub fn init_metrics() {
    describe_counter!(
        "oncely_cache_hits_total",
        "Calls answered from a memoized result"
    );
    describe_counter!(
        "oncely_executions_total",
        "Calls that acquired ownership and ran the operation"
    );
    describe_counter!(
        "oncely_execution_failures_total",
        "Owned executions whose operation returned an error"
    );
    describe_counter!(
        "oncely_wait_timeouts_total",
        "Calls that gave up waiting for another owner"
    );
    describe_counter!(
        "oncely_lock_refresh_failures_total",
        "Failed lock renewals"
    );

    tracing::info!("Idempotency metrics initialized");
}

pub(crate) fn record_cache_hit(store: &'static str) {
    counter!("oncely_cache_hits_total", "store" => store).increment(1);
}

pub(crate) fn record_execution(store: &'static str) {
    counter!("oncely_executions_total", "store" => store).increment(1);
}

pub(crate) fn record_execution_failure(store: &'static str) {
    counter!("oncely_execution_failures_total", "store" => store).increment(1);
}

pub(crate) fn record_wait_timeout(store: &'static str) {
    counter!("oncely_wait_timeouts_total", "store" => store).increment(1);
}

pub(crate) fn record_refresh_failure(store: &'static str) {
    counter!("oncely_lock_refresh_failures_total", "store" => store).increment(1);
}

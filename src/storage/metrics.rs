//! Shared metrics recording for storage and similarity backends.

use std::time::Instant;

/// Records a counter and a latency histogram for one storage operation.
///
/// # Arguments
///
/// * `backend` - Backend name (e.g., "sqlite", "brute-force", "usearch")
/// * `operation` - Operation name (e.g., "upsert", "search", "persist")
/// * `start` - Operation start time from `Instant::now()`
/// * `status` - "success" or "error"
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Maps a result to the status label used by [`record_operation_metrics`].
pub const fn status_of<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}

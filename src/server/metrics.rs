//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};

/// Records in the index after the last cycle.
pub static DOCUMENTS_TOTAL: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("docsync_documents_total", "Number of records in the index").unwrap()
});

/// Completed sync cycles by outcome (success, partial, failed, timeout).
pub static SYNC_CYCLES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "docsync_sync_cycles_total",
        "Total number of sync cycles",
        &["outcome"]
    )
    .unwrap()
});

/// Index mutations by operation (insert, update, delete, failed).
pub static SYNC_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "docsync_sync_operations_total",
        "Total number of per-document sync operations",
        &["operation"]
    )
    .unwrap()
});

/// Sync cycle duration.
pub static SYNC_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "docsync_sync_duration_seconds",
        "Sync cycle duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]
    )
    .unwrap()
});

/// Filesystem change events forwarded to the debouncer.
pub static CHANGE_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "docsync_change_events_total",
        "Total number of document change events"
    )
    .unwrap()
});

/// Request latency histogram.
pub static REQUEST_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "docsync_request_duration_seconds",
        "Request latency in seconds",
        &["endpoint"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap()
});

/// Request counter.
pub static REQUEST_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "docsync_requests_total",
        "Total number of requests",
        &["endpoint", "status"]
    )
    .unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*DOCUMENTS_TOTAL;
    let _ = &*SYNC_CYCLES;
    let _ = &*SYNC_OPERATIONS;
    let _ = &*SYNC_DURATION;
    let _ = &*CHANGE_EVENTS;
    let _ = &*REQUEST_LATENCY;
    let _ = &*REQUEST_COUNT;

    tracing::debug!("Prometheus metrics initialized");
}

/// Count `n` operations of one kind.
pub fn record_operations(operation: &str, n: usize) {
    if n > 0 {
        SYNC_OPERATIONS
            .with_label_values(&[operation])
            .inc_by(u64::try_from(n).unwrap_or(u64::MAX));
    }
}

/// Record a finished request.
pub fn record_request(endpoint: &str, status: u16, seconds: f64) {
    REQUEST_COUNT
        .with_label_values(&[endpoint, &status.to_string()])
        .inc();
    REQUEST_LATENCY
        .with_label_values(&[endpoint])
        .observe(seconds);
}

/// Encode the default registry in the Prometheus text format.
#[must_use]
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

//! Metrics module
//!
//! Prometheus counters and histograms for part uploads, upload sessions and
//! object reads. Metrics are registered in the default registry on first use.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

lazy_static! {
    // Part metrics
    pub static ref PART_ATTEMPTS_TOTAL: CounterVec = register_counter_vec!(
        "s3util_part_attempts_total",
        "Part upload attempts",
        &["status"]  // "success" or "failure"
    ).unwrap();

    pub static ref PART_BYTES_TOTAL: Counter = register_counter!(
        "s3util_part_bytes_total",
        "Bytes uploaded in successful parts"
    ).unwrap();

    // Session metrics
    pub static ref MULTIPART_UPLOADS: CounterVec = register_counter_vec!(
        "s3util_multipart_uploads_total",
        "Multipart upload sessions by outcome",
        &["status"]  // "committed", "aborted", "paused" or "failed"
    ).unwrap();

    pub static ref MULTIPART_PARTS: Histogram = register_histogram!(
        "s3util_multipart_parts",
        "Number of parts per committed multipart upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0]
    ).unwrap();

    // Read metrics
    pub static ref OBJECT_READ_BYTES_TOTAL: Counter = register_counter!(
        "s3util_object_read_bytes_total",
        "Bytes read from object bodies"
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "s3util_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record one part upload attempt
pub fn record_part_attempt(success: bool, bytes: u64) {
    let status = if success { "success" } else { "failure" };
    PART_ATTEMPTS_TOTAL.with_label_values(&[status]).inc();
    if success {
        PART_BYTES_TOTAL.inc_by(bytes as f64);
    }
}

/// Record a committed multipart upload
pub fn record_upload_committed(parts_count: usize) {
    MULTIPART_UPLOADS.with_label_values(&["committed"]).inc();
    MULTIPART_PARTS.observe(parts_count as f64);
}

/// Record an upload that ended in an abort
pub fn record_upload_aborted() {
    MULTIPART_UPLOADS.with_label_values(&["aborted"]).inc();
}

/// Record an upload whose completion request never succeeded
pub fn record_upload_failed() {
    MULTIPART_UPLOADS.with_label_values(&["failed"]).inc();
}

/// Record a paused upload
pub fn record_upload_paused() {
    MULTIPART_UPLOADS.with_label_values(&["paused"]).inc();
}

/// Record bytes delivered by an object reader
pub fn record_object_read(bytes: u64) {
    OBJECT_READ_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

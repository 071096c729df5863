//! Metrics for blob store operations.

use std::time::Instant;

use opentelemetry::{
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

/// Metrics for blob storage operations.
#[derive(Clone)]
pub struct BlobMetrics {
    /// Histogram for operation latencies.
    pub operations: Histogram<f64>,

    /// Counter for operation errors.
    pub errors: Counter<u64>,

    /// Counter for bytes moved through uploads and downloads.
    pub bytes: Counter<u64>,
}

impl BlobMetrics {
    /// Create new metrics from a meter.
    pub fn new(meter: &Meter) -> Self {
        let operations = meter
            .f64_histogram("blob_storage_operation_duration_seconds")
            .with_description("Duration of blob storage operations in seconds")
            .build();

        let errors = meter
            .u64_counter("blob_storage_errors_total")
            .with_description("Total number of blob storage errors")
            .build();

        let bytes = meter
            .u64_counter("blob_storage_bytes_total")
            .with_description("Total number of blob bytes written or read")
            .build();

        Self {
            operations,
            errors,
            bytes,
        }
    }

    /// Metrics registered on the process-wide meter provider.
    pub fn global() -> Self {
        Self::new(&opentelemetry::global::meter("blob_store"))
    }

    pub fn timer(&self, op: &'static str) -> Timer {
        Timer::start_with_labels(&self.operations, &[KeyValue::new("op", op)])
    }

    pub fn record_error(&self, op: &'static str) {
        self.errors.add(1, &[KeyValue::new("op", op)]);
    }

    pub fn record_bytes(&self, op: &'static str, count: u64) {
        self.bytes.add(count, &[KeyValue::new("op", op)]);
    }
}

/// Timer for measuring operation duration.
pub struct Timer {
    start: Instant,
    histogram: Histogram<f64>,
    labels: Vec<KeyValue>,
}

impl Timer {
    /// Start a new timer with labels.
    pub fn start_with_labels(histogram: &Histogram<f64>, labels: &[KeyValue]) -> Self {
        Self {
            start: Instant::now(),
            histogram: histogram.clone(),
            labels: labels.to_vec(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.record(duration, &self.labels);
    }
}

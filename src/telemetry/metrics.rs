//! Metric instrument factories for crawlq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a registered provider every instrument is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("crawlq")
}

/// Counter: admission attempts.
/// Labels: `result` ("ok" | "full" | "closed" | "invalid").
pub fn tasks_admitted() -> Counter<u64> {
    meter()
        .u64_counter("crawlq.task.admitted")
        .with_description("Task admission attempts by outcome")
        .build()
}

/// Counter: task status transitions.
/// Labels: `from`, `to`.
pub fn task_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("crawlq.task.state_transitions")
        .with_description("Number of task status transitions")
        .build()
}

/// Counter: analysis attempts repeated after a failure.
pub fn task_retries() -> Counter<u64> {
    meter()
        .u64_counter("crawlq.task.retries")
        .with_description("Analysis retries after a failed attempt")
        .build()
}

/// Histogram: wall time from pickup to final status.
/// Labels: `status`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("crawlq.task.duration_ms")
        .with_description("Task processing duration in milliseconds")
        .with_unit("ms")
        .build()
}

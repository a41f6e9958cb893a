//! Metric instrument factories.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments come from the `"capital-call-rs"` meter.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("capital-call-rs")
}

/// Counter: service actions attempted.
/// Labels: `action`, `result` ("ok" or the error code).
pub fn actions() -> Counter<u64> {
    meter()
        .u64_counter("capital_call.actions")
        .with_description("Number of capital call actions by outcome")
        .build()
}

/// Counter: workflow status changes.
/// Labels: `from`, `to`.
pub fn state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("capital_call.state_transitions")
        .with_description("Number of capital call workflow transitions")
        .build()
}

/// Counter: rejected concurrent edits.
/// Labels: `kind` ("lock" | "version").
pub fn conflicts() -> Counter<u64> {
    meter()
        .u64_counter("capital_call.conflicts")
        .with_description("Edits refused by the lock or version check")
        .build()
}

/// Histogram: wall time of one queue-count aggregation.
/// Labels: `queues` (how many were asked for).
pub fn queue_counts_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("capital_call.queue_counts.duration_ms")
        .with_description("Queue count aggregation duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Record one action outcome, plus a conflict when it was one.
pub fn record_action<T>(action: &'static str, result: &crate::error::Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    actions().add(
        1,
        &[
            KeyValue::new("action", action),
            KeyValue::new("result", outcome),
        ],
    );
    match result {
        Err(crate::error::Error::LockConflict(_)) => {
            conflicts().add(1, &[KeyValue::new("kind", "lock")]);
        }
        Err(crate::error::Error::VersionConflict { .. }) => {
            conflicts().add(1, &[KeyValue::new("kind", "version")]);
        }
        _ => {}
    }
}

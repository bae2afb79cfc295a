// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for rentsync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `rentsync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `entity`: product, customer, order, invoice
//! - `direction`: import, export
//! - `status`: success, error, partial

use std::time::Duration;

use metrics::{counter, histogram};

use crate::log::SyncLogEntry;

/// Record the outcome of one sync invocation.
pub fn record_sync(entry: &SyncLogEntry, duration: Duration) {
    let entity = entry.entity.as_str().to_string();
    let direction = entry.direction.as_str().to_string();

    counter!(
        "rentsync_invocations_total",
        "entity" => entity.clone(),
        "direction" => direction.clone(),
        "status" => entry.status.as_str().to_string()
    )
    .increment(1);

    counter!(
        "rentsync_records_total",
        "entity" => entity.clone(),
        "direction" => direction.clone(),
        "outcome" => "succeeded".to_string()
    )
    .increment(entry.records_succeeded);

    counter!(
        "rentsync_records_total",
        "entity" => entity.clone(),
        "direction" => direction.clone(),
        "outcome" => "failed".to_string()
    )
    .increment(entry.records_failed);

    histogram!(
        "rentsync_invocation_seconds",
        "entity" => entity,
        "direction" => direction
    )
    .record(duration.as_secs_f64());
}

/// Record one remote RPC round trip.
pub fn record_rpc(service: &str, method: &str, duration: Duration) {
    counter!(
        "rentsync_rpc_calls_total",
        "service" => service.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
    histogram!(
        "rentsync_rpc_seconds",
        "service" => service.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

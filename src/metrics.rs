// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for svc2dns.
//!
//! All metrics carry the `svc2dns_` prefix.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - reconciliations by event and outcome, and their duration
//! - **Mutation Metrics** - records created/deleted, retries and fatal timeouts
//! - **Provider Metrics** - provider errors by operation and kind
//!
//! [`serve`] exposes the registry on `/metrics` next to a `/healthz` probe.
//!
//! # Example
//!
//! ```rust,no_run
//! use svc2dns::metrics::{gather_metrics, record_reconciliation_success};
//!
//! record_reconciliation_success("added", std::time::Duration::from_millis(120));
//! let text = gather_metrics().unwrap();
//! ```

use crate::constants::{HEALTH_SERVER_PATH, METRICS_NAMESPACE, METRICS_SERVER_PATH};
use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by event type and status
///
/// Labels:
/// - `event`: `added`, `updated` or `removed`
/// - `status`: `success` or the error kind
pub static RECONCILIATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by event type and status",
    );
    let counter = CounterVec::new(opts, &["event", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
///
/// Labels:
/// - `event`: `added`, `updated` or `removed`
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by event type",
    )
    .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["event"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Mutation Metrics
// ============================================================================

/// Total number of records changed at the provider
///
/// Labels:
/// - `operation`: `create` or `delete`
pub static RECORD_MUTATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_record_mutations_total"),
        "Total number of DNS records created or deleted",
    );
    let counter = CounterVec::new(opts, &["operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of failed mutation attempts that were retried
pub static MUTATION_RETRIES_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let counter = Counter::new(
        format!("{METRICS_NAMESPACE}_mutation_retries_total"),
        "Total number of failed mutation attempts that were retried",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of mutations that exceeded their deadline
pub static MUTATION_TIMEOUTS_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let counter = Counter::new(
        format!("{METRICS_NAMESPACE}_mutation_timeouts_total"),
        "Total number of mutations that exceeded their retry deadline",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Provider Metrics
// ============================================================================

/// Total number of provider errors
///
/// Labels:
/// - `operation`: `list`, `create` or `delete`
/// - `kind`: error kind (`transport`, `http`, `decode`, ...)
pub static PROVIDER_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_provider_errors_total"),
        "Total number of DNS provider errors by operation and kind",
    );
    let counter = CounterVec::new(opts, &["operation", "kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
pub fn record_reconciliation_success(event: &str, duration: Duration) {
    RECONCILIATIONS_TOTAL
        .with_label_values(&[event, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[event])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
pub fn record_reconciliation_error(event: &str, error_kind: &str, duration: Duration) {
    RECONCILIATIONS_TOTAL
        .with_label_values(&[event, error_kind])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[event])
        .observe(duration.as_secs_f64());
}

/// Record a record created or deleted at the provider
pub fn record_mutation(operation: &str) {
    RECORD_MUTATIONS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

/// Record a failed mutation attempt that will be retried
pub fn record_mutation_retry() {
    MUTATION_RETRIES_TOTAL.inc();
}

/// Record a mutation that exceeded its deadline
pub fn record_mutation_timeout() {
    MUTATION_TIMEOUTS_TOTAL.inc();
}

/// Record a provider error
pub fn record_provider_error(operation: &str, kind: &str) {
    PROVIDER_ERRORS_TOTAL
        .with_label_values(&[operation, kind])
        .inc();
}

/// Gather all metrics in Prometheus text format
///
/// # Errors
///
/// Returns an error if metrics cannot be encoded
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

// ============================================================================
// HTTP Endpoint
// ============================================================================

/// Router serving `/metrics` and `/healthz`
pub fn router() -> Router {
    Router::new()
        .route(METRICS_SERVER_PATH, get(metrics_handler))
        .route(HEALTH_SERVER_PATH, get(|| async { "ok" }))
}

async fn metrics_handler() -> Response {
    match gather_metrics() {
        Ok(body) => (
            [(CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Serve [`router`] on an already bound listener until the task is dropped
///
/// # Errors
///
/// Returns an error if accepting connections fails
pub async fn serve(listener: tokio::net::TcpListener) -> std::io::Result<()> {
    axum::serve(listener, router()).await
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod metrics_tests;

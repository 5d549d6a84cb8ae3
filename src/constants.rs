// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the svc2dns controller.
//!
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Naming Constants
// ============================================================================

/// Default template used to derive the DNS name of a service
pub const DEFAULT_NAME_TEMPLATE: &str = "{{.Service.Name}}.svc.{{.Service.Namespace}}";

/// Default DNS zone under which records are managed
pub const DEFAULT_DOMAIN: &str = "cluster.local";

// ============================================================================
// DNS Record Constants
// ============================================================================

/// Provider wire name of an alias record
pub const ALIAS_RECORD_TYPE: &str = "CNAME";

// ============================================================================
// Mutation Retry Constants
// ============================================================================

/// Default per-mutation retry deadline (10 seconds)
pub const DEFAULT_MUTATION_TIMEOUT_SECS: u64 = 10;

/// Fixed delay between two attempts of the same mutation (1 second)
pub const MUTATION_BACKOFF_MILLIS: u64 = 1000;

// ============================================================================
// Watch & Dispatch Constants
// ============================================================================

/// Full redelivery interval for every known service (30 minutes)
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 1800;

/// Default number of reconciliation workers
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Capacity of each worker's event queue
pub const WORKER_QUEUE_DEPTH: usize = 256;

// ============================================================================
// DNSimple API Constants
// ============================================================================

/// Default DNSimple API endpoint
pub const DEFAULT_DNSIMPLE_API_URL: &str = "https://api.dnsimple.com";

/// Header carrying `email:token` credentials
pub const DNSIMPLE_TOKEN_HEADER: &str = "X-DNSimple-Token";

/// Timeout of a single HTTP request to the provider (30 seconds)
pub const PROVIDER_HTTP_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Metrics Constants
// ============================================================================

/// Namespace prefix for all metrics
pub const METRICS_NAMESPACE: &str = "svc2dns";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Path for the liveness endpoint
pub const HEALTH_SERVER_PATH: &str = "/healthz";

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # svc2dns - Kubernetes Service to DNSimple CNAME sync
//!
//! svc2dns watches Kubernetes `Service` objects and keeps one DNS alias
//! (CNAME) record per external load balancer hostname at DNSimple, under a
//! name rendered from a configurable template.
//!
//! ## Overview
//!
//! For every service lifecycle event the controller:
//!
//! 1. Renders the record name (default `{{.Service.Name}}.svc.{{.Service.Namespace}}`)
//! 2. Lists the provider's current alias records for that name
//! 3. Derives the desired records from the service's load balancer hostnames
//! 4. Computes the minimal create/delete plan
//! 5. Applies it, retrying each mutation with a fixed backoff until its deadline
//!
//! A mutation that cannot be applied before its deadline is fatal: the process
//! exits and rebuilds its view on restart.
//!
//! ## Modules
//!
//! - [`template`] - Naming template parser and renderer
//! - [`service`] - Service snapshots built from Kubernetes objects
//! - [`records`] - Desired/actual record types and the actual-state fetcher
//! - [`diff`] - Mutation plan computation
//! - [`retry`] - Deadline-bounded fixed-backoff retry
//! - [`mutation`] - Plan application
//! - [`reconciler`] - Per-event orchestration and per-name locking
//! - [`dispatch`] - Keyed worker pool
//! - [`watch`] - Kubernetes watch and resync
//! - [`provider`] - DNS provider trait, DNSimple client and in-memory provider
//! - [`config`] - Command-line and environment configuration
//! - [`metrics`] - Prometheus metrics and HTTP endpoint
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use svc2dns::provider::memory::MemoryProvider;
//! use svc2dns::reconciler::{Reconciler, ServiceEvent};
//! use svc2dns::retry::RetryPolicy;
//! use svc2dns::service::ServiceDescriptor;
//! use svc2dns::template::Template;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let reconciler = Reconciler::new(
//!     Arc::new(MemoryProvider::new()),
//!     "example.com",
//!     Template::parse("{{.Service.Name}}.svc.{{.Service.Namespace}}")?,
//!     RetryPolicy::default(),
//! );
//!
//! let web = ServiceDescriptor::new("prod", "web").with_hostname("lb1.example.com");
//! let outcome = reconciler.handle(&ServiceEvent::Added(web)).await?;
//! assert_eq!(outcome.name, "web.svc.prod");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod diff;
pub mod dispatch;
pub mod errors;
pub mod metrics;
pub mod mutation;
pub mod provider;
pub mod reconciler;
pub mod records;
pub mod retry;
pub mod service;
pub mod template;
pub mod watch;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service → DNS reconciliation.
//!
//! One [`Reconciler::handle`] call processes one service lifecycle event:
//!
//! 1. Resolve the record name from the naming template
//! 2. Fetch the provider's current alias records for that name
//! 3. Derive the desired records from the service's external endpoints
//!    (nothing is desired for a removed service)
//! 4. Diff desired against actual
//! 5. Apply the plan, each mutation retried until the mutation deadline
//!
//! Steps 2-5 run while holding a per-`(domain, name)` lock, so two events that
//! map to the same DNS name never interleave their provider calls. Events for
//! different names run fully in parallel.
//!
//! Updates are a single diff of the new desired state against the current
//! actual state; unchanged records are never removed and re-created.

use crate::diff::diff;
use crate::errors::ReconcileError;
use crate::metrics;
use crate::mutation::apply_plan;
use crate::provider::DnsProvider;
use crate::records::{desired_records, fetch_actual_records, DesiredRecord, RecordKind};
use crate::retry::RetryPolicy;
use crate::service::ServiceDescriptor;
use crate::template::Template;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

/// A service lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// A service appeared
    Added(ServiceDescriptor),
    /// A service changed (or was redelivered by a resync)
    Updated {
        /// Previously observed snapshot
        old: ServiceDescriptor,
        /// Current snapshot
        new: ServiceDescriptor,
    },
    /// A service was deleted
    Removed(ServiceDescriptor),
}

impl ServiceEvent {
    /// Event label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Updated { .. } => "updated",
            Self::Removed(_) => "removed",
        }
    }

    /// Most recent snapshot carried by the event.
    #[must_use]
    pub fn service(&self) -> &ServiceDescriptor {
        match self {
            Self::Added(service) | Self::Removed(service) => service,
            Self::Updated { new, .. } => new,
        }
    }
}

/// What a successful reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Record name the service resolved to
    pub name: String,
    /// Records created
    pub created: usize,
    /// Records deleted
    pub deleted: usize,
}

impl ReconcileOutcome {
    /// Whether the provider was left untouched.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.deleted == 0
    }
}

/// Map of async locks, one per key, created on demand.
///
/// Entries are dropped as soon as nobody holds or waits for them.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Guard returned by [`KeyedLocks::lock`]; releases the key on drop.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    /// Create an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and take it.
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        let guard = mutex.lock_owned().await;
        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or waited on.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .owner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

/// Keeps a provider's alias records in line with service endpoints.
pub struct Reconciler {
    provider: Arc<dyn DnsProvider>,
    domain: String,
    template: Template,
    policy: RetryPolicy,
    locks: KeyedLocks,
}

impl Reconciler {
    /// Create a reconciler managing records of `domain`.
    #[must_use]
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        domain: impl Into<String>,
        template: Template,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            domain: domain.into(),
            template,
            policy,
            locks: KeyedLocks::new(),
        }
    }

    /// Managed DNS zone.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Per-name locks, exposed for inspection.
    #[must_use]
    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    /// Resolve the record name of a service.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Template`] if the naming template cannot be rendered.
    pub fn resolve_name(&self, service: &ServiceDescriptor) -> Result<String, ReconcileError> {
        self.template
            .render(service)
            .map_err(|source| ReconcileError::Template {
                service: service.key(),
                source,
            })
    }

    /// Process one service lifecycle event.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::Template`] / [`ReconcileError::ProviderRead`]: this event is
    ///   skipped, a later event or resync will try again
    /// - [`ReconcileError::MutationTimeout`]: fatal, the caller must stop the process
    pub async fn handle(&self, event: &ServiceEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let start = Instant::now();
        let service = event.service();

        let result = match event {
            ServiceEvent::Added(service) => self.on_added(service).await,
            ServiceEvent::Updated { old, new } => self.on_updated(old, new).await,
            ServiceEvent::Removed(service) => self.on_removed(service).await,
        };

        match &result {
            Ok(outcome) if outcome.is_noop() => {
                debug!(
                    service = %service.key(),
                    event = event.kind(),
                    name = %outcome.name,
                    "Records already up to date"
                );
                metrics::record_reconciliation_success(event.kind(), start.elapsed());
            }
            Ok(outcome) => {
                info!(
                    service = %service.key(),
                    event = event.kind(),
                    name = %outcome.name,
                    domain = %self.domain,
                    created = outcome.created,
                    deleted = outcome.deleted,
                    "Reconciled service records"
                );
                metrics::record_reconciliation_success(event.kind(), start.elapsed());
            }
            Err(e) if e.is_fatal() => {
                error!(
                    service = %service.key(),
                    event = event.kind(),
                    error = %e,
                    "Fatal reconciliation failure, records can no longer be kept consistent"
                );
                metrics::record_reconciliation_error(event.kind(), e.kind(), start.elapsed());
            }
            Err(e) => {
                warn!(
                    service = %service.key(),
                    event = event.kind(),
                    error = %e,
                    "Reconciliation skipped, will retry on next event or resync"
                );
                metrics::record_reconciliation_error(event.kind(), e.kind(), start.elapsed());
            }
        }

        result
    }

    /// Create the records of a newly observed service.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::handle`].
    pub async fn on_added(
        &self,
        service: &ServiceDescriptor,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if service.ports.is_empty() && service.service_type != "ExternalName" {
            warn!(service = %service.key(), "Service declares no ports");
        }

        let name = self.resolve_name(service)?;
        let desired = desired_records(&name, service);
        self.converge(&name, &desired).await
    }

    /// Bring the records of a changed service in line with its new snapshot.
    ///
    /// If the template resolves to a different name for the new snapshot, the
    /// records under the old name are removed first.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::handle`].
    pub async fn on_updated(
        &self,
        old: &ServiceDescriptor,
        new: &ServiceDescriptor,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let name = self.resolve_name(new)?;
        let mut outcome = ReconcileOutcome::default();

        match self.template.render(old) {
            Ok(old_name) if old_name != name => {
                info!(
                    service = %new.key(),
                    old_name = %old_name,
                    new_name = %name,
                    "Service record name changed, removing records under previous name"
                );
                outcome.deleted += self.converge(&old_name, &[]).await?.deleted;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(
                    service = %old.key(),
                    error = %e,
                    "Previous snapshot has no resolvable name, nothing to clean up"
                );
            }
        }

        let desired = desired_records(&name, new);
        let current = self.converge(&name, &desired).await?;
        outcome.name = current.name;
        outcome.created += current.created;
        outcome.deleted += current.deleted;
        Ok(outcome)
    }

    /// Remove every record of a deleted service.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::handle`].
    pub async fn on_removed(
        &self,
        service: &ServiceDescriptor,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let name = self.resolve_name(service)?;
        self.converge(&name, &[]).await
    }

    /// Make the provider's alias records for `name` equal to `desired`.
    async fn converge(
        &self,
        name: &str,
        desired: &[DesiredRecord],
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let _guard = self.locks.lock(&format!("{name}.{}", self.domain)).await;

        let actual =
            fetch_actual_records(self.provider.as_ref(), &self.domain, name, &RecordKind::Alias)
                .await
                .map_err(|source| {
                    metrics::record_provider_error("list", source.kind());
                    ReconcileError::ProviderRead {
                        name: name.to_string(),
                        domain: self.domain.clone(),
                        source,
                    }
                })?;

        let plan = diff(desired, &actual);
        if plan.is_empty() {
            debug!(name = %name, domain = %self.domain, "No record changes needed");
            return Ok(ReconcileOutcome {
                name: name.to_string(),
                ..ReconcileOutcome::default()
            });
        }

        debug!(
            name = %name,
            domain = %self.domain,
            to_create = plan.to_create.len(),
            to_delete = plan.to_delete.len(),
            "Applying record changes"
        );
        let applied = apply_plan(self.provider.as_ref(), &self.domain, &plan, &self.policy).await?;

        Ok(ReconcileOutcome {
            name: name.to_string(),
            created: applied.created,
            deleted: applied.deleted,
        })
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;

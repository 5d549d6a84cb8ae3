// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Applying a [`MutationPlan`] to the provider.
//!
//! Each create/delete is an independent [`MutationTask`] wrapped in
//! [`retry_until`] with its own deadline. Deletions run before creations.

use crate::diff::MutationPlan;
use crate::errors::{MutationTimeoutExceeded, ProviderError};
use crate::metrics;
use crate::provider::DnsProvider;
use crate::records::{ActualRecord, DesiredRecord};
use crate::retry::{retry_until, RetryPolicy};
use tracing::{debug, info};

/// A single pending provider mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationTask {
    /// Create a record
    Create(DesiredRecord),
    /// Delete a record
    Delete(ActualRecord),
}

impl MutationTask {
    /// Label used in metrics.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Delete(_) => "delete",
        }
    }

    /// Human-readable description used in logs and timeout errors.
    #[must_use]
    pub fn describe(&self, domain: &str) -> String {
        match self {
            Self::Create(record) => format!(
                "create {} {}.{domain} -> {}",
                record.kind, record.name, record.target
            ),
            Self::Delete(record) => format!(
                "delete {} {}.{domain} -> {} (id {})",
                record.kind, record.name, record.target, record.id
            ),
        }
    }
}

/// Counts of what a plan application changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedMutations {
    /// Records created
    pub created: usize,
    /// Records deleted
    pub deleted: usize,
}

/// Apply every mutation of `plan`, deletions first.
///
/// An empty plan makes no provider call.
///
/// # Errors
///
/// Returns [`MutationTimeoutExceeded`] as soon as one mutation exhausts its
/// deadline; the remaining mutations are not attempted.
pub async fn apply_plan(
    provider: &dyn DnsProvider,
    domain: &str,
    plan: &MutationPlan,
    policy: &RetryPolicy,
) -> Result<AppliedMutations, MutationTimeoutExceeded> {
    let mut applied = AppliedMutations::default();

    for record in &plan.to_delete {
        execute(provider, domain, &MutationTask::Delete(record.clone()), policy).await?;
        applied.deleted += 1;
    }

    for record in &plan.to_create {
        execute(provider, domain, &MutationTask::Create(record.clone()), policy).await?;
        applied.created += 1;
    }

    Ok(applied)
}

/// Run one mutation under the retry policy.
///
/// Deleting a record that no longer exists counts as success: another actor
/// (or an earlier, partially applied reconciliation) already removed it.
///
/// # Errors
///
/// Returns [`MutationTimeoutExceeded`] if the mutation never succeeded before its deadline.
pub async fn execute(
    provider: &dyn DnsProvider,
    domain: &str,
    task: &MutationTask,
    policy: &RetryPolicy,
) -> Result<(), MutationTimeoutExceeded> {
    let description = task.describe(domain);
    let operation = task.operation();

    match task {
        MutationTask::Create(record) => {
            let created = retry_until(
                move || async move {
                    provider
                        .create_record(domain, record)
                        .await
                        .inspect_err(|e| metrics::record_provider_error(operation, e.kind()))
                },
                &description,
                policy,
            )
            .await?;
            info!(
                domain = %domain,
                name = %created.name,
                target = %created.target,
                id = %created.id,
                "Created {} record",
                created.kind
            );
        }
        MutationTask::Delete(record) => {
            retry_until(
                move || async move {
                    match provider.delete_record(domain, &record.id).await {
                        Err(ProviderError::RecordNotFound { .. }) => {
                            debug!(
                                domain = %domain,
                                id = %record.id,
                                "Record already gone, nothing to delete"
                            );
                            Ok(())
                        }
                        other => other
                            .inspect_err(|e| metrics::record_provider_error(operation, e.kind())),
                    }
                },
                &description,
                policy,
            )
            .await?;
            info!(
                domain = %domain,
                name = %record.name,
                target = %record.target,
                id = %record.id,
                "Removed {} record",
                record.kind
            );
        }
    }

    metrics::record_mutation(operation);
    Ok(())
}

#[cfg(test)]
#[path = "mutation_tests.rs"]
mod mutation_tests;

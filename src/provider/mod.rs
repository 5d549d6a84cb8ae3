// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS provider interface.
//!
//! The provider is the only surface through which records are read or changed.
//! Implementations make exactly one API call per method and never retry:
//! retrying mutations is the job of [`crate::retry`], and failed reads are
//! retried by the next reconciliation.
//!
//! - [`dnsimple::DnsimpleClient`] - DNSimple HTTP API
//! - [`memory::MemoryProvider`] - in-process record store with failure injection

pub mod dnsimple;
pub mod memory;

use crate::errors::ProviderError;
use crate::records::{ActualRecord, DesiredRecord, RecordKind};
use async_trait::async_trait;

/// Operations a DNS provider must support.
///
/// Implementations must be usable from many reconciliations at once.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List the records of `domain` named `name` with type `kind`.
    async fn list_records(
        &self,
        domain: &str,
        name: &str,
        kind: &RecordKind,
    ) -> Result<Vec<ActualRecord>, ProviderError>;

    /// Create a record in `domain`.
    async fn create_record(
        &self,
        domain: &str,
        record: &DesiredRecord,
    ) -> Result<ActualRecord, ProviderError>;

    /// Delete the record with provider identifier `id` from `domain`.
    ///
    /// Returns [`ProviderError::RecordNotFound`] when no such record exists.
    async fn delete_record(&self, domain: &str, id: &str) -> Result<(), ProviderError>;
}

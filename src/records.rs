// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired and actual DNS record state.
//!
//! - [`desired_records`] turns a service's external endpoints into the alias
//!   records that should exist
//! - [`fetch_actual_records`] reads the records the provider currently holds
//!
//! Both sides are compared by the [`crate::diff`] engine using only
//! `(kind, target)`; provider identifiers never take part in matching.

use crate::constants::ALIAS_RECORD_TYPE;
use crate::errors::ProviderError;
use crate::provider::DnsProvider;
use crate::service::ServiceDescriptor;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, trace};

/// Type of a DNS record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Name-to-hostname alias (`CNAME`). The only kind this controller manages.
    Alias,
    /// Any other type reported by the provider
    Other(String),
}

impl RecordKind {
    /// Parse a provider record type.
    #[must_use]
    pub fn from_wire(record_type: &str) -> Self {
        if record_type.eq_ignore_ascii_case(ALIAS_RECORD_TYPE) {
            Self::Alias
        } else {
            Self::Other(record_type.to_string())
        }
    }

    /// Provider wire name of this record type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Alias => ALIAS_RECORD_TYPE,
            Self::Other(record_type) => record_type,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that should exist for a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DesiredRecord {
    /// Record name, relative to the managed domain
    pub name: String,
    /// Record type
    pub kind: RecordKind,
    /// Hostname the record points to
    pub target: String,
}

impl DesiredRecord {
    /// Build an alias record.
    #[must_use]
    pub fn alias(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RecordKind::Alias,
            target: target.into(),
        }
    }

    /// Key used to match this record against actual records.
    #[must_use]
    pub fn match_key(&self) -> (&RecordKind, &str) {
        (&self.kind, &self.target)
    }
}

impl fmt::Display for DesiredRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.kind, self.name, self.target)
    }
}

/// A record as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActualRecord {
    /// Provider-assigned identifier, only needed to delete the record
    pub id: String,
    /// Record name, relative to the managed domain
    pub name: String,
    /// Record type
    pub kind: RecordKind,
    /// Hostname the record points to
    pub target: String,
}

impl ActualRecord {
    /// Key used to match this record against desired records.
    #[must_use]
    pub fn match_key(&self) -> (&RecordKind, &str) {
        (&self.kind, &self.target)
    }
}

impl fmt::Display for ActualRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {} (id {})", self.kind, self.name, self.target, self.id)
    }
}

/// Compute the alias records a service should have under `name`.
///
/// Returns an empty set when the load-balancing layer hasn't assigned the
/// service an external address yet. Duplicate hostnames collapse into one record.
#[must_use]
pub fn desired_records(name: &str, service: &ServiceDescriptor) -> Vec<DesiredRecord> {
    if !service.has_external_address() {
        debug!(
            service = %service.key(),
            "Service has no external address yet, no records desired"
        );
        return Vec::new();
    }

    if service.external_hostnames.is_empty() {
        debug!(
            service = %service.key(),
            ips = ?service.external_ips,
            "Service only has ingress IPs, which cannot be aliased"
        );
    }

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for hostname in &service.external_hostnames {
        if hostname.trim().is_empty() || !seen.insert(hostname.as_str()) {
            continue;
        }
        records.push(DesiredRecord::alias(name, hostname.as_str()));
    }
    records
}

/// Read the provider's records for `(domain, name, kind)`.
///
/// Provider errors are returned unchanged and never retried here: a failed read
/// aborts the current reconciliation, which is retried on the next event or resync.
///
/// # Errors
///
/// Returns the provider's error if the records cannot be listed.
pub async fn fetch_actual_records(
    provider: &dyn DnsProvider,
    domain: &str,
    name: &str,
    kind: &RecordKind,
) -> Result<Vec<ActualRecord>, ProviderError> {
    let records: Vec<ActualRecord> = provider
        .list_records(domain, name, kind)
        .await?
        .into_iter()
        .filter(|record| record.name == name && &record.kind == kind)
        .collect();

    debug!(
        domain = %domain,
        name = %name,
        count = records.len(),
        "Fetched existing records"
    );
    for record in &records {
        trace!(domain = %domain, record = %record, "Existing record");
    }

    Ok(records)
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod records_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired vs. actual record diffing.
//!
//! Records are matched only by `(kind, target)`. Provider identifiers are
//! unknown until fetched and never take part in matching. The diff is a pure
//! set difference in both directions:
//!
//! ```text
//! to_create = desired - actual
//! to_delete = actual  - desired
//! ```
//!
//! Applying the resulting plan and diffing again against the same desired set
//! yields an empty plan.

use crate::records::{ActualRecord, DesiredRecord, RecordKind};
use std::collections::HashSet;

/// Minimal set of changes turning the actual record set into the desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationPlan {
    /// Desired records missing from the provider
    pub to_create: Vec<DesiredRecord>,
    /// Provider records no longer desired
    pub to_delete: Vec<ActualRecord>,
}

impl MutationPlan {
    /// Whether the plan requires no provider call at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }

    /// Total number of mutations in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_delete.len()
    }
}

/// Compute the mutation plan between `desired` and `actual`.
///
/// Output order follows input order, so the same inputs always yield the same plan.
#[must_use]
pub fn diff(desired: &[DesiredRecord], actual: &[ActualRecord]) -> MutationPlan {
    let actual_keys: HashSet<(&RecordKind, &str)> =
        actual.iter().map(ActualRecord::match_key).collect();
    let desired_keys: HashSet<(&RecordKind, &str)> =
        desired.iter().map(DesiredRecord::match_key).collect();

    let to_create = desired
        .iter()
        .filter(|record| !actual_keys.contains(&record.match_key()))
        .cloned()
        .collect();

    let to_delete = actual
        .iter()
        .filter(|record| !desired_keys.contains(&record.match_key()))
        .cloned()
        .collect();

    MutationPlan {
        to_create,
        to_delete,
    }
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-process DNS provider.
//!
//! Keeps records in memory, counts every call and can be told to fail reads or
//! writes. Used to exercise the reconciler without a real provider account.

use super::DnsProvider;
use crate::errors::ProviderError;
use crate::records::{ActualRecord, DesiredRecord, RecordKind};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    /// Records per domain
    zones: BTreeMap<String, Vec<ActualRecord>>,
    next_id: u64,
    fail_reads: bool,
    /// Number of upcoming writes that fail; `usize::MAX` means all of them
    failing_writes: usize,
}

/// In-memory [`DnsProvider`].
#[derive(Debug, Default)]
pub struct MemoryProvider {
    state: Mutex<State>,
    latency: Option<Duration>,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind, still usable.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Add a record directly, bypassing failure injection and call counters.
    pub fn insert_record(
        &self,
        domain: &str,
        name: &str,
        kind: RecordKind,
        target: &str,
    ) -> ActualRecord {
        let mut state = self.state();
        state.next_id += 1;
        let record = ActualRecord {
            id: state.next_id.to_string(),
            name: name.to_string(),
            kind,
            target: target.to_string(),
        };
        state
            .zones
            .entry(domain.to_string())
            .or_default()
            .push(record.clone());
        record
    }

    /// All records of `domain`, in creation order.
    #[must_use]
    pub fn records(&self, domain: &str) -> Vec<ActualRecord> {
        self.state().zones.get(domain).cloned().unwrap_or_default()
    }

    /// Make every `list_records` call fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    /// Make the next `count` create/delete calls fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.state().failing_writes = count;
    }

    /// Make every create/delete call fail until reset with `fail_next_writes(0)`.
    pub fn fail_all_writes(&self) {
        self.state().failing_writes = usize::MAX;
    }

    /// Number of `list_records` calls so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `create_record` calls so far, failed ones included.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete_record` calls so far, failed ones included.
    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_write_failure(state: &mut State) -> Result<(), ProviderError> {
        match state.failing_writes {
            0 => Ok(()),
            usize::MAX => Err(ProviderError::Unavailable {
                reason: "injected write failure".to_string(),
            }),
            _ => {
                state.failing_writes -= 1;
                Err(ProviderError::Unavailable {
                    reason: "injected write failure".to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl DnsProvider for MemoryProvider {
    async fn list_records(
        &self,
        domain: &str,
        name: &str,
        kind: &RecordKind,
    ) -> Result<Vec<ActualRecord>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let state = self.state();
        if state.fail_reads {
            return Err(ProviderError::Unavailable {
                reason: "injected read failure".to_string(),
            });
        }

        Ok(state
            .zones
            .get(domain)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.name == name && &r.kind == kind)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_record(
        &self,
        domain: &str,
        record: &DesiredRecord,
    ) -> Result<ActualRecord, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let mut state = self.state();
        Self::take_write_failure(&mut state)?;

        state.next_id += 1;
        let created = ActualRecord {
            id: state.next_id.to_string(),
            name: record.name.clone(),
            kind: record.kind.clone(),
            target: record.target.clone(),
        };
        state
            .zones
            .entry(domain.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn delete_record(&self, domain: &str, id: &str) -> Result<(), ProviderError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let mut state = self.state();
        Self::take_write_failure(&mut state)?;

        let records = state.zones.entry(domain.to_string()).or_default();
        match records.iter().position(|r| r.id == id) {
            Some(index) => {
                records.remove(index);
                Ok(())
            }
            None => Err(ProviderError::RecordNotFound {
                domain: domain.to_string(),
                id: id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;

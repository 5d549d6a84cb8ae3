// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Keyed worker pool feeding the [`Reconciler`].
//!
//! The watcher never calls the reconciler directly. It hands each
//! [`ServiceEvent`] to a [`Dispatcher`], which routes it over a bounded channel
//! to one of N workers. The worker is picked from a stable hash of the
//! service's `namespace/name`, so events for one service are handled in the
//! order they were observed while different services proceed in parallel.
//!
//! A worker that hits a fatal error reports it through [`Dispatcher::fatal`]
//! and stops. Non-fatal errors are already logged by the reconciler and the
//! event is dropped; the next event or resync for that service tries again.

use crate::errors::{DispatchError, ReconcileError};
use crate::reconciler::{Reconciler, ServiceEvent};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Pool of reconciliation workers.
#[derive(Debug)]
pub struct Dispatcher {
    senders: Vec<mpsc::Sender<ServiceEvent>>,
    workers: Vec<JoinHandle<()>>,
    fatal_rx: Mutex<mpsc::Receiver<ReconcileError>>,
}

impl Dispatcher {
    /// Spawn `workers` workers (at least one), each with a queue of `queue_depth` events.
    #[must_use]
    pub fn new(workers: usize, queue_depth: usize, reconciler: Arc<Reconciler>) -> Self {
        let workers = workers.max(1);
        let (fatal_tx, fatal_rx) = mpsc::channel(workers);

        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, rx) = mpsc::channel(queue_depth.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(
                id,
                rx,
                reconciler.clone(),
                fatal_tx.clone(),
            )));
        }

        info!(workers, queue_depth, "Started reconciliation workers");

        Self {
            senders,
            workers: handles,
            fatal_rx: Mutex::new(fatal_rx),
        }
    }

    /// Number of workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Index of the worker that owns the service `key`.
    #[must_use]
    pub fn worker_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let workers = self.senders.len() as u64;
        usize::try_from(hasher.finish() % workers).unwrap_or_default()
    }

    /// Queue an event on the worker owning its service.
    ///
    /// Waits while that worker's queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::WorkerStopped`] if the worker has exited, which
    /// only happens after it reported a fatal error.
    pub async fn dispatch(&self, event: ServiceEvent) -> Result<(), DispatchError> {
        let service = event.service().key();
        let worker = self.worker_for(&service);
        let kind = event.kind();

        debug!(service = %service, event = kind, worker, "Dispatching service event");

        self.senders[worker]
            .send(event)
            .await
            .map_err(|_| DispatchError::WorkerStopped {
                worker,
                event: kind,
                service,
            })
    }

    /// Wait for the first fatal reconciliation error.
    ///
    /// Returns `None` once every worker has exited without one.
    pub async fn fatal(&self) -> Option<ReconcileError> {
        self.fatal_rx.lock().await.recv().await
    }

    /// Stop accepting events and wait for queued events to drain.
    pub async fn shutdown(self) {
        drop(self.senders);
        for (id, handle) in self.workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker = id, error = %e, "Reconciliation worker panicked");
            }
        }
        info!("Reconciliation workers stopped");
    }
}

async fn run_worker(
    id: usize,
    mut events: mpsc::Receiver<ServiceEvent>,
    reconciler: Arc<Reconciler>,
    fatal_tx: mpsc::Sender<ReconcileError>,
) {
    debug!(worker = id, "Reconciliation worker started");

    while let Some(event) = events.recv().await {
        match reconciler.handle(&event).await {
            Err(e) if e.is_fatal() => {
                error!(worker = id, error = %e, "Worker stopping after fatal error");
                if fatal_tx.send(e).await.is_err() {
                    debug!(worker = id, "Nobody is waiting for fatal errors");
                }
                return;
            }
            // Logged and counted by the reconciler
            Ok(_) | Err(_) => {}
        }
    }

    debug!(worker = id, "Reconciliation worker stopped");
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod dispatch_tests;

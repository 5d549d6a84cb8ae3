// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes `Service` watch.
//!
//! Turns the raw `kube` watcher stream into [`ServiceEvent`]s:
//!
//! - `Apply` / `InitApply` of an unseen service → [`ServiceEvent::Added`]
//! - `Apply` / `InitApply` of a known service whose snapshot changed →
//!   [`ServiceEvent::Updated`]
//! - `Delete` → [`ServiceEvent::Removed`]
//! - services missing from a relist (`Init` … `InitDone`) →
//!   [`ServiceEvent::Removed`], they were deleted while the watch was down
//!
//! Every cached service is also redelivered as `Updated { old: s, new: s }`
//! on each resync tick so drift at the provider gets repaired.

use crate::dispatch::Dispatcher;
use crate::errors::DispatchError;
use crate::reconciler::ServiceEvent;
use crate::service::ServiceDescriptor;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Service;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Last-seen snapshot of every service, keyed by `namespace/name`.
#[derive(Debug, Default)]
pub struct ServiceCache {
    services: BTreeMap<String, ServiceDescriptor>,
    /// Keys seen since the current relist started
    relist: Option<HashSet<String>>,
}

impl ServiceCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no service is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Cached snapshot of a service.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ServiceDescriptor> {
        self.services.get(key)
    }

    /// Classify one watcher event into the service events it implies.
    pub fn apply(&mut self, event: Event<Service>) -> Vec<ServiceEvent> {
        match event {
            Event::Apply(service) => self
                .observe(ServiceDescriptor::from(&service))
                .into_iter()
                .collect(),
            Event::Delete(service) => vec![self.forget(ServiceDescriptor::from(&service))],
            Event::Init => {
                debug!(cached = self.services.len(), "Service relist started");
                self.relist = Some(HashSet::new());
                Vec::new()
            }
            Event::InitApply(service) => {
                let descriptor = ServiceDescriptor::from(&service);
                if let Some(seen) = self.relist.as_mut() {
                    seen.insert(descriptor.key());
                }
                self.observe(descriptor).into_iter().collect()
            }
            Event::InitDone => self.finish_relist(),
        }
    }

    /// Record a new snapshot; `None` when nothing relevant changed.
    pub fn observe(&mut self, service: ServiceDescriptor) -> Option<ServiceEvent> {
        let key = service.key();
        match self.services.insert(key.clone(), service.clone()) {
            None => Some(ServiceEvent::Added(service)),
            Some(old) if old != service => Some(ServiceEvent::Updated { old, new: service }),
            Some(_) => {
                debug!(service = %key, "Service snapshot unchanged");
                None
            }
        }
    }

    /// Drop a deleted service.
    pub fn forget(&mut self, service: ServiceDescriptor) -> ServiceEvent {
        self.services.remove(&service.key());
        ServiceEvent::Removed(service)
    }

    /// Redeliver every cached service.
    #[must_use]
    pub fn resync(&self) -> Vec<ServiceEvent> {
        self.services
            .values()
            .map(|service| ServiceEvent::Updated {
                old: service.clone(),
                new: service.clone(),
            })
            .collect()
    }

    fn finish_relist(&mut self) -> Vec<ServiceEvent> {
        let Some(seen) = self.relist.take() else {
            return Vec::new();
        };

        let gone: Vec<String> = self
            .services
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();

        debug!(
            listed = seen.len(),
            removed = gone.len(),
            "Service relist finished"
        );

        gone.into_iter()
            .filter_map(|key| self.services.remove(&key))
            .map(ServiceEvent::Removed)
            .collect()
    }
}

/// Watch every `Service` in the cluster, with the watcher's default backoff on errors.
pub fn service_stream(
    client: Client,
) -> impl Stream<Item = Result<Event<Service>, watcher::Error>> + Send {
    let api: Api<Service> = Api::all(client);
    watcher::watcher(api, watcher::Config::default()).default_backoff()
}

/// Feed a watcher stream into the dispatcher until the stream ends.
///
/// Every `resync_period` all cached services are redelivered.
///
/// # Errors
///
/// Returns [`DispatchError`] once a worker has stopped, which only happens
/// after a fatal reconciliation error.
pub async fn run<S>(
    stream: S,
    dispatcher: &Dispatcher,
    resync_period: Duration,
) -> Result<(), DispatchError>
where
    S: Stream<Item = Result<Event<Service>, watcher::Error>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut cache = ServiceCache::new();
    let mut resync = interval_at(Instant::now() + resync_period, resync_period);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(resync_period = ?resync_period, "Watching services");

    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(event)) => {
                    for event in cache.apply(event) {
                        dispatcher.dispatch(event).await?;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Service watch error, backing off");
                }
                None => {
                    info!("Service watch ended");
                    return Ok(());
                }
            },
            _ = resync.tick() => {
                debug!(services = cache.len(), "Resyncing services");
                for event in cache.resync() {
                    dispatcher.dispatch(event).await?;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod watch_tests;

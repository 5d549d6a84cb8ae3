// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `watch.rs`

#[cfg(test)]
mod tests {
    use crate::dispatch::Dispatcher;
    use crate::provider::memory::MemoryProvider;
    use crate::reconciler::{Reconciler, ServiceEvent};
    use crate::retry::RetryPolicy;
    use crate::template::Template;
    use crate::watch::{run, ServiceCache};
    use futures::stream::{self, StreamExt};
    use k8s_openapi::api::core::v1::Service;
    use kube::runtime::watcher::{self, Event};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const DOMAIN: &str = "example.com";

    fn service(name: &str, hostnames: &[&str]) -> Service {
        let ingress: Vec<_> = hostnames.iter().map(|h| json!({ "hostname": h })).collect();
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": name, "namespace": "prod" },
            "spec": { "type": "LoadBalancer", "ports": [{ "port": 80 }] },
            "status": { "loadBalancer": { "ingress": ingress } }
        }))
        .expect("valid Service JSON")
    }

    fn kinds(events: &[ServiceEvent]) -> Vec<&'static str> {
        events.iter().map(ServiceEvent::kind).collect()
    }

    #[test]
    fn test_apply_of_new_service_is_added() {
        let mut cache = ServiceCache::new();

        let events = cache.apply(Event::Apply(service("web", &["lb1.example.com"])));

        assert_eq!(kinds(&events), vec!["added"]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("prod/web").is_some());
    }

    #[test]
    fn test_apply_of_changed_service_is_updated() {
        let mut cache = ServiceCache::new();
        cache.apply(Event::Apply(service("web", &["lb1.example.com"])));

        let events = cache.apply(Event::Apply(service("web", &["lb2.example.com"])));

        match events.as_slice() {
            [ServiceEvent::Updated { old, new }] => {
                assert_eq!(old.external_hostnames, vec!["lb1.example.com"]);
                assert_eq!(new.external_hostnames, vec!["lb2.example.com"]);
            }
            other => panic!("expected one update, got {other:?}"),
        }
    }

    #[test]
    fn test_apply_of_unchanged_service_is_ignored() {
        let mut cache = ServiceCache::new();
        cache.apply(Event::Apply(service("web", &["lb1.example.com"])));

        let events = cache.apply(Event::Apply(service("web", &["lb1.example.com"])));

        assert!(events.is_empty());
    }

    #[test]
    fn test_delete_is_removed_and_evicted() {
        let mut cache = ServiceCache::new();
        cache.apply(Event::Apply(service("web", &["lb1.example.com"])));

        let events = cache.apply(Event::Delete(service("web", &["lb1.example.com"])));

        assert_eq!(kinds(&events), vec!["removed"]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_relist_removes_services_deleted_while_disconnected() {
        let mut cache = ServiceCache::new();
        cache.apply(Event::Apply(service("web", &["lb1.example.com"])));
        cache.apply(Event::Apply(service("api", &["lb9.example.com"])));

        assert!(cache.apply(Event::Init).is_empty());
        assert!(cache
            .apply(Event::InitApply(service("web", &["lb1.example.com"])))
            .is_empty());
        let added = cache.apply(Event::InitApply(service("admin", &["lb3.example.com"])));
        let done = cache.apply(Event::InitDone);

        assert_eq!(kinds(&added), vec!["added"]);
        match done.as_slice() {
            [ServiceEvent::Removed(gone)] => assert_eq!(gone.key(), "prod/api"),
            other => panic!("expected api to be removed, got {other:?}"),
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_init_done_without_init_is_ignored() {
        let mut cache = ServiceCache::new();
        cache.apply(Event::Apply(service("web", &["lb1.example.com"])));

        assert!(cache.apply(Event::InitDone).is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_resync_redelivers_every_service() {
        let mut cache = ServiceCache::new();
        cache.apply(Event::Apply(service("web", &["lb1.example.com"])));
        cache.apply(Event::Apply(service("api", &["lb9.example.com"])));

        let events = cache.resync();

        assert_eq!(kinds(&events), vec!["updated", "updated"]);
        for event in &events {
            match event {
                ServiceEvent::Updated { old, new } => assert_eq!(old, new),
                other => panic!("expected update, got {other:?}"),
            }
        }
    }

    fn dispatcher(provider: &Arc<MemoryProvider>) -> Dispatcher {
        let reconciler = Reconciler::new(
            provider.clone(),
            DOMAIN,
            Template::parse("{{.Service.Name}}.svc.{{.Service.Namespace}}").unwrap(),
            RetryPolicy::new(Duration::from_secs(2)),
        );
        Dispatcher::new(2, 8, Arc::new(reconciler))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_dispatches_watch_events() {
        let provider = Arc::new(MemoryProvider::new());
        let dispatcher = dispatcher(&provider);
        let events: Vec<Result<Event<Service>, watcher::Error>> = vec![
            Ok(Event::Init),
            Ok(Event::InitApply(service("web", &["lb1.example.com", "lb2.example.com"]))),
            Ok(Event::InitDone),
            Ok(Event::Apply(service("web", &["lb1.example.com"]))),
            Ok(Event::Apply(service("api", &["lb9.example.com"]))),
            Ok(Event::Delete(service("api", &["lb9.example.com"]))),
        ];

        run(stream::iter(events), &dispatcher, Duration::from_secs(1800))
            .await
            .unwrap();
        dispatcher.shutdown().await;

        let records = provider.records(DOMAIN);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "web.svc.prod");
        assert_eq!(records[0].target, "lb1.example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_resyncs_periodically() {
        let provider = Arc::new(MemoryProvider::new());
        let dispatcher = dispatcher(&provider);
        let events: Vec<Result<Event<Service>, watcher::Error>> =
            vec![Ok(Event::Apply(service("web", &["lb1.example.com"])))];
        let stream = stream::iter(events).chain(stream::pending());

        let result = tokio::time::timeout(
            Duration::from_secs(65),
            run(stream, &dispatcher, Duration::from_secs(30)),
        )
        .await;
        assert!(result.is_err(), "watch only ends with its stream");
        dispatcher.shutdown().await;

        // One list for the initial add, one per resync at 30s and 60s
        assert_eq!(provider.list_calls(), 3);
        assert_eq!(provider.create_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_repairs_drift() {
        let provider = Arc::new(MemoryProvider::new());
        let dispatcher = dispatcher(&provider);
        let events: Vec<Result<Event<Service>, watcher::Error>> =
            vec![Ok(Event::Apply(service("web", &["lb1.example.com"])))];
        let stream = stream::iter(events).chain(stream::pending());

        let watch = run(stream, &dispatcher, Duration::from_secs(30));
        let drift = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            for record in provider.records(DOMAIN) {
                crate::provider::DnsProvider::delete_record(provider.as_ref(), DOMAIN, &record.id)
                    .await
                    .unwrap();
            }
            tokio::time::sleep(Duration::from_secs(25)).await;
        };
        tokio::select! {
            _ = watch => panic!("watch ended early"),
            () = drift => {}
        }
        dispatcher.shutdown().await;

        assert_eq!(provider.records(DOMAIN).len(), 1);
        assert_eq!(provider.create_calls(), 2);
    }
}

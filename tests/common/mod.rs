// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use k8s_openapi::api::core::v1::{Namespace, Service};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::client::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use svc2dns::provider::memory::MemoryProvider;
use svc2dns::reconciler::Reconciler;
use svc2dns::retry::RetryPolicy;
use svc2dns::service::ServiceDescriptor;
use svc2dns::template::Template;
use tokio::time::sleep;

pub const DOMAIN: &str = "example.com";
pub const DEFAULT_TEMPLATE: &str = "{{.Service.Name}}.svc.{{.Service.Namespace}}";

/// Build a reconciler over an in-memory provider
pub fn memory_reconciler(
    provider: &Arc<MemoryProvider>,
    template: &str,
    timeout: Duration,
) -> Arc<Reconciler> {
    Arc::new(Reconciler::new(
        provider.clone(),
        DOMAIN,
        Template::parse(template).expect("test template must parse"),
        RetryPolicy::new(timeout),
    ))
}

/// Descriptor of a `LoadBalancer` service with the given hostnames
pub fn lb_descriptor(namespace: &str, name: &str, hostnames: &[&str]) -> ServiceDescriptor {
    hostnames.iter().fold(
        ServiceDescriptor::new(namespace, name).with_port(80),
        |svc, hostname| svc.with_hostname(*hostname),
    )
}

/// Kubernetes `Service` object of type `LoadBalancer` with the given hostnames
pub fn lb_service(namespace: &str, name: &str, hostnames: &[&str]) -> Service {
    let ingress: Vec<_> = hostnames.iter().map(|h| json!({ "hostname": h })).collect();
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": name, "namespace": namespace },
        "spec": {
            "type": "LoadBalancer",
            "ports": [{ "name": "http", "port": 80, "protocol": "TCP" }]
        },
        "status": { "loadBalancer": { "ingress": ingress } }
    }))
    .expect("valid Service JSON")
}

/// Sorted `name -> target` pairs held by the provider
pub fn record_pairs(provider: &MemoryProvider) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = provider
        .records(DOMAIN)
        .into_iter()
        .map(|r| (r.name, r.target))
        .collect();
    pairs.sort();
    pairs
}

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Create a test namespace
pub async fn create_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let ns = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "labels": {
                "test": "integration",
                "managed-by": "svc2dns-test"
            }
        }
    }))?;

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {
            println!("Created test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            println!("Test namespace already exists: {name}");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Cleanup test namespace
pub async fn cleanup_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            println!("Deleted test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            println!("Test namespace already deleted: {name}");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Create a `LoadBalancer` service and publish `hostnames` in its status
pub async fn create_lb_service(
    client: &Client,
    namespace: &str,
    name: &str,
    hostnames: &[&str],
) -> Result<(), Box<dyn std::error::Error>> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);

    let mut service = lb_service(namespace, name, hostnames);
    let status = service.status.take();
    services.create(&PostParams::default(), &service).await?;

    // Status is ignored on create; set it the way a load balancer controller would
    let patch = json!({ "status": status });
    services
        .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    println!("Created Service: {namespace}/{name} with hostnames {hostnames:?}");
    Ok(())
}

/// Delete a service
pub async fn delete_service(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    services.delete(name, &DeleteParams::default()).await?;
    println!("Deleted Service: {namespace}/{name}");
    Ok(())
}

/// Poll `condition` every 250ms until it holds or `timeout` passes
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(250)).await;
    }
    condition()
}

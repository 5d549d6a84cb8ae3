// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Point-in-time view of a Kubernetes `Service`.
//!
//! A [`ServiceDescriptor`] is everything the reconciler needs to know about a
//! service: its identity, its labels (for the naming template), its declared
//! ports and the external endpoints assigned by the load-balancing layer.
//! Descriptors are built from watch events and never persisted.

use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// A port declared on a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePort {
    /// Optional port name
    pub name: Option<String>,
    /// Protocol (`TCP`, `UDP`, `SCTP`)
    pub protocol: String,
    /// Port number
    pub port: i32,
}

/// Immutable snapshot of a service at reconciliation time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceDescriptor {
    /// Namespace of the service
    pub namespace: String,
    /// Name of the service
    pub name: String,
    /// Labels attached to the service
    pub labels: BTreeMap<String, String>,
    /// Declared ports
    pub ports: Vec<ServicePort>,
    /// Service type (`ClusterIP`, `NodePort`, `LoadBalancer`, `ExternalName`)
    pub service_type: String,
    /// Hostnames from `status.loadBalancer.ingress[].hostname`, in API order
    pub external_hostnames: Vec<String>,
    /// IPs from `status.loadBalancer.ingress[].ip`, in API order
    pub external_ips: Vec<String>,
}

impl ServiceDescriptor {
    /// Create a descriptor with only an identity.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            service_type: "ClusterIP".to_string(),
            ..Self::default()
        }
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add a TCP port.
    #[must_use]
    pub fn with_port(mut self, port: i32) -> Self {
        self.ports.push(ServicePort {
            name: None,
            protocol: "TCP".to_string(),
            port,
        });
        self
    }

    /// Add a load balancer hostname and mark the service as `LoadBalancer`.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.service_type = "LoadBalancer".to_string();
        self.external_hostnames.push(hostname.into());
        self
    }

    /// Stable identifier of the service, `namespace/name`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Whether the load-balancing layer has assigned any external address yet.
    ///
    /// Services without one are in a normal transient state (load balancer still
    /// provisioning, or not a `LoadBalancer` service at all).
    #[must_use]
    pub fn has_external_address(&self) -> bool {
        !self.external_hostnames.is_empty() || !self.external_ips.is_empty()
    }
}

impl From<&Service> for ServiceDescriptor {
    fn from(service: &Service) -> Self {
        let spec = service.spec.as_ref();

        let ports = spec
            .and_then(|s| s.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| ServicePort {
                        name: p.name.clone(),
                        protocol: p.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
                        port: p.port,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let ingress = service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref());

        let mut external_hostnames = Vec::new();
        let mut external_ips = Vec::new();
        for entry in ingress.into_iter().flatten() {
            if let Some(hostname) = entry.hostname.as_ref().filter(|h| !h.is_empty()) {
                external_hostnames.push(hostname.clone());
            }
            if let Some(ip) = entry.ip.as_ref().filter(|ip| !ip.is_empty()) {
                external_ips.push(ip.clone());
            }
        }

        Self {
            namespace: service.namespace().unwrap_or_default(),
            name: service.name_any(),
            labels: service.labels().clone(),
            ports,
            service_type: spec
                .and_then(|s| s.type_.clone())
                .unwrap_or_else(|| "ClusterIP".to_string()),
            external_hostnames,
            external_ips,
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod service_tests;

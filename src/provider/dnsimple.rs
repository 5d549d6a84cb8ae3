// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNSimple v1 HTTP API client.
//!
//! Only the three record endpoints the reconciler needs are implemented:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list      | `GET /v1/domains/{domain}/records?name={name}&type={type}` |
//! | create    | `POST /v1/domains/{domain}/records` |
//! | delete    | `DELETE /v1/domains/{domain}/records/{id}` |
//!
//! Authentication uses the `X-DNSimple-Token: {email}:{token}` header.
//!
//! The client does not retry on its own; failed writes are retried by the
//! mutation executor under its deadline.

use super::DnsProvider;
use crate::constants::{DNSIMPLE_TOKEN_HEADER, PROVIDER_HTTP_TIMEOUT_SECS};
use crate::errors::ProviderError;
use crate::records::{ActualRecord, DesiredRecord, RecordKind};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

/// A record as exchanged with the DNSimple API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct WireRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    name: String,
    record_type: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
}

/// DNSimple wraps every record in a `{"record": ...}` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RecordEnvelope {
    record: WireRecord,
}

impl WireRecord {
    fn into_actual(self, url: &Url) -> Result<ActualRecord, ProviderError> {
        let id = self.id.ok_or_else(|| ProviderError::Decode {
            url: url.to_string(),
            reason: format!("record {} has no id", self.name),
        })?;
        Ok(ActualRecord {
            id: id.to_string(),
            name: self.name,
            kind: RecordKind::from_wire(&self.record_type),
            target: self.content,
        })
    }
}

/// Normalize a configured API address into a base URL.
///
/// Adds `http://` when no scheme is given and strips trailing slashes, so
/// `localhost:8080/` becomes `http://localhost:8080`.
#[must_use]
pub fn build_api_url(server: &str) -> String {
    if server.starts_with("http://") || server.starts_with("https://") {
        server.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", server.trim_end_matches('/'))
    }
}

/// [`DnsProvider`] backed by the DNSimple API.
#[derive(Clone)]
pub struct DnsimpleClient {
    client: HttpClient,
    base_url: Url,
    credentials: String,
}

impl std::fmt::Debug for DnsimpleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsimpleClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl DnsimpleClient {
    /// Create a client for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Unavailable`] if the base URL is invalid or the
    /// HTTP client cannot be built.
    pub fn new(base_url: &str, email: &str, token: &str) -> Result<Self, ProviderError> {
        let normalized = build_api_url(base_url);
        let base_url = Url::parse(&normalized).map_err(|e| ProviderError::Unavailable {
            reason: format!("invalid DNSimple API URL {normalized}: {e}"),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Unavailable {
                reason: format!("invalid DNSimple API URL {normalized}: cannot be a base"),
            });
        }

        let client = HttpClient::builder()
            .timeout(Duration::from_secs(PROVIDER_HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Unavailable {
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url,
            credentials: format!("{email}:{token}"),
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// `{base}/v1/domains/{domain}/records[/{id}]`
    fn records_url(&self, domain: &str, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v1", "domains", domain, "records"]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(DNSIMPLE_TOKEN_HEADER, &self.credentials)
            .header(ACCEPT, "application/json")
    }

    /// Send a request and return the body of a 2xx response.
    async fn send(
        &self,
        method: &str,
        url: &Url,
        request: RequestBuilder,
    ) -> Result<String, ProviderError> {
        debug!(method = %method, url = %url, "DNSimple API request");

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Transport {
            url: url.to_string(),
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            error!(
                method = %method,
                url = %url,
                status = %status,
                error = %body,
                "DNSimple API request failed"
            );
            return Err(ProviderError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            method = %method,
            url = %url,
            status = %status,
            response_len = body.len(),
            "DNSimple API request successful"
        );
        Ok(body)
    }

    fn decode<T: serde::de::DeserializeOwned>(url: &Url, body: &str) -> Result<T, ProviderError> {
        serde_json::from_str(body).map_err(|e| ProviderError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl DnsProvider for DnsimpleClient {
    async fn list_records(
        &self,
        domain: &str,
        name: &str,
        kind: &RecordKind,
    ) -> Result<Vec<ActualRecord>, ProviderError> {
        let mut url = self.records_url(domain, None);
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("type", kind.as_str());

        let body = self.send("GET", &url, self.client.get(url.clone())).await?;
        let envelopes: Vec<RecordEnvelope> = Self::decode(&url, &body)?;

        envelopes
            .into_iter()
            .map(|envelope| envelope.record.into_actual(&url))
            .collect()
    }

    async fn create_record(
        &self,
        domain: &str,
        record: &DesiredRecord,
    ) -> Result<ActualRecord, ProviderError> {
        let url = self.records_url(domain, None);
        let payload = RecordEnvelope {
            record: WireRecord {
                id: None,
                name: record.name.clone(),
                record_type: record.kind.as_str().to_string(),
                content: record.target.clone(),
                ttl: None,
            },
        };

        let body = self
            .send("POST", &url, self.client.post(url.clone()).json(&payload))
            .await?;
        let created: RecordEnvelope = Self::decode(&url, &body)?;
        created.record.into_actual(&url)
    }

    async fn delete_record(&self, domain: &str, id: &str) -> Result<(), ProviderError> {
        let url = self.records_url(domain, Some(id));

        match self.send("DELETE", &url, self.client.delete(url.clone())).await {
            Ok(_) => Ok(()),
            Err(ProviderError::Http {
                status: 404,
                ref body,
                ..
            }) if !names_missing_domain(body) => {
                warn!(
                    domain = %domain,
                    id = %id,
                    body = %body,
                    "DNSimple reports record as not found"
                );
                Err(ProviderError::RecordNotFound {
                    domain: domain.to_string(),
                    id: id.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Whether a 404 body blames the domain rather than the record.
fn names_missing_domain(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_ascii_lowercase))
        .is_some_and(|message| message.contains("domain"))
}

#[cfg(test)]
#[path = "dnsimple_tests.rs"]
mod dnsimple_tests;

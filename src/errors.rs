// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for svc2dns.
//!
//! The taxonomy follows how each failure is handled:
//!
//! - [`TemplateError`] - the naming rule cannot be parsed (fatal at startup) or
//!   cannot be rendered for one service (that reconciliation is aborted)
//! - [`ProviderError`] - any failure talking to the DNS provider. Read failures
//!   abort the current reconciliation; write failures are retried
//! - [`MutationTimeoutExceeded`] - a create/delete kept failing until its
//!   deadline. This is the only fatal runtime error
//! - [`ReconcileError`] - what a single reconciliation returns to its caller

use std::time::Duration;
use thiserror::Error;

/// Errors raised while parsing or rendering a naming template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template text is malformed
    #[error("template parse error at offset {offset}: {reason}")]
    Parse {
        /// Byte offset into the template text where parsing failed
        offset: usize,
        /// What was wrong
        reason: String,
    },

    /// The template references a field that a service does not have
    #[error("can't evaluate field {field} in naming template")]
    UndefinedField {
        /// Dotted path of the offending field (e.g. `.Service.Foo`)
        field: String,
    },

    /// A function was called with the wrong kind of arguments
    #[error("error calling {function}: {reason}")]
    BadCall {
        /// Function name (e.g. `index`)
        function: String,
        /// What was wrong
        reason: String,
    },
}

/// Errors that can occur when talking to the DNS provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The HTTP request could not be sent or no response was received
    #[error("HTTP request to {url} failed: {reason}")]
    Transport {
        /// Request URL
        url: String,
        /// Underlying transport error
        reason: String,
    },

    /// The provider answered with a non-success status code
    #[error("provider returned HTTP {status} for {url}: {body}")]
    Http {
        /// Request URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Response body, as returned by the provider
        body: String,
    },

    /// The provider answered with a body that could not be decoded
    #[error("failed to decode provider response from {url}: {reason}")]
    Decode {
        /// Request URL
        url: String,
        /// Decoder error
        reason: String,
    },

    /// The provider is temporarily unable to serve the request
    #[error("provider unavailable: {reason}")]
    Unavailable {
        /// Why the provider refused the call
        reason: String,
    },

    /// A record targeted by a delete does not exist
    #[error("record {id} not found in domain {domain}")]
    RecordNotFound {
        /// Zone the record was expected in
        domain: String,
        /// Provider record identifier
        id: String,
    },
}

impl ProviderError {
    /// Short label used for metrics and structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Http { .. } => "http",
            Self::Decode { .. } => "decode",
            Self::Unavailable { .. } => "unavailable",
            Self::RecordNotFound { .. } => "not_found",
        }
    }
}

/// A mutation kept failing until its deadline passed.
///
/// The controller can no longer guarantee that the provider matches the cluster,
/// so the process is expected to terminate and rebuild its state on restart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "mutation '{operation}' did not succeed within {timeout:?} after {attempts} attempts: {last_error}"
)]
pub struct MutationTimeoutExceeded {
    /// Human-readable name of the operation (e.g. `create CNAME web.svc.prod -> lb1`)
    pub operation: String,
    /// Deadline the operation was bound to
    pub timeout: Duration,
    /// Number of attempts made
    pub attempts: u32,
    /// Error returned by the last attempt
    pub last_error: String,
}

/// Errors returned by a single reconciliation.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The DNS name of the service could not be rendered
    #[error("failed to resolve DNS name for service {service}: {source}")]
    Template {
        /// `namespace/name` of the service
        service: String,
        /// Render error
        source: TemplateError,
    },

    /// Listing the current records failed
    #[error("failed to list records for {name} in {domain}: {source}")]
    ProviderRead {
        /// Record name that was queried
        name: String,
        /// Zone that was queried
        domain: String,
        /// Provider error
        source: ProviderError,
    },

    /// A create/delete did not succeed before its deadline
    #[error(transparent)]
    MutationTimeout(#[from] MutationTimeoutExceeded),
}

impl ReconcileError {
    /// Whether the process must stop because consistency can no longer be guaranteed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MutationTimeout(_))
    }

    /// Short label used for metrics and structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Template { .. } => "template",
            Self::ProviderRead { .. } => "provider_read",
            Self::MutationTimeout(_) => "mutation_timeout",
        }
    }
}

/// Errors returned when handing an event to the worker pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The worker owning this service has exited
    #[error("worker {worker} has stopped, dropping {event} event for {service}")]
    WorkerStopped {
        /// Index of the worker
        worker: usize,
        /// Event label
        event: &'static str,
        /// `namespace/name` of the service
        service: String,
    },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;

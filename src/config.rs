// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line and environment configuration.
//!
//! Every flag can also be set through an environment variable:
//!
//! | Flag | Environment | Default |
//! |------|-------------|---------|
//! | `--domain` | `SVC2DNS_DOMAIN` | `cluster.local` |
//! | `--timeout` | `SVC2DNS_TIMEOUT` | `10s` |
//! | `--template` | `SVC2DNS_TEMPLATE` | `{{.Service.Name}}.svc.{{.Service.Namespace}}` |
//! | `--email` | `DNSIMPLE_EMAIL` | required |
//! | `--token` | `DNSIMPLE_TOKEN` | required |
//! | `--api-url` | `DNSIMPLE_API_URL` | `https://api.dnsimple.com` |
//! | `--workers` | `SVC2DNS_WORKERS` | `4` |
//! | `--resync` | `SVC2DNS_RESYNC` | `30m` |
//! | `--metrics-addr` | `SVC2DNS_METRICS_ADDR` | disabled |
//! | `--kubeconfig` | `SVC2DNS_KUBECONFIG` | inferred |
//! | `--kube-master-url` | `SVC2DNS_KUBE_MASTER_URL` | from kubeconfig |
//!
//! Without `--kubeconfig` or `--kube-master-url` the Kubernetes connection is
//! inferred: `KUBECONFIG` or `~/.kube/config`, then the in-cluster service
//! account.

use crate::constants::{
    DEFAULT_DNSIMPLE_API_URL, DEFAULT_DOMAIN, DEFAULT_MUTATION_TIMEOUT_SECS,
    DEFAULT_NAME_TEMPLATE, DEFAULT_RESYNC_PERIOD_SECS, DEFAULT_WORKER_COUNT,
};
use crate::template::Template;
use anyhow::{bail, Context, Result};
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Keeps DNSimple CNAME records in sync with Kubernetes Service load balancers.
#[derive(Parser, Clone)]
#[command(name = "svc2dns")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// DNSimple zone the records are managed in
    #[arg(long, env = "SVC2DNS_DOMAIN", default_value = DEFAULT_DOMAIN)]
    pub domain: String,

    /// Deadline for each record create/delete, as a duration (e.g. `10s`, `1m30s`)
    #[arg(long, env = "SVC2DNS_TIMEOUT", default_value_t = format!("{DEFAULT_MUTATION_TIMEOUT_SECS}s"))]
    pub timeout: String,

    /// Naming template for the record name
    #[arg(long, env = "SVC2DNS_TEMPLATE", default_value = DEFAULT_NAME_TEMPLATE)]
    pub template: String,

    /// DNSimple account email
    #[arg(long, env = "DNSIMPLE_EMAIL")]
    pub email: String,

    /// DNSimple API token
    #[arg(long, env = "DNSIMPLE_TOKEN", hide_env_values = true)]
    pub token: String,

    /// DNSimple API base URL
    #[arg(long, env = "DNSIMPLE_API_URL", default_value = DEFAULT_DNSIMPLE_API_URL)]
    pub api_url: String,

    /// Number of reconciliation workers
    #[arg(long, env = "SVC2DNS_WORKERS", default_value_t = DEFAULT_WORKER_COUNT)]
    pub workers: usize,

    /// Interval at which every service is reconciled again
    #[arg(long, env = "SVC2DNS_RESYNC", default_value_t = format!("{}m", DEFAULT_RESYNC_PERIOD_SECS / 60))]
    pub resync: String,

    /// Address to serve `/metrics` and `/healthz` on
    #[arg(long, env = "SVC2DNS_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Kubeconfig file to connect with; `--kube-master-url` overrides its server
    #[arg(long, env = "SVC2DNS_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// URL of the Kubernetes API server. Environment variables (`$VAR`, `${VAR}`) are expanded
    #[arg(long, env = "SVC2DNS_KUBE_MASTER_URL")]
    pub kube_master_url: Option<String>,
}

/// Validated runtime settings.
#[derive(Clone)]
pub struct Settings {
    /// Managed DNS zone
    pub domain: String,
    /// Per-mutation deadline
    pub mutation_timeout: Duration,
    /// Parsed naming template
    pub template: Template,
    /// DNSimple API base URL
    pub api_url: String,
    /// DNSimple account email
    pub email: String,
    /// DNSimple API token
    pub token: String,
    /// Worker count
    pub workers: usize,
    /// Resync period
    pub resync_period: Duration,
    /// Metrics listen address
    pub metrics_addr: Option<SocketAddr>,
    /// Explicit kubeconfig file
    pub kubeconfig: Option<PathBuf>,
    /// Kubernetes API server override, already expanded and validated
    pub kube_master_url: Option<Url>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("domain", &self.domain)
            .field("mutation_timeout", &self.mutation_timeout)
            .field("template", &self.template.source())
            .field("api_url", &self.api_url)
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .field("workers", &self.workers)
            .field("resync_period", &self.resync_period)
            .field("metrics_addr", &self.metrics_addr)
            .field("kubeconfig", &self.kubeconfig)
            .field("kube_master_url", &self.kube_master_url.as_ref().map(Url::as_str))
            .finish()
    }
}

impl Args {
    /// Validate the arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the domain, email or token is empty
    /// - the timeout or resync period is not a positive duration
    /// - the naming template does not parse
    /// - zero workers are requested
    /// - the Kubernetes master URL lacks a scheme or host
    pub fn into_settings(self) -> Result<Settings> {
        let domain = self.domain.trim().trim_end_matches('.').to_string();
        if domain.is_empty() {
            bail!("Domain cannot be empty");
        }
        if self.email.trim().is_empty() {
            bail!("DNSimple email cannot be empty");
        }
        if self.token.trim().is_empty() {
            bail!("DNSimple token cannot be empty");
        }
        if self.workers == 0 {
            bail!("At least one worker is required");
        }

        let mutation_timeout = parse_duration(&self.timeout)
            .with_context(|| format!("Invalid --timeout '{}'", self.timeout))?;
        if mutation_timeout.is_zero() {
            bail!("Timeout must be greater than zero");
        }

        let resync_period = parse_duration(&self.resync)
            .with_context(|| format!("Invalid --resync '{}'", self.resync))?;
        if resync_period.is_zero() {
            bail!("Resync period must be greater than zero");
        }

        let template = Template::parse(&self.template).context("Invalid naming template")?;

        let kube_master_url = self
            .kube_master_url
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(expand_master_url)
            .transpose()?;

        Ok(Settings {
            domain,
            mutation_timeout,
            template,
            api_url: self.api_url,
            email: self.email,
            token: self.token,
            workers: self.workers,
            resync_period,
            metrics_addr: self.metrics_addr,
            kubeconfig: self.kubeconfig,
            kube_master_url,
        })
    }
}

impl Settings {
    /// Kubernetes client configuration.
    ///
    /// - `--kube-master-url` alone: that server, without credentials
    /// - `--kubeconfig`: that file, with its server replaced by `--kube-master-url` if given
    /// - neither: [`kube::Config::infer`]
    ///
    /// # Errors
    ///
    /// Returns an error if the kubeconfig cannot be read or loaded, or no
    /// configuration can be inferred.
    pub async fn kube_config(&self) -> Result<kube::Config> {
        let master = self
            .kube_master_url
            .as_ref()
            .map(|url| url.as_str().parse::<http::Uri>())
            .transpose()
            .context("Kubernetes master URL is not a valid URI")?;

        let mut config = match (&self.kubeconfig, master.clone()) {
            (None, Some(master)) => return Ok(kube::Config::new(master)),
            (Some(path), _) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .with_context(|| format!("Failed to load kubeconfig {}", path.display()))?
            }
            (None, None) => kube::Config::infer()
                .await
                .context("Failed to infer Kubernetes configuration")?,
        };

        if let Some(master) = master {
            config.cluster_url = master;
        }
        Ok(config)
    }
}

/// Expand environment variables in a Kubernetes master URL and check that it
/// names a scheme and a host.
///
/// # Errors
///
/// Returns an error if the expanded value is not a URL or has no host.
pub fn expand_master_url(raw: &str) -> Result<Url> {
    let expanded = expand_env(raw);
    let url = Url::parse(&expanded)
        .with_context(|| format!("Failed to parse --kube-master-url '{raw}'"))?;
    if url.host_str().is_none_or(str::is_empty) {
        bail!("Invalid --kube-master-url '{raw}': a scheme and host are required");
    }
    Ok(url)
}

/// Replace `$VAR` and `${VAR}` with the variable's value, or nothing if unset.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, tail) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], &braced[end + 1..]),
                None => ("", after),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            after.split_at(end)
        };

        if name.is_empty() {
            out.push('$');
            rest = after;
        } else {
            out.push_str(&std::env::var(name).unwrap_or_default());
            rest = tail;
        }
    }

    out.push_str(rest);
    out
}

/// Parse a Go-style duration string into a Rust `Duration`.
///
/// A duration is a sequence of decimal numbers, each with a unit suffix:
/// `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` is also accepted.
///
/// # Examples
///
/// ```
/// use svc2dns::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
///
/// assert!(parse_duration("").is_err());
/// assert!(parse_duration("10").is_err());  // Missing unit
/// assert!(parse_duration("10x").is_err()); // Invalid unit
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty, a number is malformed, a unit is
/// missing or unknown, or the value is negative.
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    if duration_str.is_empty() {
        bail!("Duration string cannot be empty");
    }
    if duration_str == "0" {
        return Ok(Duration::ZERO);
    }
    if duration_str.starts_with('-') {
        bail!("Duration '{duration_str}' cannot be negative");
    }

    let mut rest = duration_str.strip_prefix('+').unwrap_or(duration_str);
    let mut total_nanos = 0.0_f64;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .context("Duration must end with a unit (ns, us, ms, s, m or h)")?;
        if number_len == 0 {
            bail!("Expected a number in duration '{duration_str}'");
        }
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number
            .parse()
            .with_context(|| format!("Invalid number '{number}' in duration"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let unit_nanos = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" => NANOS_PER_SECOND,
            "m" => 60.0 * NANOS_PER_SECOND,
            "h" => 3600.0 * NANOS_PER_SECOND,
            _ => bail!(
                "Unsupported duration unit '{unit}'. Use 'ns', 'us', 'ms', 's', 'm' or 'h'"
            ),
        };

        total_nanos += value * unit_nanos;
        rest = tail;
    }

    let total_nanos = total_nanos.round();
    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        bail!("Duration '{duration_str}' is out of range");
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nanos = total_nanos as u64;
    Ok(Duration::from_nanos(nanos))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;

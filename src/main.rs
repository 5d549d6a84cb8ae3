// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use std::sync::Arc;
use svc2dns::{
    config::{Args, Settings},
    constants::WORKER_QUEUE_DEPTH,
    dispatch::Dispatcher,
    metrics,
    provider::dnsimple::DnsimpleClient,
    reconciler::Reconciler,
    retry::RetryPolicy,
    watch,
};
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let settings = Args::parse().into_settings()?;

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("svc2dns-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(settings))
}

fn init_logging() {
    // Format: timestamp file:line LEVEL message
    //
    // Respects RUST_LOG environment variable if set, otherwise defaults to INFO level
    // Example: RUST_LOG=svc2dns=debug svc2dns --email ... --token ...
    //
    // Respects RUST_LOG_FORMAT environment variable for output format
    // Example: RUST_LOG_FORMAT=json svc2dns ...
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(settings: Settings) -> Result<()> {
    init_logging();

    info!(
        domain = %settings.domain,
        template = %settings.template,
        timeout = ?settings.mutation_timeout,
        workers = settings.workers,
        resync = ?settings.resync_period,
        "Starting svc2dns controller"
    );
    debug!(settings = ?settings, "Resolved settings");

    if let Some(addr) = settings.metrics_addr {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind metrics server to {addr}"))?;
        info!(addr = %addr, "Serving metrics");
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(listener).await {
                error!(error = %e, "Metrics server stopped");
            }
        });
    }

    debug!("Initializing Kubernetes client");
    let kube_config = settings.kube_config().await?;
    info!(master = %kube_config.cluster_url, "Using Kubernetes API server");
    let client = Client::try_from(kube_config).context("Failed to create Kubernetes client")?;
    debug!("Kubernetes client initialized successfully");

    let provider = DnsimpleClient::new(&settings.api_url, &settings.email, &settings.token)
        .context("Failed to create DNSimple client")?;
    debug!(api_url = %provider.base_url(), "DNSimple client created");

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(provider),
        settings.domain.clone(),
        settings.template.clone(),
        RetryPolicy::new(settings.mutation_timeout),
    ));
    let dispatcher = Dispatcher::new(settings.workers, WORKER_QUEUE_DEPTH, reconciler);

    let stream = watch::service_stream(client);

    // The watch never ends on its own; a fatal reconciliation error or a signal stops the process
    tokio::select! {
        result = watch::run(stream, &dispatcher, settings.resync_period) => {
            error!("CRITICAL: Service watch exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Service watch exited unexpectedly without error")
        }
        fatal = dispatcher.fatal() => {
            match fatal {
                Some(e) => {
                    error!(error = %e, "CRITICAL: DNS records can no longer be kept consistent, exiting");
                    Err(e).context("Fatal reconciliation error")
                }
                None => anyhow::bail!("All reconciliation workers exited unexpectedly"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received, draining queued events");
            dispatcher.shutdown().await;
            info!("svc2dns stopped");
            Ok(())
        }
    }
}

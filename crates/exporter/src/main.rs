mod classify;
mod config;
mod error;
mod event;
mod metrics;
mod names;
mod rancher;
mod serve;
mod snapshot;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::classify::{Classifier, EVENT_BUFFER};
use crate::config::ExporterConfig;
use crate::metrics::sink::CounterSink;
use crate::metrics::ExporterMetrics;
use crate::names::NameCache;
use crate::rancher::client::RancherClient;
use crate::rancher::subscribe::EventIngress;
use crate::state::{ExporterState, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ExporterConfig::load().context("failed to load configuration")?;
    init_tracing(&config);

    info!("starting rancher lifecycle exporter v{}", env!("CARGO_PKG_VERSION"));
    config.validate().context("configuration validation failed")?;

    let metrics = Arc::new(ExporterMetrics::new().context("failed to register metrics")?);
    let client = Arc::new(RancherClient::new(&config).context("failed to build the API client")?);

    let project = client
        .first_project()
        .await
        .context("cannot discover the project")?;
    info!(id = %project.id, name = %project.name, "scoped to project");

    let names = Arc::new(NameCache::new());
    let state: SharedState = Arc::new(ExporterState::new(
        config.clone(),
        Arc::clone(&client),
        Arc::clone(&names),
        Arc::clone(&metrics),
        project.clone(),
    ));

    let sink = CounterSink::new(Arc::clone(&metrics), project.name.clone());

    // Materialize counter rows for everything that already exists and
    // derive the initialization families from current state.
    snapshot::seed(&state, &sink).await;

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let classifier_task = tokio::spawn(Classifier::new(sink, Arc::clone(&names)).run(rx));

    let ingress = EventIngress::new(
        Arc::clone(&client),
        Arc::clone(&names),
        project.id.clone(),
        tx,
        state.shutdown_tx.subscribe(),
    )
    .context("failed to build the event subscription")?;
    let ingress_task = tokio::spawn(ingress.run());

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{}{}", addr, config.metrics_path);

    axum::serve(listener, serve::router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Stop the ingress; its channel sender drops with it, which closes the
    // channel and lets the classifier drain and exit.
    state.shutdown();
    if let Err(e) = ingress_task.await {
        warn!(error = %e, "ingress task aborted");
    }
    if let Err(e) = classifier_task.await {
        warn!(error = %e, "classifier task aborted");
    }

    info!("shut down gracefully");
    Ok(())
}

fn init_tracing(config: &ExporterConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Graceful shutdown signal handler. Listens for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        },
    }
}

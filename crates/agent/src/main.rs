//! Incident Forwarder - streaming log incident agent
//!
//! Follows a log file and turns each appended line into an incident
//! on the collector, attaching a fresh system metrics snapshot that
//! stays accurate inside containers.

use anyhow::Result;
use forwarder_lib::{
    client::{RemoteIncidentClient, STREAMING_SERVICE_NAME},
    detector::ContainerEnvironmentDetector,
    forwarder::StreamingForwarder,
    health::{components, ComponentStatus, HealthRegistry},
    observability::{ForwarderMetrics, StructuredLogger},
    sampler::MetricsSampler,
};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const FORWARDER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting incident-forwarder");

    // Load configuration
    let config = config::ForwarderConfig::load()?;
    info!(
        log_file = %config.log_file,
        dashboard_url = %config.dashboard_url,
        "Forwarder configured"
    );

    // Health registry seeds its fixed component set itself
    let health_registry = HealthRegistry::new();

    // Initialize metrics
    let metrics = ForwarderMetrics::new();

    // Detect the container environment before any sampling
    let container = ContainerEnvironmentDetector::new().detect().await;
    let runtime = container.runtime.to_string();
    metrics.set_runtime(&runtime);

    // Initialize structured logger
    let logger = StructuredLogger::new(STREAMING_SERVICE_NAME);
    logger.log_startup(FORWARDER_VERSION, &runtime);

    // Resolve collector identities up front
    let customer_name = config.effective_customer_name();
    let client = RemoteIncidentClient::connect(
        &config.dashboard_url,
        &customer_name,
        &config.api_key,
    )
    .await?;

    let sampler = MetricsSampler::new(container);

    // Shutdown coordination
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Set up OS signal handlers
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
        }
        let _ = shutdown_tx.send(true);
    });

    let mut forwarder = StreamingForwarder::new(
        &config.log_file,
        Box::new(sampler),
        Arc::new(client),
        shutdown_rx,
    );

    // Create shared application state, the API reads the pipeline state live
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        forwarder.state_receiver(),
    ));

    // Start health and metrics server
    let _api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Mark forwarder as ready once identities are resolved
    health_registry.set_ready(true).await;

    let outcome = forwarder.run().await;
    if let Err(e) = &outcome {
        health_registry
            .set_status(
                components::FORWARDER,
                ComponentStatus::Unhealthy,
                Some(e.to_string()),
            )
            .await;
        error!(error = %e, "Forwarder exited with error");
    }

    logger.log_shutdown("Forward loop ended");
    info!("Shutting down");

    outcome?;
    Ok(())
}

//! # CMS Core
//!
//! Process entry point. Configuration errors abort boot before any secret
//! is used.

use anyhow::{Context, Result};
use cms_runtime::adapters::{InMemoryRefreshStore, InMemoryUserDirectory};
use cms_runtime::{CmsRuntime, RuntimeConfig, ServiceContainer};
use cms_telemetry::{init_telemetry, TelemetryConfig};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Step 1: configuration. Nothing else starts if this fails.
    let config = RuntimeConfig::from_env().context("Failed to load configuration")?;
    if let Err(e) = config.validate() {
        eprintln!("FATAL: {e}");
        return Err(e).context("Configuration rejected");
    }

    // Step 2: logging and metrics
    let telemetry = init_telemetry(TelemetryConfig::from_env())
        .context("Failed to initialize telemetry")?;

    info!("===========================================");
    info!("  CMS Core v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    // Step 3: context and handlers
    let container = ServiceContainer::new(
        config,
        Arc::new(InMemoryUserDirectory::new()),
        Arc::new(InMemoryRefreshStore::new()),
        telemetry.metrics().clone(),
    );
    let mut runtime = CmsRuntime::new(container).context("Failed to register handlers")?;

    // Step 4: sinks and background tasks
    runtime.start();

    // Step 5: module credentials
    match runtime.bootstrap_modules().await {
        Ok(credentials) => info!(modules = credentials.len(), "Bootstrap complete"),
        Err(e) => {
            error!(error = %e, "Bootstrap failed");
            runtime.shutdown().await;
            return Err(e.into());
        }
    }

    info!("CMS core running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    runtime.shutdown().await;
    Ok(())
}

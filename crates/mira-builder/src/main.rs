// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mira build worker binary.
//!
//! Connects to the broker, joins the worker queue group, and processes
//! containerization requests until shut down.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use mira_builder::config::Config;
use mira_builder::worker::Worker;
use mira_common::broker::BrokerClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mira_builder=info,mira_common=info".into()),
        )
        .init();

    info!("Starting Mira build worker");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        broker_url = %config.broker.url,
        workspace_dir = %config.workspace_dir.display(),
        registry_user = %config.registry_user,
        "Configuration loaded"
    );

    let broker = BrokerClient::connect(config.broker.clone()).await?;
    if let Err(e) = broker.ensure_log_stream().await {
        error!(error = %e, "could not ensure durable log stream");
    }

    let worker = Arc::new(Worker::new(broker, &config));
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run().await {
            error!("Worker error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    worker_handle.abort();
    info!("Shutdown complete");

    Ok(())
}

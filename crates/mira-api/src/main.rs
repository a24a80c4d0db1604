// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mira API server binary.
//!
//! Accepts containerization submissions, streams live build logs over
//! WebSockets, serves build/log history from the store, and runs the ingest
//! subscribers that keep the store in sync with broker traffic.

use anyhow::Result;
use tracing::{error, info, warn};

use mira_api::config::Config;
use mira_api::ingest;
use mira_api::paas::PaasClient;
use mira_api::server::{self, AppState};
use mira_common::broker::BrokerClient;
use mira_store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mira_api=info,mira_common=info,mira_store=info".into()),
        )
        .init();

    info!("Starting Mira API");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        listen_addr = %config.listen_addr,
        broker_url = %config.broker.url,
        database = %config.store.database,
        "Configuration loaded"
    );

    let broker = BrokerClient::connect(config.broker.clone()).await?;
    if let Err(e) = broker.ensure_log_stream().await {
        warn!(error = %e, "could not ensure durable log stream");
    }

    // The store is optional: submissions and live streaming still work
    // without it, and the store-backed endpoints report StoreUnavailable.
    let store = match Store::connect(&config.store).await {
        Ok(store) => {
            store.spawn_index_creation();
            Some(store)
        }
        Err(e) => {
            warn!(error = %e, "store unavailable, store-backed endpoints disabled");
            None
        }
    };

    if let Some(ref store) = store {
        ingest::spawn(broker.clone(), store.clone());
    }

    let state = AppState {
        broker,
        store,
        paas: PaasClient::new(config.paas_api_host.clone()),
        public_host: config.public_host.clone(),
    };

    let listen_addr = config.listen_addr;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listen_addr, state).await {
            error!("API server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    server_handle.abort();
    info!("Shutdown complete");

    Ok(())
}

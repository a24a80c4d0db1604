// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Router assembly and shared application state.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tracing::info;

use mira_common::broker::BrokerClient;
use mira_store::{Store, StoreError};

use crate::error::ApiError;
use crate::paas::PaasClient;
use crate::{gateway, handlers};

/// Shared state for all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Broker connection (shared, reconnects transparently).
    pub broker: BrokerClient,
    /// Store handle; `None` when MongoDB was unreachable at startup.
    pub store: Option<Store>,
    /// Downstream PaaS client.
    pub paas: PaasClient,
    /// Externally visible host for building log stream URLs.
    pub public_host: String,
}

impl AppState {
    /// The store handle, or `StoreUnavailable` for store-backed endpoints.
    pub fn store(&self) -> Result<&Store, ApiError> {
        self.store.as_ref().ok_or_else(|| {
            ApiError::Store(StoreError::Unavailable("store handle is absent".to_string()))
        })
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/images/containerize", post(handlers::containerize))
        .route("/logs", get(handlers::query_logs))
        .route("/logs/stats", get(handlers::log_stats))
        .route("/logs/{build_id}", get(gateway::stream_logs))
        .route("/logs/{build_id}/history", get(handlers::log_history))
        .route("/builds", get(handlers::query_builds))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve the API until the process shuts down.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "API server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

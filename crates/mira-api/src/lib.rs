// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mira API - Build Intake and Observation Front-End
//!
//! The API server is the synchronous edge of the build pipeline. It accepts
//! containerization submissions, hands them to build workers over the broker,
//! and exposes every way of watching a build: live WebSocket streaming,
//! durable-stream history, and store-backed queries.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  POST /images/containerize   ┌─────────────────────┐
//! │  Client  │ ───────────────────────────▶ │       Intake        │
//! └──────────┘                              │ validate → publish  │
//!      │                                    └──────────┬──────────┘
//!      │ GET /logs/{id} (WebSocket)                    │ build.requests
//!      ▼                                               ▼
//! ┌─────────────────┐     logs.<id>          ┌──────────────────┐
//! │   Log Gateway   │ ◀───────────────────── │   NATS broker    │
//! └─────────────────┘                        └────────┬─────────┘
//!                                                     │ logs.* / status.*
//! ┌─────────────────┐                                 ▼
//! │ GET /logs,      │                        ┌──────────────────┐
//! │ /builds, /stats │ ◀── MongoDB ◀───────── │ Ingest           │
//! └─────────────────┘                        │ Subscribers      │
//!                                            └──────────────────┘
//! ```
//!
//! # Endpoints
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | POST | `/images/containerize` | Submit a build request |
//! | GET | `/logs/{buildId}` | WebSocket live log stream |
//! | GET | `/logs` | Store-backed log history with filters |
//! | GET | `/logs/{buildId}/history` | Durable-stream log history |
//! | GET | `/logs/stats` | Aggregate log statistics |
//! | GET | `/builds` | Paginated build status listing |
//! | GET | `/health` | Liveness probe |
//!
//! The store is optional at startup: when MongoDB is unreachable the server
//! still accepts submissions and streams live logs, and the store-backed
//! endpoints return `StoreUnavailable`.

#![deny(missing_docs)]

/// Server configuration loaded from environment variables.
pub mod config;

/// API error types with HTTP response mapping.
pub mod error;

/// WebSocket gateway streaming live build logs.
pub mod gateway;

/// HTTP request handlers.
pub mod handlers;

/// Resident subscribers persisting broker traffic into the store.
pub mod ingest;

/// Downstream PaaS client (app-name uniqueness checks).
pub mod paas;

/// Router assembly and shared application state.
pub mod server;

/// Submission validation rules.
pub mod validation;

pub use config::Config;
pub use error::ApiError;
pub use server::AppState;

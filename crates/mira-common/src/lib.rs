// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mira Common - Shared Messaging Layer
//!
//! This crate provides everything both Mira services (the API front-end and
//! the build worker) need to talk to each other over the broker:
//!
//! - [`types`]: the wire data model (build requests, log entries, build status)
//! - [`subjects`]: broker subject constants and builders
//! - [`broker`]: a connection-managed facade over NATS core + JetStream
//! - [`emitter`]: the per-build logger that fans log entries out to live
//!   subscribers, the durable stream, and process stdout
//!
//! # Message Flow
//!
//! ```text
//! ┌───────────┐  build.requests   ┌──────────────┐
//! │  mira-api │ ────────────────▶ │ mira-builder │
//! └───────────┘   (queue group)   └──────┬───────┘
//!       ▲                                │
//!       │  logs.<buildId>                │ BuildLogger
//!       │  status.<buildId>              ▼
//! ┌─────┴─────────────────────────────────────────┐
//! │                  NATS broker                  │
//! │        durable stream MIRA_LOGS (logs.*)      │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Per-subject ordering is FIFO; nothing here assumes exactly-once delivery.

#![deny(missing_docs)]

/// Broker connection facade: publishes, subscriptions, durable log history.
pub mod broker;

/// Per-build logger publishing to the live subject and the durable stream.
pub mod emitter;

/// Broker subject constants and builders.
pub mod subjects;

/// Wire data model shared by all Mira services.
pub mod types;

pub use broker::{BrokerClient, BrokerConfig, BrokerError};
pub use emitter::BuildLogger;
pub use types::{BuildRequest, BuildState, BuildStatus, BuildStep, LogEntry, LogLevel, SourceSpec};

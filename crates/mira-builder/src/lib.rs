// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mira Builder - Build Worker
//!
//! Consumes build requests from the broker work queue and drives the
//! per-build pipeline:
//!
//! ```text
//! build.requests ──▶ source acquisition ──▶ image construction ──▶ deployment
//!  (queue group)      git clone / blob       pack build + publish    PaaS POST
//!                     download + extract
//! ```
//!
//! Every stage reports through the per-build [`BuildLogger`] and the status
//! subject. Requests run concurrently, each on its own task; a stage failure
//! fails that build and never the process.
//!
//! Delivery from the queue group is at-least-once. A duplicate delivery runs
//! a second independent pipeline for the same build ID; the second deploy
//! surfaces as a deployment failure when the PaaS enforces app uniqueness.
//!
//! [`BuildLogger`]: mira_common::emitter::BuildLogger

#![deny(missing_docs)]

/// Worker configuration from environment variables.
pub mod config;

/// PaaS deployment call.
pub mod deploy;

/// Pipeline error taxonomy.
pub mod error;

/// Buildpack image construction via the pack CLI.
pub mod image;

/// Source acquisition: git clone and archive download/extraction.
pub mod source;

/// Queue consumption and pipeline orchestration.
pub mod worker;

pub use config::Config;
pub use error::BuildError;
pub use worker::Worker;

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pipeline error taxonomy.
//!
//! Every stage failure carries its kind and the step it happened in. The
//! `Display` form (`<kind>: <message>`) is what lands in the `failed`
//! status record, so downstream consumers can distinguish kinds without a
//! structured channel.

use thiserror::Error;

use mira_common::types::BuildStep;

/// A build pipeline failure.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Clone or archive download/extraction failed.
    #[error("SourceFetchFailed: {message}")]
    SourceFetch {
        /// Step the failure happened in (`clone` or `download`).
        step: BuildStep,
        /// Failure details.
        message: String,
    },

    /// The buildpack builder returned a non-zero result.
    #[error("ImageBuildFailed: {message}")]
    ImageBuild {
        /// Failure details.
        message: String,
    },

    /// The PaaS rejected the app creation.
    #[error("DeployFailed: {message}")]
    Deploy {
        /// Failure details.
        message: String,
    },
}

impl BuildError {
    /// Source acquisition failure in the given step.
    pub fn source_fetch(step: BuildStep, message: impl Into<String>) -> Self {
        Self::SourceFetch {
            step,
            message: message.into(),
        }
    }

    /// Image construction failure.
    pub fn image_build(message: impl Into<String>) -> Self {
        Self::ImageBuild {
            message: message.into(),
        }
    }

    /// Deployment failure.
    pub fn deploy(message: impl Into<String>) -> Self {
        Self::Deploy {
            message: message.into(),
        }
    }

    /// The pipeline step the failure belongs to.
    pub fn step(&self) -> BuildStep {
        match self {
            Self::SourceFetch { step, .. } => *step,
            Self::ImageBuild { .. } => BuildStep::Build,
            Self::Deploy { .. } => BuildStep::Deploy,
        }
    }

    /// The error kind string.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceFetch { .. } => "SourceFetchFailed",
            Self::ImageBuild { .. } => "ImageBuildFailed",
            Self::Deploy { .. } => "DeployFailed",
        }
    }
}

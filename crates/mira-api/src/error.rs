// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! API error types and their HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use mira_store::StoreError;

/// A single field-level validation failure.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    /// The submission field that failed.
    pub field: &'static str,
    /// Why it failed.
    pub message: String,
}

impl FieldError {
    /// Create a field error.
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Errors surfaced by the API surface.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The submission was malformed or disallowed.
    #[error("validation failed")]
    ValidationFailed(Vec<FieldError>),

    /// An app with the submitted name already exists in the project.
    #[error("app with name '{0}' already exists in project")]
    AppNameTaken(String),

    /// The build request could not be queued.
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// A store-backed endpoint could not reach the store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A call to the downstream PaaS failed for a reason other than a
    /// duplicate app name.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// Log history could not be fetched from the durable stream.
    #[error("failed to retrieve logs: {0}")]
    LogHistory(String),

    /// A query parameter could not be parsed.
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::ValidationFailed(errors) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Validation failed",
                    "validation": errors,
                })),
            )
                .into_response(),
            Self::AppNameTaken(_) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::BrokerUnavailable(ref reason) => {
                error!(reason = %reason, "failed to queue build request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to queue build request" })),
                )
                    .into_response()
            }
            Self::Store(ref e) => {
                error!(error = %e, "store operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Storage service is not available" })),
                )
                    .into_response()
            }
            Self::Upstream(ref reason) => {
                error!(reason = %reason, "upstream request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to validate app name" })),
                )
                    .into_response()
            }
            Self::LogHistory(ref reason) => {
                error!(reason = %reason, "failed to fetch log history");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to retrieve logs" })),
                )
                    .into_response()
            }
        }
    }
}

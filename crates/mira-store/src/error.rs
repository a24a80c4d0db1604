// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for store operations.

use thiserror::Error;

/// Errors surfaced by the persistence adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store handle is absent or the connection could not be established.
    #[error("store is not available: {0}")]
    Unavailable(String),

    /// An operation exceeded its deadline.
    #[error("store operation '{0}' timed out")]
    Timeout(&'static str),

    /// A database operation failed.
    #[error("store operation '{operation}' failed: {reason}")]
    Database {
        /// The operation that failed.
        operation: &'static str,
        /// Error details.
        reason: String,
    },

    /// A stored document could not be decoded.
    #[error("failed to decode stored document: {0}")]
    Decode(String),
}

impl StoreError {
    pub(crate) fn connection(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub(crate) fn database(operation: &'static str, error: mongodb::error::Error) -> Self {
        Self::Database {
            operation,
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            StoreError::Timeout("save_log").to_string(),
            "store operation 'save_log' timed out"
        );
        assert_eq!(
            StoreError::Unavailable("no handle".to_string()).to_string(),
            "store is not available: no handle"
        );
        let err = StoreError::Database {
            operation: "query_logs",
            reason: "cursor died".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "store operation 'query_logs' failed: cursor died"
        );
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mira Store - MongoDB Persistence Adapter
//!
//! Two collections back the read APIs and build history:
//!
//! | Collection | Contents | Write pattern |
//! |---|---|---|
//! | `logs` | One document per log entry | Append-only inserts |
//! | `builds` | One document per build | Upsert keyed by `build_id` |
//!
//! Indexes are created at startup as a background task. Writes carry a 5 s
//! deadline, queries 10 s; persistence is never on the critical build path,
//! so callers treat failures as warnings.

#![deny(missing_docs)]

/// Build status collection operations.
pub mod builds;

/// Document shapes and query filters.
pub mod documents;

/// Error types for store operations.
pub mod error;

/// Log collection operations.
pub mod logs;

use mongodb::bson::doc;
use mongodb::{Client, Database};
use tracing::{error, info};

pub use builds::{BuildFilter, BuildStore};
pub use documents::{BuildDocument, LogDocument, LogFilter, SortOrder};
pub use error::StoreError;
pub use logs::{LevelCount, LogStats, LogStore};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// MongoDB connection string.
    pub uri: String,
    /// Database name.
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "mira".to_string(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `MONGODB_URI`: connection string (default `mongodb://localhost:27017`)
    /// - `MONGODB_DATABASE`: database name (default `mira`)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(uri) = std::env::var("MONGODB_URI") {
            config.uri = uri;
        }
        if let Ok(database) = std::env::var("MONGODB_DATABASE") {
            config.database = database;
        }
        config
    }
}

/// Handle to the Mira document store.
///
/// Cheap to clone; the underlying client is pooled and safe for concurrent
/// use.
#[derive(Debug, Clone)]
pub struct Store {
    logs: LogStore,
    builds: BuildStore,
}

impl Store {
    /// Connect to MongoDB and verify the connection with a ping.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(&config.uri)
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        let database = client.database(&config.database);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        info!(database = %config.database, "connected to store");
        Ok(Self::from_database(&database))
    }

    /// Build a store over an already-connected database handle.
    pub fn from_database(database: &Database) -> Self {
        Self {
            logs: LogStore::new(database),
            builds: BuildStore::new(database),
        }
    }

    /// Log collection operations.
    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    /// Build collection operations.
    pub fn builds(&self) -> &BuildStore {
        &self.builds
    }

    /// Create all indexes in the background.
    ///
    /// Index creation is idempotent and not required for correctness, so a
    /// failure is logged rather than propagated.
    pub fn spawn_index_creation(&self) {
        let logs = self.logs.clone();
        let builds = self.builds.clone();
        tokio::spawn(async move {
            if let Err(e) = logs.create_indexes().await {
                error!(error = %e, "failed to create log indexes");
            }
            if let Err(e) = builds.create_indexes().await {
                error!(error = %e, "failed to create build indexes");
            }
        });
    }
}

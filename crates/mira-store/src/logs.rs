// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Log collection operations: append-only inserts, filtered queries, and
//! aggregate statistics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use serde::Serialize;
use tokio::time::timeout;
use tracing::info;

use mira_common::types::LogEntry;

use crate::documents::{LogDocument, LogFilter, SortOrder};
use crate::error::StoreError;

/// Default page size for log queries.
pub const DEFAULT_LOG_LIMIT: i64 = 100;
/// Maximum page size for log queries.
pub const MAX_LOG_LIMIT: i64 = 1000;

const WRITE_DEADLINE: Duration = Duration::from_secs(5);
const QUERY_DEADLINE: Duration = Duration::from_secs(10);

/// Per-level entry count for statistics, newest-heaviest first.
#[derive(Debug, Clone, Serialize)]
pub struct LevelCount {
    /// Log level.
    pub level: String,
    /// Number of entries at that level.
    pub count: i64,
}

/// Aggregate statistics over the log collection.
#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    /// Total number of stored log entries.
    pub total_logs: u64,
    /// Number of distinct builds with at least one entry.
    pub unique_builds: i64,
    /// Entry counts grouped by level, largest first.
    pub logs_by_level: Vec<LevelCount>,
    /// When the statistics were computed.
    pub generated_at: DateTime<Utc>,
}

/// Operations on the `logs` collection.
#[derive(Clone)]
pub struct LogStore {
    collection: Collection<LogDocument>,
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("collection", &self.collection.name())
            .finish()
    }
}

impl LogStore {
    /// Bind to the `logs` collection of the given database.
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection("logs"),
        }
    }

    /// Create the query indexes.
    ///
    /// Compound `(build_id, timestamp)` serves per-build history;
    /// `(project_id, timestamp)` and `(app_name, timestamp)` serve the
    /// filtered queries.
    pub async fn create_indexes(&self) -> Result<(), StoreError> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "build_id": 1, "timestamp": 1 })
                .options(
                    IndexOptions::builder()
                        .name("build_id_timestamp_idx".to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "project_id": 1, "timestamp": 1 })
                .options(
                    IndexOptions::builder()
                        .name("project_id_timestamp_idx".to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "app_name": 1, "timestamp": 1 })
                .options(
                    IndexOptions::builder()
                        .name("app_name_timestamp_idx".to_string())
                        .build(),
                )
                .build(),
        ];

        timeout(QUERY_DEADLINE, self.collection.create_indexes(indexes))
            .await
            .map_err(|_| StoreError::Timeout("create_log_indexes"))?
            .map_err(|e| StoreError::database("create_log_indexes", e))?;

        info!("log indexes ready");
        Ok(())
    }

    /// Insert a single log entry. Entries are append-only.
    pub async fn save(&self, entry: &LogEntry) -> Result<(), StoreError> {
        let document = LogDocument::from_entry(entry);
        timeout(WRITE_DEADLINE, self.collection.insert_one(&document))
            .await
            .map_err(|_| StoreError::Timeout("save_log"))?
            .map_err(|e| StoreError::database("save_log", e))?;
        Ok(())
    }

    /// Query log entries with filters, pagination, and timestamp sort.
    ///
    /// `page` is clamped to `>= 1`, `limit` to `1..=1000`. Returns the page
    /// of entries plus the total count matching the filter.
    pub async fn query(
        &self,
        filter: &LogFilter,
        page: u64,
        limit: i64,
        sort: SortOrder,
    ) -> Result<(Vec<LogEntry>, u64), StoreError> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_LOG_LIMIT);
        let filter_document = filter.to_document();

        let total = timeout(
            QUERY_DEADLINE,
            self.collection.count_documents(filter_document.clone()),
        )
        .await
        .map_err(|_| StoreError::Timeout("query_logs"))?
        .map_err(|e| StoreError::database("query_logs", e))?;

        let skip = (page - 1) * limit as u64;
        let documents: Vec<LogDocument> = timeout(QUERY_DEADLINE, async {
            let cursor = self
                .collection
                .find(filter_document)
                .sort(doc! { "timestamp": sort.bson_value() })
                .skip(skip)
                .limit(limit)
                .await?;
            cursor.try_collect().await
        })
        .await
        .map_err(|_| StoreError::Timeout("query_logs"))?
        .map_err(|e| StoreError::database("query_logs", e))?;

        let entries = documents.into_iter().map(LogDocument::into_entry).collect();
        Ok((entries, total))
    }

    /// Aggregate statistics: total entries, distinct builds, and per-level
    /// counts (largest first).
    pub async fn stats(&self) -> Result<LogStats, StoreError> {
        let total_logs = timeout(QUERY_DEADLINE, self.collection.count_documents(doc! {}))
            .await
            .map_err(|_| StoreError::Timeout("log_stats"))?
            .map_err(|e| StoreError::database("log_stats", e))?;

        let unique_builds = {
            let pipeline = vec![
                doc! { "$group": { "_id": "$build_id" } },
                doc! { "$count": "unique_builds" },
            ];
            let results = self.aggregate(pipeline, "log_stats").await?;
            results
                .first()
                .map(|d| bson_count(d, "unique_builds"))
                .unwrap_or(0)
        };

        let logs_by_level = {
            let pipeline = vec![
                doc! { "$group": { "_id": "$level", "count": { "$sum": 1 } } },
                doc! { "$sort": { "count": -1 } },
            ];
            self.aggregate(pipeline, "log_stats")
                .await?
                .into_iter()
                .map(|d| LevelCount {
                    level: d.get_str("_id").unwrap_or_default().to_string(),
                    count: bson_count(&d, "count"),
                })
                .collect()
        };

        Ok(LogStats {
            total_logs,
            unique_builds,
            logs_by_level,
            generated_at: Utc::now(),
        })
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        operation: &'static str,
    ) -> Result<Vec<Document>, StoreError> {
        timeout(QUERY_DEADLINE, async {
            let cursor = self.collection.aggregate(pipeline).await?;
            cursor.try_collect().await
        })
        .await
        .map_err(|_| StoreError::Timeout(operation))?
        .map_err(|e| StoreError::database(operation, e))
    }
}

/// Aggregation counts come back as Int32 or Int64 depending on collection
/// size; accept either.
fn bson_count(document: &Document, key: &str) -> i64 {
    match document.get(key) {
        Some(Bson::Int32(n)) => *n as i64,
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) => *n as i64,
        _ => 0,
    }
}

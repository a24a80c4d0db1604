// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Build status collection operations: upsert-by-build-id and filtered
//! listing.

use std::time::Duration;

use futures::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use tokio::time::timeout;
use tracing::info;

use mira_common::types::BuildStatus;

use crate::documents::{BuildDocument, SortOrder};
use crate::error::StoreError;

/// Default page size for build queries.
pub const DEFAULT_BUILD_LIMIT: i64 = 10;
/// Maximum page size for build queries.
pub const MAX_BUILD_LIMIT: i64 = 100;

const WRITE_DEADLINE: Duration = Duration::from_secs(5);
const QUERY_DEADLINE: Duration = Duration::from_secs(10);

/// Filter for build listings; every field is optional and conjunctive.
#[derive(Debug, Clone, Default)]
pub struct BuildFilter {
    /// Match a project.
    pub project_id: Option<String>,
    /// Match an app name.
    pub app_name: Option<String>,
    /// Match a lifecycle state (`pending|running|completed|failed`).
    pub status: Option<String>,
}

impl BuildFilter {
    /// Render the filter as a MongoDB query document.
    pub fn to_document(&self) -> Document {
        let mut filter = Document::new();
        if let Some(ref project_id) = self.project_id {
            filter.insert("project_id", project_id);
        }
        if let Some(ref app_name) = self.app_name {
            filter.insert("app_name", app_name);
        }
        if let Some(ref status) = self.status {
            filter.insert("status", status);
        }
        filter
    }
}

/// Operations on the `builds` collection.
#[derive(Clone)]
pub struct BuildStore {
    collection: Collection<BuildDocument>,
}

impl std::fmt::Debug for BuildStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildStore")
            .field("collection", &self.collection.name())
            .finish()
    }
}

impl BuildStore {
    /// Bind to the `builds` collection of the given database.
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection("builds"),
        }
    }

    /// Create the listing indexes plus the unique `build_id` key.
    pub async fn create_indexes(&self) -> Result<(), StoreError> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "build_id": 1 })
                .options(
                    IndexOptions::builder()
                        .name("build_id_idx".to_string())
                        .unique(true)
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "project_id": 1, "created_at": -1 })
                .options(
                    IndexOptions::builder()
                        .name("project_id_created_at_idx".to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "app_name": 1, "created_at": -1 })
                .options(
                    IndexOptions::builder()
                        .name("app_name_created_at_idx".to_string())
                        .build(),
                )
                .build(),
        ];

        timeout(QUERY_DEADLINE, self.collection.create_indexes(indexes))
            .await
            .map_err(|_| StoreError::Timeout("create_build_indexes"))?
            .map_err(|e| StoreError::database("create_build_indexes", e))?;

        info!("build indexes ready");
        Ok(())
    }

    /// Upsert a build status keyed by `build_id`.
    ///
    /// `updated_at` is refreshed on every write; `created_at` is set only on
    /// first insert.
    pub async fn save(&self, status: &BuildStatus) -> Result<(), StoreError> {
        let update = doc! {
            "$set": BuildDocument::update_document(status),
            "$setOnInsert": { "created_at": BsonDateTime::now() },
        };
        timeout(
            WRITE_DEADLINE,
            self.collection
                .update_one(doc! { "build_id": &status.build_id }, update)
                .upsert(true),
        )
        .await
        .map_err(|_| StoreError::Timeout("save_build_status"))?
        .map_err(|e| StoreError::database("save_build_status", e))?;
        Ok(())
    }

    /// Fetch a single build by its identifier.
    pub async fn get(&self, build_id: &str) -> Result<Option<BuildStatus>, StoreError> {
        let document = timeout(
            QUERY_DEADLINE,
            self.collection.find_one(doc! { "build_id": build_id }),
        )
        .await
        .map_err(|_| StoreError::Timeout("get_build"))?
        .map_err(|e| StoreError::database("get_build", e))?;
        Ok(document.map(BuildDocument::into_status))
    }

    /// List builds with filters and pagination, sorted by creation time.
    ///
    /// `page` is clamped to `>= 1`, `limit` to `1..=100`. Returns the page of
    /// statuses plus the total count matching the filter.
    pub async fn query(
        &self,
        filter: &BuildFilter,
        page: u64,
        limit: i64,
        sort: SortOrder,
    ) -> Result<(Vec<BuildStatus>, u64), StoreError> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_BUILD_LIMIT);
        let filter_document = filter.to_document();

        let total = timeout(
            QUERY_DEADLINE,
            self.collection.count_documents(filter_document.clone()),
        )
        .await
        .map_err(|_| StoreError::Timeout("query_builds"))?
        .map_err(|e| StoreError::database("query_builds", e))?;

        let skip = (page - 1) * limit as u64;
        let documents: Vec<BuildDocument> = timeout(QUERY_DEADLINE, async {
            let cursor = self
                .collection
                .find(filter_document)
                .sort(doc! { "created_at": sort.bson_value() })
                .skip(skip)
                .limit(limit)
                .await?;
            cursor.try_collect().await
        })
        .await
        .map_err(|_| StoreError::Timeout("query_builds"))?
        .map_err(|e| StoreError::database("query_builds", e))?;

        let statuses = documents
            .into_iter()
            .map(BuildDocument::into_status)
            .collect();
        Ok((statuses, total))
    }
}

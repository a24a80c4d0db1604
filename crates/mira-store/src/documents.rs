// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Document shapes stored in MongoDB and the filters used to query them.
//!
//! Documents carry `created_at`/`updated_at` maintained by the adapter in
//! addition to the wire fields. Timestamps are native BSON datetimes so the
//! compound indexes sort correctly.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use serde::{Deserialize, Serialize};

use mira_common::types::{BuildState, BuildStatus, BuildStep, LogEntry, LogLevel};

/// Sort direction for timestamp/creation ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first.
    Asc,
    /// Newest first.
    Desc,
}

impl SortOrder {
    /// Parse a query-string value; anything other than `desc` means
    /// ascending when `default` is [`SortOrder::Asc`], and vice versa.
    pub fn parse(value: Option<&str>, default: SortOrder) -> SortOrder {
        match value {
            Some("asc") => SortOrder::Asc,
            Some("desc") => SortOrder::Desc,
            _ => default,
        }
    }

    /// BSON sort value (1 ascending, -1 descending).
    pub fn bson_value(&self) -> i32 {
        match self {
            SortOrder::Asc => 1,
            SortOrder::Desc => -1,
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// A log entry as stored in the `logs` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogDocument {
    /// Mongo object ID.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Build the entry belongs to.
    pub build_id: String,
    /// Project association, when known at ingest time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// App name association, when known at ingest time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    /// Severity.
    pub level: LogLevel,
    /// Log text.
    pub message: String,
    /// Emission time.
    pub timestamp: BsonDateTime,
    /// Pipeline step, when stage-specific.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<BuildStep>,
    /// When the document was inserted.
    pub created_at: BsonDateTime,
    /// Last modification time (equals `created_at`; entries are immutable).
    pub updated_at: BsonDateTime,
}

impl LogDocument {
    /// Build a document from a wire entry.
    pub fn from_entry(entry: &LogEntry) -> Self {
        let now = BsonDateTime::now();
        Self {
            id: None,
            build_id: entry.build_id.clone(),
            project_id: None,
            app_name: None,
            level: entry.level,
            message: entry.message.clone(),
            timestamp: BsonDateTime::from_chrono(entry.timestamp),
            step: entry.step,
            created_at: now,
            updated_at: now,
        }
    }

    /// Convert back to the wire shape.
    pub fn into_entry(self) -> LogEntry {
        LogEntry {
            build_id: self.build_id,
            level: self.level,
            message: self.message,
            timestamp: self.timestamp.to_chrono(),
            step: self.step,
        }
    }
}

/// Filter for log queries; every field is optional and conjunctive.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Match a single build.
    pub build_id: Option<String>,
    /// Match a project.
    pub project_id: Option<String>,
    /// Match an app name.
    pub app_name: Option<String>,
    /// Match a severity.
    pub level: Option<String>,
    /// Match a pipeline step.
    pub step: Option<String>,
    /// Entries at or after this time.
    pub start_date: Option<DateTime<Utc>>,
    /// Entries at or before this time.
    pub end_date: Option<DateTime<Utc>>,
}

impl LogFilter {
    /// Render the filter as a MongoDB query document.
    pub fn to_document(&self) -> Document {
        let mut filter = Document::new();
        if let Some(ref build_id) = self.build_id {
            filter.insert("build_id", build_id);
        }
        if let Some(ref project_id) = self.project_id {
            filter.insert("project_id", project_id);
        }
        if let Some(ref app_name) = self.app_name {
            filter.insert("app_name", app_name);
        }
        if let Some(ref level) = self.level {
            filter.insert("level", level);
        }
        if let Some(ref step) = self.step {
            filter.insert("step", step);
        }
        if self.start_date.is_some() || self.end_date.is_some() {
            let mut range = Document::new();
            if let Some(start) = self.start_date {
                range.insert("$gte", Bson::DateTime(BsonDateTime::from_chrono(start)));
            }
            if let Some(end) = self.end_date {
                range.insert("$lte", Bson::DateTime(BsonDateTime::from_chrono(end)));
            }
            filter.insert("timestamp", range);
        }
        filter
    }
}

/// A build status as stored in the `builds` collection.
///
/// Keyed by `build_id`; upserted on every lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildDocument {
    /// Mongo object ID.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Build identifier (unique).
    pub build_id: String,
    /// Project the app belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// App name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    /// Lifecycle state.
    pub status: BuildState,
    /// When the worker started the pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<BsonDateTime>,
    /// When the build reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<BsonDateTime>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Produced image tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    /// When the document was first inserted.
    pub created_at: BsonDateTime,
    /// When the document was last upserted.
    pub updated_at: BsonDateTime,
}

impl BuildDocument {
    /// Convert back to the wire shape.
    pub fn into_status(self) -> BuildStatus {
        BuildStatus {
            build_id: self.build_id,
            project_id: self.project_id,
            app_name: self.app_name,
            status: self.status,
            started_at: self.started_at.map(|t| t.to_chrono()),
            completed_at: self.completed_at.map(|t| t.to_chrono()),
            error: self.error,
            image_name: self.image_name,
        }
    }

    /// The `$set` document applied on upsert for a status transition.
    pub fn update_document(status: &BuildStatus) -> Document {
        let mut set = doc! {
            "status": status.status.as_str(),
            "updated_at": BsonDateTime::now(),
        };
        if let Some(ref project_id) = status.project_id {
            set.insert("project_id", project_id);
        }
        if let Some(ref app_name) = status.app_name {
            set.insert("app_name", app_name);
        }
        if let Some(started_at) = status.started_at {
            set.insert("started_at", BsonDateTime::from_chrono(started_at));
        }
        if let Some(completed_at) = status.completed_at {
            set.insert("completed_at", BsonDateTime::from_chrono(completed_at));
        }
        if let Some(ref error) = status.error {
            set.insert("error", error);
        }
        if let Some(ref image_name) = status.image_name {
            set.insert("image_name", image_name);
        }
        set
    }
}

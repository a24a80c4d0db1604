// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Broker subject constants and builders.
//!
//! Three subject families exist: the shared work queue for build requests,
//! and per-build subjects for status updates and log entries.

/// Work queue subject for containerization build requests.
pub const BUILD_REQUESTS: &str = "build.requests";

/// Queue group shared by build workers (competing consumers).
pub const WORKER_QUEUE_GROUP: &str = "build-workers";

/// Durable stream holding every log subject.
pub const LOG_STREAM_NAME: &str = "MIRA_LOGS";

/// Wildcard matching all per-build log subjects.
pub const LOGS_WILDCARD: &str = "logs.*";

/// Wildcard matching all per-build status subjects.
pub const STATUS_WILDCARD: &str = "status.*";

/// Subject for log entries of a specific build.
pub fn build_logs(build_id: &str) -> String {
    format!("logs.{build_id}")
}

/// Subject for status updates of a specific build.
pub fn build_status(build_id: &str) -> String {
    format!("status.{build_id}")
}

/// Extract the build ID from a per-build subject (`logs.<id>` or `status.<id>`).
///
/// Returns `None` for the queue subject and anything else without a
/// single-token suffix.
pub fn build_id_from_subject(subject: &str) -> Option<&str> {
    let id = subject
        .strip_prefix("logs.")
        .or_else(|| subject.strip_prefix("status."))?;
    if id.is_empty() || id.contains('.') {
        return None;
    }
    Some(id)
}

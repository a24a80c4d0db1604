// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP request handlers: build intake and the read-only history APIs.

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mira_common::types::{BuildRequest, BuildStatus, SourceSpec};
use mira_store::builds::DEFAULT_BUILD_LIMIT;
use mira_store::documents::SortOrder;
use mira_store::logs::DEFAULT_LOG_LIMIT;
use mira_store::{BuildFilter, LogFilter};

use crate::error::ApiError;
use crate::server::AppState;
use crate::validation::ContainerizeRequest;

/// Upper bound on waiting for the queue publish before responding
/// optimistically; a later failure only shows up on the status subject.
const PUBLISH_WAIT: Duration = Duration::from_secs(2);

/// Liveness probe.
pub async fn health() -> &'static str {
    "OK"
}

/// `POST /images/containerize` - validate a submission, assign a build ID,
/// and queue the build request.
pub async fn containerize(
    State(state): State<AppState>,
    Json(body): Json<ContainerizeRequest>,
) -> Result<Json<Value>, ApiError> {
    let errors = body.validate();
    if !errors.is_empty() {
        return Err(ApiError::ValidationFailed(errors));
    }

    state
        .paas
        .validate_app_name(&body.name, &body.project_id, &body.access_token)
        .await?;

    let build_id = Uuid::new_v4().to_string();
    let request = BuildRequest {
        id: build_id.clone(),
        name: body.name.clone(),
        source: SourceSpec::Git {
            url: body.repo.clone(),
            branch: None,
            revision: None,
            username: None,
            password: None,
        },
        build_command: body.build_command.clone(),
        output_dir: body.output_directory.clone(),
        project_id: body.project_id.clone(),
        access_token: body.access_token.clone(),
        ssr: body.ssr,
        env: body.env.clone(),
        timestamp: Utc::now(),
    };

    let publish_result = state.broker.publish_request_async(request);
    match tokio::time::timeout(PUBLISH_WAIT, publish_result).await {
        Ok(Ok(Ok(()))) => debug!(build_id = %build_id, "build request queued"),
        // A definitive failure within the bound means no build was created.
        Ok(Ok(Err(e))) => return Err(ApiError::BrokerUnavailable(e.to_string())),
        Ok(Err(_)) | Err(_) => {
            warn!(build_id = %build_id, "publish result pending, responding optimistically");
        }
    }

    // Record the pending status directly; the broker fan-out takes over once
    // a worker picks the build up. Persistence is not on the critical path.
    if let Some(ref store) = state.store
        && let Err(e) = store
            .builds()
            .save(&BuildStatus::pending(&build_id, &body.project_id, &body.name))
            .await
    {
        warn!(build_id = %build_id, error = %e, "failed to record pending status");
    }

    info!(build_id = %build_id, name = %body.name, "build submission accepted");

    Ok(Json(json!({
        "message": "Image generation started",
        "data": {
            "name": body.name,
            "build_id": build_id,
            "logs_socket_url": format!("ws://{}/logs/{}", state.public_host, build_id),
            "logs_html_url": format!("http://{}/logs?buildId={}", state.public_host, build_id),
        }
    })))
}

/// Query parameters accepted by `GET /logs`.
///
/// Page and limit are parsed leniently: unparsable values fall back to the
/// defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    /// Filter by build.
    pub build_id: Option<String>,
    /// Filter by project.
    pub project_id: Option<String>,
    /// Filter by app name.
    pub app_name: Option<String>,
    /// Filter by level.
    pub level: Option<String>,
    /// Filter by step.
    pub step: Option<String>,
    /// ISO-8601 lower bound.
    pub start_date: Option<String>,
    /// ISO-8601 upper bound.
    pub end_date: Option<String>,
    /// Page number, 1-based.
    pub page: Option<String>,
    /// Page size.
    pub limit: Option<String>,
    /// `asc` or `desc`.
    pub sort: Option<String>,
}

/// `GET /logs` - store-backed log history with filters and pagination.
pub async fn query_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Value>, ApiError> {
    let store = state.store()?;

    let page = parse_page(query.page.as_deref());
    let limit = parse_limit(query.limit.as_deref(), DEFAULT_LOG_LIMIT, 1000);
    let sort = SortOrder::parse(query.sort.as_deref(), SortOrder::Asc);

    let filter = LogFilter {
        build_id: query.build_id.clone(),
        project_id: query.project_id.clone(),
        app_name: query.app_name.clone(),
        level: query.level.clone(),
        step: query.step.clone(),
        start_date: parse_date(query.start_date.as_deref(), "startDate")?,
        end_date: parse_date(query.end_date.as_deref(), "endDate")?,
    };

    let (logs, total) = store.logs().query(&filter, page, limit, sort).await?;

    let mut response = json!({
        "logs": logs,
        "count": logs.len(),
        "total": total,
        "page": page,
        "limit": limit,
        "pages": total.div_ceil(limit as u64),
        "sort": sort.as_str(),
    });
    echo_filter(&mut response, "build_id", &filter.build_id);
    echo_filter(&mut response, "project_id", &filter.project_id);
    echo_filter(&mut response, "app_name", &filter.app_name);
    echo_filter(&mut response, "level", &filter.level);
    echo_filter(&mut response, "step", &filter.step);
    if let Some(start) = filter.start_date {
        response["start_date"] = json!(start.to_rfc3339());
    }
    if let Some(end) = filter.end_date {
        response["end_date"] = json!(end.to_rfc3339());
    }

    Ok(Json(response))
}

/// `GET /logs/{buildId}/history` - full log history from the durable stream.
pub async fn log_history(
    State(state): State<AppState>,
    Path(build_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let mut logs = state
        .broker
        .fetch_log_history(&build_id)
        .await
        .map_err(|e| ApiError::LogHistory(e.to_string()))?;

    logs.sort_by_key(|entry| entry.timestamp);

    Ok(Json(json!({
        "build_id": build_id,
        "logs": logs,
        "count": logs.len(),
    })))
}

/// `GET /logs/stats` - aggregate statistics over the log collection.
pub async fn log_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stats = state.store()?.logs().stats().await?;
    Ok(Json(serde_json::to_value(stats).unwrap_or_default()))
}

/// Query parameters accepted by `GET /builds`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildQuery {
    /// Filter by project.
    pub project_id: Option<String>,
    /// Filter by app name.
    pub app_name: Option<String>,
    /// Filter by lifecycle state.
    pub status: Option<String>,
    /// Page number, 1-based.
    pub page: Option<String>,
    /// Page size.
    pub limit: Option<String>,
    /// `asc` or `desc`.
    pub sort: Option<String>,
}

/// `GET /builds` - paginated build status listing.
pub async fn query_builds(
    State(state): State<AppState>,
    Query(query): Query<BuildQuery>,
) -> Result<Json<Value>, ApiError> {
    let store = state.store()?;

    let page = parse_page(query.page.as_deref());
    let limit = parse_limit(query.limit.as_deref(), DEFAULT_BUILD_LIMIT, 100);
    let sort = SortOrder::parse(query.sort.as_deref(), SortOrder::Desc);

    let filter = BuildFilter {
        project_id: query.project_id.clone(),
        app_name: query.app_name.clone(),
        status: query.status.clone(),
    };

    let (builds, total) = store.builds().query(&filter, page, limit, sort).await?;

    let mut response = json!({
        "builds": builds,
        "count": builds.len(),
        "total": total,
        "page": page,
        "limit": limit,
        "pages": total.div_ceil(limit as u64),
        "sort": sort.as_str(),
    });
    echo_filter(&mut response, "project_id", &filter.project_id);
    echo_filter(&mut response, "app_name", &filter.app_name);
    echo_filter(&mut response, "status", &filter.status);

    Ok(Json(response))
}

fn parse_page(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.parse::<u64>().ok())
        .filter(|page| *page >= 1)
        .unwrap_or(1)
}

fn parse_limit(raw: Option<&str>, default: i64, max: i64) -> i64 {
    raw.and_then(|v| v.parse::<i64>().ok())
        .filter(|limit| *limit >= 1)
        .unwrap_or(default)
        .min(max)
}

fn parse_date(raw: Option<&str>, field: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    match raw {
        None => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|parsed| Some(parsed.with_timezone(&Utc)))
            .map_err(|_| {
                ApiError::BadRequest(format!(
                    "Invalid {field} format. Use ISO 8601 format (e.g., 2024-01-01T00:00:00Z)"
                ))
            }),
    }
}

fn echo_filter(response: &mut Value, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        response[key] = json!(v);
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire data model shared by all Mira services.
//!
//! Everything here crosses the broker as canonical JSON. Build requests are
//! immutable once published; log entries are append-only; build status rows
//! move through a small state machine and are upserted on every transition.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A containerization request submitted through intake and consumed by a
/// build worker. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    /// Unique build identifier assigned at intake.
    pub id: String,
    /// Name of the produced app (DNS subdomain pattern, max 63 chars).
    pub name: String,
    /// Where the source code comes from.
    pub source: SourceSpec,
    /// Command run by the buildpack to produce the output directory.
    pub build_command: String,
    /// Directory (relative to the source root) holding the built assets.
    pub output_dir: String,
    /// Project the app belongs to at the downstream PaaS.
    pub project_id: String,
    /// Credential used for the deployment call.
    pub access_token: String,
    /// Selects the server-side (Node) builder instead of the static one.
    pub ssr: bool,
    /// User-supplied build/runtime environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// When intake accepted the submission.
    pub timestamp: DateTime<Utc>,
}

/// Source code location for a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSpec {
    /// Clone from a Git repository.
    Git {
        /// Repository URL (http/https).
        url: String,
        /// Branch to check out; remote default when absent.
        #[serde(skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        /// Specific revision to check out after clone.
        #[serde(skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
        /// Username for authenticated clones.
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        /// Password or token for authenticated clones.
        #[serde(skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    /// Download an uploaded archive.
    Blob {
        /// Fetchable URL of the zip archive.
        url: String,
    },
}

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Normal progress output.
    Info,
    /// Stage failures and other errors.
    Error,
    /// Diagnostic detail.
    Debug,
}

impl LogLevel {
    /// Wire representation of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
            Self::Debug => "debug",
        }
    }
}

/// Pipeline stage a log entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStep {
    /// Git clone of the source repository.
    Clone,
    /// Archive download and extraction.
    Download,
    /// Buildpack image construction.
    Build,
    /// Deployment to the downstream PaaS.
    Deploy,
    /// Pre-build validation.
    Validation,
}

impl BuildStep {
    /// Wire representation of the step.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Download => "download",
            Self::Build => "build",
            Self::Deploy => "deploy",
            Self::Validation => "validation",
        }
    }
}

/// A single log line produced during a build.
///
/// The persisted sequence for one `build_id` is monotonically non-decreasing
/// in `timestamp`; entries are never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Build this entry belongs to.
    pub build_id: String,
    /// Severity.
    pub level: LogLevel,
    /// Log text.
    pub message: String,
    /// Wall-clock time of emission (RFC 3339 on the wire).
    pub timestamp: DateTime<Utc>,
    /// Pipeline stage, when the line is stage-specific.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<BuildStep>,
}

impl LogEntry {
    /// Create an entry stamped with the current wall time.
    pub fn now(
        build_id: impl Into<String>,
        level: LogLevel,
        message: impl Into<String>,
        step: Option<BuildStep>,
    ) -> Self {
        Self {
            build_id: build_id.into(),
            level,
            message: message.into(),
            timestamp: Utc::now(),
            step,
        }
    }
}

/// Lifecycle state of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    /// Intake recorded the request but no worker picked it up yet.
    Pending,
    /// A worker is executing the pipeline.
    Running,
    /// Deployment succeeded.
    Completed,
    /// A pipeline stage failed.
    Failed,
}

impl BuildState {
    /// Whether this state absorbs (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// `pending → running`, `running → completed`, `running → failed`; a
    /// terminal state never transitions. Re-asserting the current state is
    /// allowed (upserts are idempotent).
    pub fn can_transition_to(&self, next: BuildState) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Completed | Self::Failed),
            Self::Running => matches!(next, Self::Completed | Self::Failed),
            Self::Completed | Self::Failed => false,
        }
    }

    /// Wire representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for BuildState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown build state: {other}")),
        }
    }
}

/// Current status of a build, published on `status.<buildId>` and upserted
/// into the store on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStatus {
    /// Build identifier (primary key in the store).
    pub build_id: String,
    /// Project the app belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Name of the app being built.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    /// Lifecycle state.
    pub status: BuildState,
    /// When the worker picked the build up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the build reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure description (`<kind>: <message>`), set iff failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fully qualified image tag, set iff completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
}

impl BuildStatus {
    /// Initial status recorded at intake, before a worker picks the build up.
    pub fn pending(
        build_id: impl Into<String>,
        project_id: impl Into<String>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            build_id: build_id.into(),
            project_id: Some(project_id.into()),
            app_name: Some(app_name.into()),
            status: BuildState::Pending,
            started_at: None,
            completed_at: None,
            error: None,
            image_name: None,
        }
    }

    /// Status published when a worker starts the pipeline.
    pub fn running(
        build_id: impl Into<String>,
        project_id: impl Into<String>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            build_id: build_id.into(),
            project_id: Some(project_id.into()),
            app_name: Some(app_name.into()),
            status: BuildState::Running,
            started_at: Some(Utc::now()),
            completed_at: None,
            error: None,
            image_name: None,
        }
    }

    /// Transition into `completed` with the produced image tag.
    pub fn completed(mut self, image_name: impl Into<String>) -> Self {
        self.status = BuildState::Completed;
        self.completed_at = Some(Utc::now());
        self.image_name = Some(image_name.into());
        self.error = None;
        self
    }

    /// Transition into `failed` with the failure description.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = BuildState::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        self.image_name = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_serializes_step_only_when_present() {
        let entry = LogEntry::now("b-1", LogLevel::Info, "hello", None);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"build_id\":\"b-1\""));
        assert!(json.contains("\"level\":\"info\""));
        assert!(!json.contains("step"));

        let entry = LogEntry::now("b-1", LogLevel::Error, "boom", Some(BuildStep::Build));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"step\":\"build\""));
        assert!(json.contains("\"level\":\"error\""));
    }

    #[test]
    fn test_log_entry_timestamp_is_rfc3339() {
        let entry = LogEntry::now("b-1", LogLevel::Info, "hello", None);
        let json = serde_json::to_value(&entry).unwrap();
        let ts = json["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_source_spec_tagging() {
        let git = SourceSpec::Git {
            url: "https://github.com/u/r".to_string(),
            branch: Some("main".to_string()),
            revision: None,
            username: None,
            password: None,
        };
        let json = serde_json::to_string(&git).unwrap();
        assert!(json.contains("\"type\":\"git\""));
        assert!(json.contains("\"branch\":\"main\""));
        assert!(!json.contains("revision"));

        let blob: SourceSpec =
            serde_json::from_str(r#"{"type":"blob","url":"https://x/y.zip"}"#).unwrap();
        assert!(matches!(blob, SourceSpec::Blob { .. }));
    }

    #[test]
    fn test_build_request_round_trip() {
        let request = BuildRequest {
            id: "b-1".to_string(),
            name: "demo-site".to_string(),
            source: SourceSpec::Blob {
                url: "https://x/y.zip".to_string(),
            },
            build_command: "npm run build".to_string(),
            output_dir: "dist".to_string(),
            project_id: "11111111-2222-4333-8444-555555555555".to_string(),
            access_token: "t".repeat(40),
            ssr: false,
            env: HashMap::from([("KEY".to_string(), "value".to_string())]),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"buildCommand\":\"npm run build\""));
        assert!(json.contains("\"outputDir\":\"dist\""));
        let back: BuildRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "demo-site");
        assert_eq!(back.env.get("KEY").map(String::as_str), Some("value"));
    }

    #[test]
    fn test_state_machine_transitions() {
        use BuildState::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Failed));
        // Re-asserting the same state is legal (idempotent upserts).
        assert!(Running.can_transition_to(Running));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!BuildState::Pending.is_terminal());
        assert!(!BuildState::Running.is_terminal());
        assert!(BuildState::Completed.is_terminal());
        assert!(BuildState::Failed.is_terminal());
    }

    #[test]
    fn test_status_constructors_enforce_terminal_fields() {
        let status = BuildStatus::running("b-1", "p-1", "demo");
        assert_eq!(status.status, BuildState::Running);
        assert!(status.started_at.is_some());
        assert!(status.completed_at.is_none());

        let completed = status.clone().completed("user/p-1demo");
        assert_eq!(completed.status, BuildState::Completed);
        assert_eq!(completed.image_name.as_deref(), Some("user/p-1demo"));
        assert!(completed.completed_at.unwrap() >= completed.started_at.unwrap());
        assert!(completed.error.is_none());

        let failed = status.failed("ImageBuildFailed: exit status 1");
        assert_eq!(failed.status, BuildState::Failed);
        assert!(failed.error.is_some());
        assert!(failed.image_name.is_none());
    }

    #[test]
    fn test_status_wire_field_names() {
        let status = BuildStatus::running("b-1", "p-1", "demo").completed("img");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["build_id"], "b-1");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["image_name"], "img");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_build_state_from_str() {
        assert_eq!("running".parse::<BuildState>().unwrap(), BuildState::Running);
        assert!("unknown".parse::<BuildState>().is_err());
    }
}

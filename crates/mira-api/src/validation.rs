// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Submission validation rules.
//!
//! Every rule reports against its wire field name so clients can render
//! per-field messages. All rules run; the result is the full list of
//! failures, not just the first.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::error::FieldError;

/// Kubernetes name limit (DNS subdomain label).
pub const MAX_NAME_LENGTH: usize = 63;
/// Upper bound on the build command.
pub const MAX_BUILD_COMMAND_LENGTH: usize = 500;
/// Upper bound on the output directory path.
pub const MAX_OUTPUT_DIR_LENGTH: usize = 255;
/// Bounds on the deployment access token.
pub const MIN_TOKEN_LENGTH: usize = 10;
/// Upper bound on the deployment access token.
pub const MAX_TOKEN_LENGTH: usize = 500;
/// Maximum number of user environment variables.
pub const MAX_ENV_VAR_COUNT: usize = 50;
/// Upper bound on an environment variable key.
pub const MAX_ENV_VAR_KEY_LENGTH: usize = 100;
/// Upper bound on an environment variable value.
pub const MAX_ENV_VAR_VALUE_LENGTH: usize = 1000;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());
static PROJECT_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-fA-F0-9]{8}-[a-fA-F0-9]{4}-[1-5][a-fA-F0-9]{3}-[89abAB][a-fA-F0-9]{3}-[a-fA-F0-9]{12}$")
        .unwrap()
});
static DANGEROUS_COMMAND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[;&|<>$`\\]").unwrap());
static ENV_KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Git hosts submissions may clone from.
const ALLOWED_GIT_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// JSON body of `POST /images/containerize`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerizeRequest {
    /// Application name (DNS subdomain pattern).
    #[serde(default)]
    pub name: String,
    /// Build command run by the buildpack.
    #[serde(default)]
    pub build_command: String,
    /// Output directory produced by the build command.
    #[serde(default)]
    pub output_directory: String,
    /// Deployment credential.
    #[serde(default)]
    pub access_token: String,
    /// Downstream project UUID.
    #[serde(default)]
    pub project_id: String,
    /// Server-side rendering mode.
    #[serde(default)]
    pub ssr: bool,
    /// User environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Git repository URL.
    #[serde(default)]
    pub repo: String,
}

impl ContainerizeRequest {
    /// Run every validation rule; an empty result means the submission is
    /// acceptable.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if let Some(e) = validate_name(&self.name) {
            errors.push(e);
        }
        if let Some(e) = validate_build_command(&self.build_command) {
            errors.push(e);
        }
        if let Some(e) = validate_output_directory(&self.output_directory) {
            errors.push(e);
        }
        if let Some(e) = validate_access_token(&self.access_token) {
            errors.push(e);
        }
        if let Some(e) = validate_project_id(&self.project_id) {
            errors.push(e);
        }
        if let Some(e) = validate_git_repo(&self.repo) {
            errors.push(e);
        }
        if let Some(e) = validate_env_vars(&self.env) {
            errors.push(e);
        }

        errors
    }
}

fn validate_name(name: &str) -> Option<FieldError> {
    if name.is_empty() {
        return Some(FieldError::new("name", "is required"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Some(FieldError::new(
            "name",
            format!("must be {MAX_NAME_LENGTH} characters or less"),
        ));
    }
    if !NAME_PATTERN.is_match(name) {
        return Some(FieldError::new(
            "name",
            "must contain only lowercase letters, numbers, and hyphens, \
             and start/end with alphanumeric characters",
        ));
    }
    None
}

fn validate_build_command(build_command: &str) -> Option<FieldError> {
    if build_command.is_empty() {
        return Some(FieldError::new("build_command", "is required"));
    }
    if build_command.len() > MAX_BUILD_COMMAND_LENGTH {
        return Some(FieldError::new(
            "build_command",
            format!("must be {MAX_BUILD_COMMAND_LENGTH} characters or less"),
        ));
    }
    if DANGEROUS_COMMAND_PATTERN.is_match(build_command) {
        return Some(FieldError::new(
            "build_command",
            "contains potentially dangerous shell characters",
        ));
    }
    None
}

fn validate_output_directory(output_dir: &str) -> Option<FieldError> {
    if output_dir.is_empty() {
        return Some(FieldError::new("output_directory", "is required"));
    }
    if output_dir.len() > MAX_OUTPUT_DIR_LENGTH {
        return Some(FieldError::new(
            "output_directory",
            format!("must be {MAX_OUTPUT_DIR_LENGTH} characters or less"),
        ));
    }
    let path = std::path::Path::new(output_dir);
    if path.is_absolute() {
        return Some(FieldError::new(
            "output_directory",
            "must be a relative path",
        ));
    }
    if path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Some(FieldError::new(
            "output_directory",
            "cannot contain parent directory references (..)",
        ));
    }
    None
}

fn validate_access_token(token: &str) -> Option<FieldError> {
    if token.is_empty() {
        return Some(FieldError::new("access_token", "is required"));
    }
    if token.len() > MAX_TOKEN_LENGTH {
        return Some(FieldError::new(
            "access_token",
            format!("must be {MAX_TOKEN_LENGTH} characters or less"),
        ));
    }
    if token.trim().len() < MIN_TOKEN_LENGTH {
        return Some(FieldError::new(
            "access_token",
            "appears to be invalid (too short)",
        ));
    }
    None
}

fn validate_project_id(project_id: &str) -> Option<FieldError> {
    if project_id.is_empty() {
        return Some(FieldError::new("project_id", "is required"));
    }
    if !PROJECT_ID_PATTERN.is_match(project_id) {
        return Some(FieldError::new("project_id", "must be a valid UUID"));
    }
    None
}

fn validate_git_repo(repo: &str) -> Option<FieldError> {
    if repo.is_empty() {
        return Some(FieldError::new("repo", "is required"));
    }
    let parsed = match Url::parse(repo) {
        Ok(url) => url,
        Err(_) => return Some(FieldError::new("repo", "must be a valid URL")),
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Some(FieldError::new("repo", "must use http or https protocol"));
    }
    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host,
        _ => return Some(FieldError::new("repo", "must have a valid host")),
    };
    if !ALLOWED_GIT_HOSTS.iter().any(|allowed| host.contains(allowed)) {
        return Some(FieldError::new(
            "repo",
            "must be from a supported git hosting service (GitHub, GitLab, or Bitbucket)",
        ));
    }
    None
}

fn validate_env_vars(env: &HashMap<String, String>) -> Option<FieldError> {
    if env.len() > MAX_ENV_VAR_COUNT {
        return Some(FieldError::new(
            "env",
            format!("cannot have more than {MAX_ENV_VAR_COUNT} environment variables"),
        ));
    }
    for (key, value) in env {
        if key.is_empty() {
            return Some(FieldError::new(
                "env",
                "environment variable keys cannot be empty",
            ));
        }
        if key.len() > MAX_ENV_VAR_KEY_LENGTH {
            return Some(FieldError::new(
                "env",
                format!(
                    "environment variable key '{key}' is too long (max {MAX_ENV_VAR_KEY_LENGTH} characters)"
                ),
            ));
        }
        if value.len() > MAX_ENV_VAR_VALUE_LENGTH {
            return Some(FieldError::new(
                "env",
                format!(
                    "environment variable value for '{key}' is too long (max {MAX_ENV_VAR_VALUE_LENGTH} characters)"
                ),
            ));
        }
        if !ENV_KEY_PATTERN.is_match(key) {
            return Some(FieldError::new(
                "env",
                format!("environment variable key '{key}' contains invalid characters"),
            ));
        }
    }
    None
}

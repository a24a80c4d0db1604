// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Buildpack image construction.
//!
//! Drives the `pack` CLI as a subprocess. The builder/buildpack pair and the
//! base environment depend on the request's `ssr` flag; user-supplied
//! environment variables are merged over the base. Builder stdout is
//! streamed line-by-line into the build's log pipeline.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use mira_common::emitter::BuildLogger;
use mira_common::types::{BuildRequest, BuildStep};

use crate::error::BuildError;

const STATIC_BUILDER: &str = "paketobuildpacks/builder-jammy-base";
const STATIC_BUILDPACK: &str = "paketo-buildpacks/web-servers";
const SSR_BUILDER: &str = "heroku/builder:24";
const SSR_BUILDPACK: &str = "heroku/nodejs";

/// Resolved options for one pack invocation.
///
/// The environment is ordered so the produced argument list is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOptions {
    /// Builder image.
    pub builder: &'static str,
    /// Buildpack applied on top of the builder.
    pub buildpack: &'static str,
    /// Build-time environment (base merged with user variables).
    pub env: BTreeMap<String, String>,
}

impl PackOptions {
    /// Derive pack options from a build request.
    ///
    /// Static sites (`ssr = false`) go through the web-servers buildpack
    /// with the build command and output directory wired in through `BP_*`
    /// variables; server-side builds use the Node builder directly.
    pub fn for_request(request: &BuildRequest) -> Self {
        let mut env = BTreeMap::new();
        let (builder, buildpack) = if request.ssr {
            (SSR_BUILDER, SSR_BUILDPACK)
        } else {
            env.insert("BP_WEB_SERVER".to_string(), "httpd".to_string());
            env.insert(
                "BP_WEB_SERVER_FORCE_HTTPS_REDIRECT".to_string(),
                "false".to_string(),
            );
            env.insert(
                "BP_NODE_RUN_SCRIPTS".to_string(),
                request.build_command.clone(),
            );
            env.insert("BP_WEB_SERVER_ROOT".to_string(), request.output_dir.clone());
            // Single-page apps need push-state routing to serve deep links.
            env.insert(
                "BP_WEB_SERVER_ENABLE_PUSH_STATE".to_string(),
                "true".to_string(),
            );
            env.insert("NODE_ENV".to_string(), "production".to_string());
            (STATIC_BUILDER, STATIC_BUILDPACK)
        };

        // User variables win over the base set.
        for (key, value) in &request.env {
            env.insert(key.clone(), value.clone());
        }

        Self {
            builder,
            buildpack,
            env,
        }
    }

    /// Render the pack CLI argument list for this invocation.
    pub fn to_args(&self, image: &str, source_path: &Path) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            image.to_string(),
            "--path".to_string(),
            source_path.display().to_string(),
            "--builder".to_string(),
            self.builder.to_string(),
            "--buildpack".to_string(),
            self.buildpack.to_string(),
            "--pull-policy".to_string(),
            "if-not-present".to_string(),
            "--publish".to_string(),
        ];
        for (key, value) in &self.env {
            args.push("--env".to_string());
            args.push(format!("{key}={value}"));
        }
        args
    }
}

/// Builds and publishes container images with the pack CLI.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    registry_user: String,
}

impl ImageBuilder {
    /// Create a builder tagging images under the given registry account.
    pub fn new(registry_user: impl Into<String>) -> Self {
        Self {
            registry_user: registry_user.into(),
        }
    }

    /// The image tag produced for a request: `<registry-user>/<projectId><name>`.
    pub fn image_name(&self, request: &BuildRequest) -> String {
        format!(
            "{}/{}{}",
            self.registry_user, request.project_id, request.name
        )
    }

    /// Run the buildpack build and publish the image to the registry.
    ///
    /// Returns the published image tag. Builder stdout becomes `step=build`
    /// log entries; stderr is captured for the failure message.
    pub async fn build(
        &self,
        request: &BuildRequest,
        source_path: &Path,
        logger: &BuildLogger,
    ) -> Result<String, BuildError> {
        logger
            .info_with_step(BuildStep::Build, "Image build process started")
            .await;

        let image = self.image_name(request);
        let options = PackOptions::for_request(request);
        let args = options.to_args(&image, source_path);

        debug!(image = %image, builder = %options.builder, "invoking pack");

        let mut child = Command::new("pack")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BuildError::image_build("pack CLI not found on PATH")
                } else {
                    BuildError::image_build(format!("failed to run pack: {e}"))
                }
            })?;

        // Collect stderr off to the side while stdout streams into the log
        // pipeline; pack interleaves progress on both.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buffer = String::new();
                let _ = stderr.read_to_string(&mut buffer).await;
                buffer
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                logger.info_with_step(BuildStep::Build, line).await;
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| BuildError::image_build(format!("failed to wait for pack: {e}")))?;

        let stderr_output = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(BuildError::image_build(format!(
                "pack exited with {}: {}",
                status,
                tail(&stderr_output, 2000)
            )));
        }

        logger
            .info_with_step(
                BuildStep::Build,
                format!("SUCCESS: Image built successfully: {image}"),
            )
            .await;
        info!(image = %image, "image built and published");
        Ok(image)
    }
}

/// Last `max` bytes of builder stderr, enough to carry the failing step.
fn tail(output: &str, max: usize) -> &str {
    let trimmed = output.trim();
    if trimmed.len() <= max {
        return trimmed;
    }
    let start = trimmed.len() - max;
    // Stay on a char boundary.
    let start = (start..trimmed.len())
        .find(|i| trimmed.is_char_boundary(*i))
        .unwrap_or(start);
    &trimmed[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mira_common::types::SourceSpec;
    use std::collections::HashMap;

    fn request(ssr: bool, env: HashMap<String, String>) -> BuildRequest {
        BuildRequest {
            id: "b-1".to_string(),
            name: "demo-site".to_string(),
            source: SourceSpec::Git {
                url: "https://github.com/u/r".to_string(),
                branch: None,
                revision: None,
                username: None,
                password: None,
            },
            build_command: "npm run build".to_string(),
            output_dir: "dist".to_string(),
            project_id: "p-1".to_string(),
            access_token: "t".repeat(40),
            ssr,
            env,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_image_name() {
        let builder = ImageBuilder::new("mirabuilds");
        assert_eq!(
            builder.image_name(&request(false, HashMap::new())),
            "mirabuilds/p-1demo-site"
        );
    }

    #[test]
    fn test_static_options() {
        let options = PackOptions::for_request(&request(false, HashMap::new()));
        assert_eq!(options.builder, "paketobuildpacks/builder-jammy-base");
        assert_eq!(options.buildpack, "paketo-buildpacks/web-servers");
        assert_eq!(options.env.get("BP_WEB_SERVER").unwrap(), "httpd");
        assert_eq!(options.env.get("BP_NODE_RUN_SCRIPTS").unwrap(), "npm run build");
        assert_eq!(options.env.get("BP_WEB_SERVER_ROOT").unwrap(), "dist");
        assert_eq!(
            options.env.get("BP_WEB_SERVER_ENABLE_PUSH_STATE").unwrap(),
            "true"
        );
        assert_eq!(options.env.get("NODE_ENV").unwrap(), "production");
    }

    #[test]
    fn test_ssr_options() {
        let options = PackOptions::for_request(&request(true, HashMap::new()));
        assert_eq!(options.builder, "heroku/builder:24");
        assert_eq!(options.buildpack, "heroku/nodejs");
        assert!(options.env.is_empty());
    }

    #[test]
    fn test_user_env_wins_over_base() {
        let user_env = HashMap::from([
            ("NODE_ENV".to_string(), "staging".to_string()),
            ("API_URL".to_string(), "https://api.example.com".to_string()),
        ]);
        let options = PackOptions::for_request(&request(false, user_env));
        assert_eq!(options.env.get("NODE_ENV").unwrap(), "staging");
        assert_eq!(options.env.get("API_URL").unwrap(), "https://api.example.com");
    }

    #[test]
    fn test_pack_args() {
        let options = PackOptions::for_request(&request(true, HashMap::new()));
        let args = options.to_args("mirabuilds/p-1demo-site", Path::new("/tmp/src"));
        assert_eq!(
            args,
            vec![
                "build",
                "mirabuilds/p-1demo-site",
                "--path",
                "/tmp/src",
                "--builder",
                "heroku/builder:24",
                "--buildpack",
                "heroku/nodejs",
                "--pull-policy",
                "if-not-present",
                "--publish",
            ]
        );
    }

    #[test]
    fn test_pack_args_include_env() {
        let user_env = HashMap::from([("API_URL".to_string(), "https://x".to_string())]);
        let options = PackOptions::for_request(&request(true, user_env));
        let args = options.to_args("img", Path::new("src"));
        let env_position = args.iter().position(|a| a == "--env").unwrap();
        assert_eq!(args[env_position + 1], "API_URL=https://x");
    }

    #[test]
    fn test_tail_keeps_short_output() {
        assert_eq!(tail("short error", 2000), "short error");
        let long = "x".repeat(3000);
        assert_eq!(tail(&long, 2000).len(), 2000);
    }
}

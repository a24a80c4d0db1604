// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deployment to the downstream PaaS.
//!
//! One call: create an app record pointing at the published image. The PaaS
//! owns scheduling from there; the worker only reports the outcome.

use std::collections::HashMap;

use serde::Serialize;
use tracing::info;

use mira_common::emitter::BuildLogger;
use mira_common::types::{BuildRequest, BuildStep};

use crate::error::BuildError;

/// Port the deployed app listens on. Injected into the app environment as
/// `PORT` and registered with the PaaS.
pub const APP_PORT: u16 = 8080;

/// JSON body of the PaaS app-creation call.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentPayload {
    /// Published image tag.
    pub image: String,
    /// App name.
    pub name: String,
    /// Project the app belongs to.
    pub project_id: String,
    /// Whether the registry image requires credentials.
    pub private_image: bool,
    /// Number of replicas.
    pub replicas: u32,
    /// Container port.
    pub port: u16,
    /// Runtime environment (user variables plus `PORT`).
    pub env_vars: HashMap<String, String>,
}

impl DeploymentPayload {
    /// Build the deployment payload for a request and its published image.
    pub fn for_request(request: &BuildRequest, image: &str) -> Self {
        let mut env_vars = HashMap::from([("PORT".to_string(), APP_PORT.to_string())]);
        for (key, value) in &request.env {
            env_vars.insert(key.clone(), value.clone());
        }

        Self {
            image: image.to_string(),
            name: request.name.clone(),
            project_id: request.project_id.clone(),
            private_image: false,
            replicas: 1,
            port: APP_PORT,
            env_vars,
        }
    }
}

/// Deploys published images to the PaaS.
#[derive(Debug, Clone)]
pub struct Deployer {
    api_host: String,
    http: reqwest::Client,
}

impl Deployer {
    /// Create a deployer rooted at the PaaS API host.
    pub fn new(api_host: impl Into<String>) -> Self {
        Self {
            api_host: api_host.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Create the app record at the PaaS.
    pub async fn deploy(
        &self,
        request: &BuildRequest,
        image: &str,
        logger: &BuildLogger,
    ) -> Result<(), BuildError> {
        logger
            .info_with_step(
                BuildStep::Deploy,
                format!("Deploying image to Crane Cloud: {}", request.name),
            )
            .await;

        let payload = DeploymentPayload::for_request(request, image);
        let url = format!("{}/projects/{}/apps", self.api_host, request.project_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&request.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BuildError::deploy(format!("deployment request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            logger
                .error_with_step(BuildStep::Deploy, "Error deploying image to Crane Cloud")
                .await;
            return Err(BuildError::deploy(format!(
                "deployment request failed with status {status}: {body}"
            )));
        }

        info!(app_name = %request.name, image = %image, "app deployed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mira_common::types::SourceSpec;

    fn request(env: HashMap<String, String>) -> BuildRequest {
        BuildRequest {
            id: "b-1".to_string(),
            name: "demo-site".to_string(),
            source: SourceSpec::Blob {
                url: "https://x/y.zip".to_string(),
            },
            build_command: "npm run build".to_string(),
            output_dir: "dist".to_string(),
            project_id: "p-1".to_string(),
            access_token: "t".repeat(40),
            ssr: false,
            env,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_payload_shape() {
        let payload =
            DeploymentPayload::for_request(&request(HashMap::new()), "mirabuilds/p-1demo-site");
        assert_eq!(payload.image, "mirabuilds/p-1demo-site");
        assert_eq!(payload.name, "demo-site");
        assert_eq!(payload.project_id, "p-1");
        assert!(!payload.private_image);
        assert_eq!(payload.replicas, 1);
        assert_eq!(payload.port, 8080);
        assert_eq!(payload.env_vars.get("PORT").unwrap(), "8080");
    }

    #[test]
    fn test_payload_merges_user_env() {
        let env = HashMap::from([("API_URL".to_string(), "https://x".to_string())]);
        let payload = DeploymentPayload::for_request(&request(env), "img");
        assert_eq!(payload.env_vars.get("API_URL").unwrap(), "https://x");
        assert_eq!(payload.env_vars.get("PORT").unwrap(), "8080");
    }

    #[test]
    fn test_payload_wire_names() {
        let payload = DeploymentPayload::for_request(&request(HashMap::new()), "img");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["image"], "img");
        assert_eq!(json["project_id"], "p-1");
        assert_eq!(json["private_image"], false);
        assert_eq!(json["replicas"], 1);
        assert_eq!(json["port"], 8080);
        assert!(json["env_vars"].is_object());
    }
}

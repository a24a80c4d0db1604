// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the downstream PaaS API.
//!
//! The intake path only needs one call: listing apps under a project to
//! reject duplicate names before a build is queued.

use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;

/// Thin client over the PaaS HTTP API.
#[derive(Debug, Clone)]
pub struct PaasClient {
    base_url: String,
    http: reqwest::Client,
}

impl PaasClient {
    /// Create a client rooted at the PaaS API host.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Check that no app with `app_name` exists under `project_id`.
    ///
    /// Returns [`ApiError::AppNameTaken`] when the PaaS already lists an app
    /// with the same name, [`ApiError::Upstream`] when the PaaS cannot be
    /// queried.
    pub async fn validate_app_name(
        &self,
        app_name: &str,
        project_id: &str,
        access_token: &str,
    ) -> Result<(), ApiError> {
        let url = format!("{}/projects/{}/apps", self.base_url, project_id);

        let response = self
            .http
            .get(&url)
            .query(&[("name", app_name)])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "app listing returned status {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("unparsable app listing: {e}")))?;

        if listing_contains_app(&body, app_name) {
            return Err(ApiError::AppNameTaken(app_name.to_string()));
        }

        debug!(app_name = %app_name, project_id = %project_id, "app name is free");
        Ok(())
    }
}

/// Walk the known response shapes of the app listing and look for an app
/// with the given name.
///
/// The PaaS has returned apps as `{"data": {"apps": [...]}}`,
/// `{"data": {"data": [...]}}`, and `{"data": [...]}` across versions; all
/// three are accepted.
fn listing_contains_app(body: &Value, app_name: &str) -> bool {
    let candidates = [
        body.pointer("/data/apps"),
        body.pointer("/data/data"),
        body.pointer("/data"),
    ];

    for apps in candidates.into_iter().flatten() {
        if let Some(apps) = apps.as_array() {
            let found = apps
                .iter()
                .filter_map(|app| app.get("name").and_then(Value::as_str))
                .any(|name| name == app_name);
            if found {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listing_nested_apps_shape() {
        let body = json!({"data": {"apps": [{"name": "demo-site"}, {"name": "other"}]}});
        assert!(listing_contains_app(&body, "demo-site"));
        assert!(!listing_contains_app(&body, "missing"));
    }

    #[test]
    fn test_listing_nested_data_shape() {
        let body = json!({"data": {"data": [{"name": "demo-site"}]}});
        assert!(listing_contains_app(&body, "demo-site"));
    }

    #[test]
    fn test_listing_flat_array_shape() {
        let body = json!({"data": [{"name": "demo-site"}]});
        assert!(listing_contains_app(&body, "demo-site"));
    }

    #[test]
    fn test_listing_empty_or_odd_shapes() {
        assert!(!listing_contains_app(&json!({}), "demo-site"));
        assert!(!listing_contains_app(&json!({"data": null}), "demo-site"));
        assert!(!listing_contains_app(
            &json!({"data": {"apps": "not-an-array"}}),
            "demo-site"
        ));
    }
}

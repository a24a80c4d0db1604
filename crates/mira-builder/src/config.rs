// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the build worker.

use std::path::PathBuf;
use std::time::Duration;

use mira_common::broker::BrokerConfig;

/// Build worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker connection settings.
    pub broker: BrokerConfig,
    /// Root directory for per-build workspaces (`git/`, `blobs/`, `zip/`).
    pub workspace_dir: PathBuf,
    /// Registry account prefixed onto produced image tags.
    pub registry_user: String,
    /// Root URL of the downstream PaaS API.
    pub paas_api_host: String,
    /// Upper bound on a repository clone.
    pub clone_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `DOCKERHUB_USERNAME`: registry account for image tags
    /// - `CRANECLOUD_API_HOST`: downstream PaaS API root
    ///
    /// Optional (with defaults):
    /// - `MIRA_WORKSPACE_DIR`: workspace root (default: `.mira/workspace`)
    /// - `MIRA_CLONE_TIMEOUT_SECS`: clone bound in seconds (default: 60)
    /// - `NATS_URL`, `MIRA_LOG_STREAM_MAX_AGE_HOURS`, `MIRA_LOG_STREAM_MAX_MSGS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let registry_user = std::env::var("DOCKERHUB_USERNAME")
            .map_err(|_| ConfigError::Missing("DOCKERHUB_USERNAME"))?;

        let paas_api_host = std::env::var("CRANECLOUD_API_HOST")
            .map_err(|_| ConfigError::Missing("CRANECLOUD_API_HOST"))?;

        // Convert to an absolute path so subprocesses see the same root
        // regardless of their working directory.
        let workspace_raw = PathBuf::from(
            std::env::var("MIRA_WORKSPACE_DIR").unwrap_or_else(|_| ".mira/workspace".to_string()),
        );
        let workspace_dir = if workspace_raw.is_absolute() {
            workspace_raw
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&workspace_raw))
                .unwrap_or(workspace_raw)
        };

        let clone_timeout = Duration::from_secs(
            std::env::var("MIRA_CLONE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        );

        Ok(Self {
            broker: BrokerConfig::from_env(),
            workspace_dir,
            registry_user,
            paas_api_host,
            clone_timeout,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("DOCKERHUB_USERNAME", "mirabuilds");
        guard.set("CRANECLOUD_API_HOST", "https://paas.example.com");
        guard.remove("MIRA_WORKSPACE_DIR");
        guard.remove("MIRA_CLONE_TIMEOUT_SECS");

        let config = Config::from_env().unwrap();
        assert_eq!(config.registry_user, "mirabuilds");
        assert_eq!(config.clone_timeout, Duration::from_secs(60));
        assert!(config.workspace_dir.is_absolute());
        assert!(config.workspace_dir.ends_with(".mira/workspace"));
    }

    #[test]
    fn test_config_missing_registry_user() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("DOCKERHUB_USERNAME");
        guard.set("CRANECLOUD_API_HOST", "https://paas.example.com");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("DOCKERHUB_USERNAME"))
        ));
    }

    #[test]
    fn test_config_custom_workspace() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("DOCKERHUB_USERNAME", "mirabuilds");
        guard.set("CRANECLOUD_API_HOST", "https://paas.example.com");
        guard.set("MIRA_WORKSPACE_DIR", "/var/mira/workspace");
        guard.set("MIRA_CLONE_TIMEOUT_SECS", "120");

        let config = Config::from_env().unwrap();
        assert_eq!(config.workspace_dir, PathBuf::from("/var/mira/workspace"));
        assert_eq!(config.clone_timeout, Duration::from_secs(120));
    }
}

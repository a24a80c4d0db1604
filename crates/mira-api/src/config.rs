// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;

use mira_common::broker::BrokerConfig;
use mira_store::StoreConfig;

/// Mira API server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Host clients use to reach this server (for log stream URLs).
    pub public_host: String,
    /// Broker connection settings.
    pub broker: BrokerConfig,
    /// Store connection settings.
    pub store: StoreConfig,
    /// Root URL of the downstream PaaS API.
    pub paas_api_host: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `CRANECLOUD_API_HOST`: downstream PaaS API root
    ///
    /// Optional (with defaults):
    /// - `MIRA_API_PORT`: HTTP port (default: 3000)
    /// - `MIRA_PUBLIC_HOST`: externally visible host (default: `localhost:<port>`)
    /// - `NATS_URL`, `MIRA_LOG_STREAM_MAX_AGE_HOURS`, `MIRA_LOG_STREAM_MAX_MSGS`
    /// - `MONGODB_URI`, `MONGODB_DATABASE`
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = std::env::var("MIRA_API_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("MIRA_API_PORT", "must be a valid port number"))?;

        let public_host =
            std::env::var("MIRA_PUBLIC_HOST").unwrap_or_else(|_| format!("localhost:{port}"));

        let paas_api_host = std::env::var("CRANECLOUD_API_HOST")
            .map_err(|_| ConfigError::Missing("CRANECLOUD_API_HOST"))?;

        Ok(Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            public_host,
            broker: BrokerConfig::from_env(),
            store: StoreConfig::from_env(),
            paas_api_host,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
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

        guard.set("CRANECLOUD_API_HOST", "https://paas.example.com");
        guard.remove("MIRA_API_PORT");
        guard.remove("MIRA_PUBLIC_HOST");

        let config = Config::from_env().unwrap();
        assert_eq!(config.listen_addr.port(), 3000);
        assert_eq!(config.public_host, "localhost:3000");
        assert_eq!(config.paas_api_host, "https://paas.example.com");
        assert_eq!(config.store.database, "mira");
    }

    #[test]
    fn test_config_custom_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("CRANECLOUD_API_HOST", "https://paas.example.com");
        guard.set("MIRA_API_PORT", "8085");
        guard.remove("MIRA_PUBLIC_HOST");

        let config = Config::from_env().unwrap();
        assert_eq!(config.listen_addr.port(), 8085);
        assert_eq!(config.public_host, "localhost:8085");
    }

    #[test]
    fn test_config_missing_paas_host() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("CRANECLOUD_API_HOST");

        let result = Config::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Missing("CRANECLOUD_API_HOST"))
        ));
    }

    #[test]
    fn test_config_invalid_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("CRANECLOUD_API_HOST", "https://paas.example.com");
        guard.set("MIRA_API_PORT", "not_a_port");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Invalid("MIRA_API_PORT", _))));
    }
}

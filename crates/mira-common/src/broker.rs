// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection-managed facade over the NATS broker.
//!
//! Wraps core NATS for live subjects (requests, status, logs) and JetStream
//! for the durable log stream. Publishes retry with exponential backoff;
//! subscriptions are plain streams the caller drains. Nothing here assumes
//! exactly-once delivery - per-subject FIFO is the only ordering guarantee.

use std::time::Duration;

use async_nats::jetstream;
use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::subjects;
use crate::types::{BuildRequest, BuildStatus, LogEntry};

/// Errors surfaced by the broker client.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Initial connection to the broker failed.
    #[error("failed to connect to broker at {url}: {reason}")]
    Connect {
        /// Broker URL the connection was attempted against.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// The connection is currently unhealthy.
    #[error("broker connection is not healthy")]
    NotConnected,

    /// A publish did not succeed within its retry budget.
    #[error("failed to publish on '{subject}' after {attempts} attempts: {reason}")]
    PublishFailed {
        /// Subject the publish targeted.
        subject: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last failure.
        reason: String,
    },

    /// Creating a subscription failed.
    #[error("failed to subscribe to '{subject}': {reason}")]
    Subscribe {
        /// Subject of the subscription.
        subject: String,
        /// Underlying failure.
        reason: String,
    },

    /// A durable-stream operation failed.
    #[error("durable stream error: {0}")]
    Stream(String),

    /// A payload could not be serialized or deserialized.
    #[error("failed to encode message payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Broker client configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker URL.
    pub url: String,
    /// Delay between reconnection attempts.
    pub reconnect_wait: Duration,
    /// Maximum reconnection attempts before the connection gives up.
    pub max_reconnects: usize,
    /// Retention: maximum age of messages in the durable log stream.
    pub stream_max_age: Duration,
    /// Retention: maximum number of messages in the durable log stream.
    pub stream_max_messages: i64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            reconnect_wait: Duration::from_secs(2),
            max_reconnects: 10,
            stream_max_age: Duration::from_secs(24 * 3600),
            stream_max_messages: 10_000,
        }
    }
}

impl BrokerConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `NATS_URL`: broker URL (default `nats://localhost:4222`)
    /// - `MIRA_LOG_STREAM_MAX_AGE_HOURS`: durable stream retention age (default 24)
    /// - `MIRA_LOG_STREAM_MAX_MSGS`: durable stream retention count (default 10000)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("NATS_URL") {
            config.url = url;
        }
        if let Some(hours) = std::env::var("MIRA_LOG_STREAM_MAX_AGE_HOURS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|n| *n > 0)
        {
            config.stream_max_age = Duration::from_secs(hours * 3600);
        }
        if let Some(max) = std::env::var("MIRA_LOG_STREAM_MAX_MSGS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|n| *n > 0)
        {
            config.stream_max_messages = max;
        }
        config
    }
}

// Retry budgets match the intake/worker contracts: requests are durable and
// worth three attempts, status updates are latency-sensitive and get two.
const REQUEST_PUBLISH_ATTEMPTS: u32 = 3;
const REQUEST_PUBLISH_BASE_DELAY: Duration = Duration::from_millis(100);
const STATUS_PUBLISH_ATTEMPTS: u32 = 2;
const STATUS_PUBLISH_BASE_DELAY: Duration = Duration::from_millis(50);
const HISTORY_BATCH_SIZE: usize = 100;
const HISTORY_BATCH_EXPIRY: Duration = Duration::from_secs(5);
const HISTORY_CONSUMER_INACTIVE_THRESHOLD: Duration = Duration::from_secs(30);

/// Client for the Mira broker.
///
/// Cheap to clone; the underlying connection is shared and internally
/// synchronized, and reconnects transparently.
#[derive(Clone)]
pub struct BrokerClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: BrokerConfig,
}

impl BrokerClient {
    /// Connect to the broker with automatic reconnection.
    ///
    /// Disconnect and reconnect events are logged; the connection keeps
    /// retrying in the background up to `max_reconnects` times.
    pub async fn connect(config: BrokerConfig) -> Result<Self, BrokerError> {
        let reconnect_wait = config.reconnect_wait;
        let client = async_nats::ConnectOptions::new()
            .max_reconnects(config.max_reconnects)
            .reconnect_delay_callback(move |_attempts| reconnect_wait)
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Disconnected => warn!("broker disconnected"),
                    async_nats::Event::Connected => info!("broker reconnected"),
                    other => debug!(event = %other, "broker event"),
                }
            })
            .connect(config.url.as_str())
            .await
            .map_err(|e| BrokerError::Connect {
                url: config.url.clone(),
                reason: e.to_string(),
            })?;

        info!(url = %config.url, "connected to broker");

        let jetstream = jetstream::new(client.clone());

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    /// Whether the underlying connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    /// Publish a build request to the work queue.
    ///
    /// Retries with exponential backoff (base 100 ms, 3 attempts) and fails
    /// when the broker stays unhealthy.
    pub async fn publish_request(&self, request: &BuildRequest) -> Result<(), BrokerError> {
        self.publish_with_retry(
            subjects::BUILD_REQUESTS.to_string(),
            request,
            REQUEST_PUBLISH_ATTEMPTS,
            REQUEST_PUBLISH_BASE_DELAY,
        )
        .await?;
        info!(build_id = %request.id, "build request published");
        Ok(())
    }

    /// Publish a build request without waiting for the result.
    ///
    /// The returned channel receives exactly one message once the outcome is
    /// known. Dropping the receiver is fine; the publish still runs.
    pub fn publish_request_async(
        &self,
        request: BuildRequest,
    ) -> oneshot::Receiver<Result<(), BrokerError>> {
        let (tx, rx) = oneshot::channel();
        let client = self.clone();
        tokio::spawn(async move {
            let result = client.publish_request(&request).await;
            if let Err(ref e) = result {
                warn!(build_id = %request.id, error = %e, "async build request publish failed");
            }
            let _ = tx.send(result);
        });
        rx
    }

    /// Publish a status update on the build's status subject.
    pub async fn publish_status(&self, status: &BuildStatus) -> Result<(), BrokerError> {
        self.publish_with_retry(
            subjects::build_status(&status.build_id),
            status,
            STATUS_PUBLISH_ATTEMPTS,
            STATUS_PUBLISH_BASE_DELAY,
        )
        .await
    }

    /// Publish a log entry on the build's live subject and append it to the
    /// durable stream.
    ///
    /// The live publish is fire-and-forget. If the durable publish fails
    /// because the stream is missing, stream creation is attempted once and
    /// the publish retried.
    pub async fn publish_log(&self, entry: &LogEntry) -> Result<(), BrokerError> {
        let subject = subjects::build_logs(&entry.build_id);
        let payload = serde_json::to_vec(entry)?;

        if let Err(e) = self.client.publish(subject.clone(), payload.clone().into()).await {
            warn!(subject = %subject, error = %e, "live log publish failed");
        }

        // A missing stream surfaces on the ack, not the publish call, so the
        // whole publish+ack pair is the unit that gets retried.
        let first_attempt: Result<(), String> = async {
            let ack = self
                .jetstream
                .publish(subject.clone(), payload.clone().into())
                .await
                .map_err(|e| e.to_string())?;
            ack.await.map_err(|e| e.to_string())?;
            Ok(())
        }
        .await;

        if let Err(first_err) = first_attempt {
            debug!(error = %first_err, "durable log publish failed, ensuring stream exists");
            self.ensure_log_stream().await?;
            self.jetstream
                .publish(subject, payload.into())
                .await
                .map_err(|e| BrokerError::Stream(e.to_string()))?
                .await
                .map_err(|e| BrokerError::Stream(e.to_string()))?;
        }
        Ok(())
    }

    /// Subscribe to the build request queue as part of the worker queue
    /// group, so multiple workers share delivery (competing consumers,
    /// at-least-once).
    pub async fn subscribe_requests(&self) -> Result<async_nats::Subscriber, BrokerError> {
        self.client
            .queue_subscribe(
                subjects::BUILD_REQUESTS,
                subjects::WORKER_QUEUE_GROUP.to_string(),
            )
            .await
            .map_err(|e| BrokerError::Subscribe {
                subject: subjects::BUILD_REQUESTS.to_string(),
                reason: e.to_string(),
            })
    }

    /// Subscribe to live log entries for one build.
    ///
    /// The subscription is non-durable; dropping the subscriber releases
    /// broker resources.
    pub async fn subscribe_logs(
        &self,
        build_id: &str,
    ) -> Result<async_nats::Subscriber, BrokerError> {
        let subject = subjects::build_logs(build_id);
        self.client
            .subscribe(subject.clone())
            .await
            .map_err(|e| BrokerError::Subscribe {
                subject,
                reason: e.to_string(),
            })
    }

    /// Subscribe to log entries of every build (`logs.*`).
    pub async fn subscribe_all_logs(&self) -> Result<async_nats::Subscriber, BrokerError> {
        self.client
            .subscribe(subjects::LOGS_WILDCARD)
            .await
            .map_err(|e| BrokerError::Subscribe {
                subject: subjects::LOGS_WILDCARD.to_string(),
                reason: e.to_string(),
            })
    }

    /// Subscribe to status updates of every build (`status.*`).
    pub async fn subscribe_all_statuses(&self) -> Result<async_nats::Subscriber, BrokerError> {
        self.client
            .subscribe(subjects::STATUS_WILDCARD)
            .await
            .map_err(|e| BrokerError::Subscribe {
                subject: subjects::STATUS_WILDCARD.to_string(),
                reason: e.to_string(),
            })
    }

    /// Fetch the full log history of a build from the durable stream.
    ///
    /// Creates an ephemeral durable consumer filtered by the build's log
    /// subject with deliver-all policy, pulls in batches of 100 with a 5 s
    /// expiry, acknowledges every message, and deletes the consumer before
    /// returning. Entries come back in stream order.
    pub async fn fetch_log_history(&self, build_id: &str) -> Result<Vec<LogEntry>, BrokerError> {
        if let Err(e) = self.ensure_log_stream().await {
            warn!(error = %e, "failed to ensure log stream before history fetch");
        }

        let stream = self
            .jetstream
            .get_stream(subjects::LOG_STREAM_NAME)
            .await
            .map_err(|e| BrokerError::Stream(e.to_string()))?;

        let consumer_name = format!("hist-{}-{}", build_id, Uuid::new_v4().simple());
        let consumer = stream
            .create_consumer(jetstream::consumer::pull::Config {
                durable_name: Some(consumer_name.clone()),
                filter_subject: subjects::build_logs(build_id),
                deliver_policy: jetstream::consumer::DeliverPolicy::All,
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                inactive_threshold: HISTORY_CONSUMER_INACTIVE_THRESHOLD,
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::Stream(e.to_string()))?;

        let mut entries = Vec::new();
        let fetch_result = self.drain_consumer(&consumer, &mut entries).await;

        if let Err(e) = stream.delete_consumer(&consumer_name).await {
            warn!(consumer = %consumer_name, error = %e, "failed to delete history consumer");
        }

        fetch_result?;

        if entries.is_empty() {
            debug!(build_id = %build_id, "no logs found in durable stream");
        }
        Ok(entries)
    }

    async fn drain_consumer(
        &self,
        consumer: &jetstream::consumer::Consumer<jetstream::consumer::pull::Config>,
        entries: &mut Vec<LogEntry>,
    ) -> Result<(), BrokerError> {
        loop {
            let mut batch = consumer
                .fetch()
                .max_messages(HISTORY_BATCH_SIZE)
                .expires(HISTORY_BATCH_EXPIRY)
                .messages()
                .await
                .map_err(|e| BrokerError::Stream(e.to_string()))?;

            let mut received = 0usize;
            while let Some(message) = batch.next().await {
                let message = message.map_err(|e| BrokerError::Stream(e.to_string()))?;
                received += 1;

                match serde_json::from_slice::<LogEntry>(&message.payload) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        warn!(error = %e, "skipping undecodable log message in history");
                    }
                }
                if let Err(e) = message.ack().await {
                    warn!(error = %e, "failed to ack history message");
                }
            }

            if received < HISTORY_BATCH_SIZE {
                return Ok(());
            }
        }
    }

    /// Make sure the durable log stream exists.
    ///
    /// Creates `MIRA_LOGS` with file-backed storage and limits-based
    /// retention on first use. When another stream already owns the log
    /// subjects ("subjects overlap"), the existing stream is used as-is.
    pub async fn ensure_log_stream(&self) -> Result<(), BrokerError> {
        let result = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: subjects::LOG_STREAM_NAME.to_string(),
                subjects: vec![subjects::LOGS_WILDCARD.into()],
                storage: jetstream::stream::StorageType::File,
                retention: jetstream::stream::RetentionPolicy::Limits,
                max_age: self.config.stream_max_age,
                max_messages: self.config.stream_max_messages,
                ..Default::default()
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("subjects overlap") => {
                warn!("a stream with overlapping subjects already exists, using it as-is");
                Ok(())
            }
            Err(e) => Err(BrokerError::Stream(e.to_string())),
        }
    }

    async fn publish_with_retry<T: Serialize>(
        &self,
        subject: String,
        message: &T,
        attempts: u32,
        base_delay: Duration,
    ) -> Result<(), BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }

        let payload = serde_json::to_vec(message)?;
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let published: Result<(), String> = async {
                self.client
                    .publish(subject.clone(), payload.clone().into())
                    .await
                    .map_err(|e| e.to_string())?;
                self.client.flush().await.map_err(|e| e.to_string())
            }
            .await;

            match published {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(subject = %subject, attempt = attempt + 1, "publish succeeded after retry");
                    }
                    return Ok(());
                }
                Err(reason) => {
                    last_error = reason;
                    if attempt + 1 < attempts {
                        let delay = base_delay * 2u32.pow(attempt);
                        warn!(
                            subject = %subject,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %last_error,
                            "publish attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(BrokerError::PublishFailed {
            subject,
            attempts,
            reason: last_error,
        })
    }
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClient")
            .field("url", &self.config.url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.url, "nats://localhost:4222");
        assert_eq!(config.reconnect_wait, Duration::from_secs(2));
        assert_eq!(config.max_reconnects, 10);
        assert_eq!(config.stream_max_age, Duration::from_secs(86_400));
        assert_eq!(config.stream_max_messages, 10_000);
    }

    #[test]
    fn test_config_clone() {
        let config = BrokerConfig {
            url: "nats://broker:4222".to_string(),
            reconnect_wait: Duration::from_secs(1),
            max_reconnects: 3,
            stream_max_age: Duration::from_secs(3600),
            stream_max_messages: 500,
        };
        let cloned = config.clone();
        assert_eq!(config.url, cloned.url);
        assert_eq!(config.stream_max_messages, cloned.stream_max_messages);
    }

    #[test]
    fn test_error_display() {
        let err = BrokerError::NotConnected;
        assert_eq!(err.to_string(), "broker connection is not healthy");

        let err = BrokerError::PublishFailed {
            subject: "build.requests".to_string(),
            attempts: 3,
            reason: "timed out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to publish on 'build.requests' after 3 attempts: timed out"
        );

        let err = BrokerError::Connect {
            url: "nats://broker:4222".to_string(),
            reason: "refused".to_string(),
        };
        assert!(err.to_string().contains("nats://broker:4222"));
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_url() {
        // Port 1 is never a NATS server; the connect should fail fast.
        let config = BrokerConfig {
            url: "nats://127.0.0.1:1".to_string(),
            max_reconnects: 0,
            ..Default::default()
        };
        let result = BrokerClient::connect(config).await;
        match result {
            Err(BrokerError::Connect { url, .. }) => {
                assert_eq!(url, "nats://127.0.0.1:1");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connect to a dead port should fail"),
        }
    }
}

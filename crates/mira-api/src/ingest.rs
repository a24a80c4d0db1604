// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! History ingest subscribers.
//!
//! Two resident tasks copy broker traffic into the store: `logs.*` into the
//! log collection and `status.*` into the build collection. Malformed
//! messages are dropped with a warning; store failures are logged and never
//! stop the subscriber. If a subscription ends it is re-established after a
//! short delay.

use std::time::Duration;

use futures::StreamExt;
use tracing::{error, info, warn};

use mira_common::broker::BrokerClient;
use mira_common::types::{BuildStatus, LogEntry};
use mira_store::Store;

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

/// Spawn both ingest subscribers.
pub fn spawn(broker: BrokerClient, store: Store) {
    tokio::spawn(run_log_ingest(broker.clone(), store.clone()));
    tokio::spawn(run_status_ingest(broker, store));
}

async fn run_log_ingest(broker: BrokerClient, store: Store) {
    loop {
        let mut subscription = match broker.subscribe_all_logs().await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(error = %e, "log ingest subscription failed");
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                continue;
            }
        };
        info!("log ingest subscriber started");

        while let Some(message) = subscription.next().await {
            match serde_json::from_slice::<LogEntry>(&message.payload) {
                Ok(entry) => {
                    if let Err(e) = store.logs().save(&entry).await {
                        warn!(build_id = %entry.build_id, error = %e, "failed to persist log entry");
                    }
                }
                Err(e) => {
                    warn!(subject = %message.subject, error = %e, "dropping malformed log message");
                }
            }
        }

        warn!("log ingest subscription ended, resubscribing");
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}

async fn run_status_ingest(broker: BrokerClient, store: Store) {
    loop {
        let mut subscription = match broker.subscribe_all_statuses().await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(error = %e, "status ingest subscription failed");
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                continue;
            }
        };
        info!("status ingest subscriber started");

        while let Some(message) = subscription.next().await {
            match serde_json::from_slice::<BuildStatus>(&message.payload) {
                Ok(status) => {
                    if let Err(e) = store.builds().save(&status).await {
                        warn!(build_id = %status.build_id, error = %e, "failed to persist build status");
                    }
                }
                Err(e) => {
                    warn!(subject = %message.subject, error = %e, "dropping malformed status message");
                }
            }
        }

        warn!("status ingest subscription ended, resubscribing");
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ingest subscriber end-to-end tests.
//!
//! Require a running NATS server (`TEST_NATS_URL`) and MongoDB
//! (`TEST_MONGODB_URI`); tests skip when either is absent.

use std::time::Duration;

use mira_api::ingest;
use mira_common::broker::{BrokerClient, BrokerConfig};
use mira_common::types::{BuildState, BuildStatus, BuildStep, LogEntry, LogLevel};
use mira_store::documents::SortOrder;
use mira_store::{LogFilter, Store, StoreConfig};

struct TestContext {
    broker: BrokerClient,
    store: Store,
}

impl TestContext {
    async fn new() -> Option<Self> {
        let nats_url = std::env::var("TEST_NATS_URL").ok()?;
        let mongo_uri = std::env::var("TEST_MONGODB_URI").ok()?;

        let broker = BrokerClient::connect(BrokerConfig {
            url: nats_url,
            ..Default::default()
        })
        .await
        .ok()?;
        broker.ensure_log_stream().await.ok()?;

        let store = Store::connect(&StoreConfig {
            uri: mongo_uri,
            database: "mira_test".to_string(),
        })
        .await
        .ok()?;

        ingest::spawn(broker.clone(), store.clone());
        // Give the subscribers a moment to establish.
        tokio::time::sleep(Duration::from_millis(200)).await;

        Some(Self { broker, store })
    }
}

fn unique_build_id() -> String {
    format!("test-{}", uuid::Uuid::new_v4())
}

/// Poll until the condition produces a value or the deadline passes.
async fn wait_for<T, F, Fut>(mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

#[tokio::test]
async fn test_published_log_lands_in_store() {
    let Some(ctx) = TestContext::new().await else {
        eprintln!("TEST_NATS_URL / TEST_MONGODB_URI not set, skipping");
        return;
    };
    let build_id = unique_build_id();

    let entry = LogEntry::now(&build_id, LogLevel::Error, "boom", Some(BuildStep::Deploy));
    ctx.broker.publish_log(&entry).await.unwrap();

    let filter = LogFilter {
        build_id: Some(build_id.clone()),
        ..Default::default()
    };
    let stored = wait_for(|| {
        let store = ctx.store.clone();
        let filter = filter.clone();
        async move {
            let (entries, _) = store.logs().query(&filter, 1, 10, SortOrder::Asc).await.ok()?;
            entries.into_iter().next()
        }
    })
    .await
    .expect("log entry never reached the store");

    // Round trip: every field survives (timestamps at millisecond precision).
    assert_eq!(stored.build_id, build_id);
    assert_eq!(stored.level, LogLevel::Error);
    assert_eq!(stored.message, "boom");
    assert_eq!(stored.step, Some(BuildStep::Deploy));
    assert_eq!(
        stored.timestamp.timestamp_millis(),
        entry.timestamp.timestamp_millis()
    );
}

#[tokio::test]
async fn test_published_status_lands_in_store() {
    let Some(ctx) = TestContext::new().await else {
        eprintln!("TEST_NATS_URL / TEST_MONGODB_URI not set, skipping");
        return;
    };
    let build_id = unique_build_id();

    let status = BuildStatus::running(&build_id, "p-1", "demo-site");
    ctx.broker.publish_status(&status).await.unwrap();

    let stored = wait_for(|| {
        let store = ctx.store.clone();
        let build_id = build_id.clone();
        async move { store.builds().get(&build_id).await.ok().flatten() }
    })
    .await
    .expect("status never reached the store");

    assert_eq!(stored.status, BuildState::Running);
    assert_eq!(stored.project_id.as_deref(), Some("p-1"));
    assert_eq!(stored.app_name.as_deref(), Some("demo-site"));

    // Terminal transition overwrites the same document.
    ctx.broker
        .publish_status(&status.failed("DeployFailed: 409 Conflict"))
        .await
        .unwrap();

    let stored = wait_for(|| {
        let store = ctx.store.clone();
        let build_id = build_id.clone();
        async move {
            let status = store.builds().get(&build_id).await.ok().flatten()?;
            status.status.is_terminal().then_some(status)
        }
    })
    .await
    .expect("terminal status never reached the store");

    assert_eq!(stored.status, BuildState::Failed);
    assert_eq!(stored.error.as_deref(), Some("DeployFailed: 409 Conflict"));
}

#[tokio::test]
async fn test_malformed_messages_are_dropped() {
    let Some(ctx) = TestContext::new().await else {
        eprintln!("TEST_NATS_URL / TEST_MONGODB_URI not set, skipping");
        return;
    };
    let build_id = unique_build_id();

    // A malformed payload on the log subject must not stop the subscriber;
    // the well-formed entry published afterwards still has to land.
    let nats_url = std::env::var("TEST_NATS_URL").unwrap();
    let raw = async_nats::connect(nats_url.as_str()).await.unwrap();
    raw.publish(
        mira_common::subjects::build_logs(&build_id),
        "this is not json".into(),
    )
    .await
    .unwrap();
    raw.flush().await.unwrap();

    ctx.broker
        .publish_log(&LogEntry::now(&build_id, LogLevel::Info, "first", None))
        .await
        .unwrap();

    let filter = LogFilter {
        build_id: Some(build_id.clone()),
        ..Default::default()
    };
    let first = wait_for(|| {
        let store = ctx.store.clone();
        let filter = filter.clone();
        async move {
            let (entries, _) = store.logs().query(&filter, 1, 10, SortOrder::Asc).await.ok()?;
            (!entries.is_empty()).then_some(())
        }
    })
    .await;
    assert!(first.is_some(), "first entry never reached the store");
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for broker E2E tests.
//!
//! Tests run against a real NATS server named by `TEST_NATS_URL` and skip
//! silently when it is not set.

#![allow(dead_code)]

use mira_common::broker::{BrokerClient, BrokerConfig};

/// Test context holding a connected broker client.
pub struct TestContext {
    pub broker: BrokerClient,
}

impl TestContext {
    /// Connect to the test broker, or `None` when `TEST_NATS_URL` is unset
    /// or the server is unreachable.
    pub async fn new() -> Option<Self> {
        let url = std::env::var("TEST_NATS_URL").ok()?;
        let config = BrokerConfig {
            url,
            ..Default::default()
        };
        let broker = BrokerClient::connect(config).await.ok()?;
        broker.ensure_log_stream().await.ok()?;
        Some(Self { broker })
    }
}

/// A unique per-test build ID so parallel tests never share subjects.
pub fn unique_build_id() -> String {
    format!("test-{}", uuid::Uuid::new_v4())
}

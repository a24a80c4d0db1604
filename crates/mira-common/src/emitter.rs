// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-build log emitter.
//!
//! A `BuildLogger` is bound to one build ID and fans every entry out three
//! ways: the live subject (best-effort real-time), the durable stream (for
//! history and analytics), and process stdout for operator observation.
//! Publish failures are logged and never interrupt the build.

use std::collections::HashMap;

use tracing::warn;

use crate::broker::BrokerClient;
use crate::types::{BuildStep, LogEntry, LogLevel};

/// Logger bound to a single build.
#[derive(Debug, Clone)]
pub struct BuildLogger {
    broker: BrokerClient,
    build_id: String,
}

impl BuildLogger {
    /// Create a logger for the given build.
    pub fn new(broker: BrokerClient, build_id: impl Into<String>) -> Self {
        Self {
            broker,
            build_id: build_id.into(),
        }
    }

    /// The build this logger is bound to.
    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    /// Log an info-level message.
    pub async fn info(&self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message.into(), None).await;
    }

    /// Log an error-level message.
    pub async fn error(&self, message: impl Into<String>) {
        self.emit(LogLevel::Error, message.into(), None).await;
    }

    /// Log a debug-level message.
    pub async fn debug(&self, message: impl Into<String>) {
        self.emit(LogLevel::Debug, message.into(), None).await;
    }

    /// Log an info-level message tagged with a pipeline step.
    pub async fn info_with_step(&self, step: BuildStep, message: impl Into<String>) {
        self.emit(LogLevel::Info, message.into(), Some(step)).await;
    }

    /// Log an error-level message tagged with a pipeline step.
    pub async fn error_with_step(&self, step: BuildStep, message: impl Into<String>) {
        self.emit(LogLevel::Error, message.into(), Some(step)).await;
    }

    /// Structured logging entry point for callers carrying extra fields.
    ///
    /// Fields are currently informational only; the entry is emitted at info
    /// level. Kept so upstream tooling with a fields-and-message contract can
    /// plug in directly.
    pub async fn log(&self, _fields: &HashMap<String, String>, message: impl Into<String>) {
        self.emit(LogLevel::Info, message.into(), None).await;
    }

    /// Byte-sink contract: one write becomes one info entry.
    ///
    /// Used to adapt writer-style output (e.g. subprocess pipes) onto the
    /// log pipeline. Trailing newlines are stripped; empty lines dropped.
    pub async fn write_line(&self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return;
        }
        self.emit(LogLevel::Info, line.to_string(), None).await;
    }

    async fn emit(&self, level: LogLevel, message: String, step: Option<BuildStep>) {
        let entry = LogEntry::now(&self.build_id, level, message, step);

        // Stdout mirror, one line per entry: [HH:MM:SS][level][step?] message
        match entry.step {
            Some(step) => println!(
                "[{}][{}][{}] {}",
                entry.timestamp.format("%H:%M:%S"),
                entry.level.as_str(),
                step.as_str(),
                entry.message
            ),
            None => println!(
                "[{}][{}] {}",
                entry.timestamp.format("%H:%M:%S"),
                entry.level.as_str(),
                entry.message
            ),
        }

        if let Err(e) = self.broker.publish_log(&entry).await {
            warn!(build_id = %self.build_id, error = %e, "failed to publish log entry");
        }
    }
}

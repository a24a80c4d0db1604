// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Queue consumption and pipeline orchestration.
//!
//! The worker drains the `build.requests` queue-group subscription and runs
//! each request on its own task: source acquisition, image construction,
//! deployment. Status transitions and log entries are published throughout;
//! a stage failure fails the build, never the worker.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{error, info, warn};

use mira_common::broker::{BrokerClient, BrokerError};
use mira_common::emitter::BuildLogger;
use mira_common::types::{BuildRequest, BuildStatus, BuildStep};

use crate::config::Config;
use crate::deploy::Deployer;
use crate::error::BuildError;
use crate::image::ImageBuilder;
use crate::source::SourceFetcher;

/// The build worker service.
pub struct Worker {
    broker: BrokerClient,
    fetcher: SourceFetcher,
    builder: ImageBuilder,
    deployer: Deployer,
}

impl Worker {
    /// Assemble a worker from its configuration and a connected broker.
    pub fn new(broker: BrokerClient, config: &Config) -> Self {
        Self {
            broker,
            fetcher: SourceFetcher::new(config.workspace_dir.clone(), config.clone_timeout),
            builder: ImageBuilder::new(config.registry_user.clone()),
            deployer: Deployer::new(config.paas_api_host.clone()),
        }
    }

    /// Consume build requests until the subscription ends.
    ///
    /// Each request is handled on its own task; the queue group spreads
    /// deliveries across worker processes.
    pub async fn run(self: Arc<Self>) -> Result<(), BrokerError> {
        let mut subscription = self.broker.subscribe_requests().await?;
        info!("worker subscribed to build requests");

        while let Some(message) = subscription.next().await {
            let request: BuildRequest = match serde_json::from_slice(&message.payload) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "dropping malformed build request");
                    continue;
                }
            };

            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                worker.process(request).await;
            });
        }

        error!("build request subscription ended");
        Ok(())
    }

    /// Run the full pipeline for one request and publish the outcome.
    pub async fn process(&self, request: BuildRequest) {
        info!(build_id = %request.id, name = %request.name, "processing build request");

        let logger = BuildLogger::new(self.broker.clone(), &request.id);
        let running = BuildStatus::running(&request.id, &request.project_id, &request.name);
        self.publish_status(&running).await;

        match self.execute_pipeline(&request, &logger).await {
            Ok(image) => {
                logger
                    .info_with_step(
                        BuildStep::Deploy,
                        format!("SUCCESSFULLY DEPLOYED IMAGE TO CRANE CLOUD: {image}"),
                    )
                    .await;
                info!(build_id = %request.id, image = %image, "build completed");
                self.publish_status(&running.completed(image)).await;
            }
            Err(e) => {
                logger
                    .error_with_step(e.step(), format!("Build failed: {e}"))
                    .await;
                error!(build_id = %request.id, error = %e, "build failed");
                self.publish_status(&running.failed(e.to_string())).await;
            }
        }
    }

    async fn execute_pipeline(
        &self,
        request: &BuildRequest,
        logger: &BuildLogger,
    ) -> Result<String, BuildError> {
        let source_path = self.fetcher.fetch(request, logger).await?;
        let image = self.builder.build(request, &source_path, logger).await?;
        self.deployer.deploy(request, &image, logger).await?;
        Ok(image)
    }

    async fn publish_status(&self, status: &BuildStatus) {
        if let Err(e) = self.broker.publish_status(status).await {
            // The ingest subscriber cannot recover what was never published;
            // surface loudly but keep the build going.
            warn!(
                build_id = %status.build_id,
                status = status.status.as_str(),
                error = %e,
                "failed to publish build status"
            );
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").finish_non_exhaustive()
    }
}

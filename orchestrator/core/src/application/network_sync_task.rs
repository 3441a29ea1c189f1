// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! Boot-time reattachment of the control plane to every service network.
//!
//! Runtime network attachments do not survive a control plane container
//! restart, so every known service is reconfigured once at startup.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::network_service::NetworkService;
use crate::application::task_runner::StartupTask;
use crate::domain::repository::ServiceRepository;

pub struct NetworkSyncTask {
    network_service: Arc<NetworkService>,
    service_repository: Arc<dyn ServiceRepository>,
}

impl NetworkSyncTask {
    pub fn new(network_service: Arc<NetworkService>, service_repository: Arc<dyn ServiceRepository>) -> Self {
        Self {
            network_service,
            service_repository,
        }
    }
}

#[async_trait]
impl StartupTask for NetworkSyncTask {
    fn name(&self) -> &'static str {
        "network-sync"
    }

    async fn run(&self) -> anyhow::Result<()> {
        let services = self.service_repository.query_all().await?;
        info!(services = services.len(), "Syncing service networks");

        let mut failures = 0usize;
        for service in &services {
            if let Err(e) = self.network_service.configure_service_network(&service.service_id).await {
                failures += 1;
                warn!(service_id = %service.service_id, error = %e, "Failed to sync service network");
            }
        }

        if failures > 0 {
            anyhow::bail!("{} of {} service networks failed to sync", failures, services.len());
        }
        Ok(())
    }
}

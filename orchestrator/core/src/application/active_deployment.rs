// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! Resolves a service's active deployment (service → `activeDeploymentId` →
//! deployment record). Shared by the network service and both proxies.

use std::sync::Arc;

use crate::domain::deployment::DeploymentRecord;
use crate::domain::repository::{DeploymentRepository, RepositoryError, ServiceRepository};
use crate::domain::service::ServiceId;

#[derive(Clone)]
pub struct ActiveDeploymentResolver {
    service_repository: Arc<dyn ServiceRepository>,
    deployment_repository: Arc<dyn DeploymentRepository>,
}

impl ActiveDeploymentResolver {
    pub fn new(
        service_repository: Arc<dyn ServiceRepository>,
        deployment_repository: Arc<dyn DeploymentRepository>,
    ) -> Self {
        Self {
            service_repository,
            deployment_repository,
        }
    }

    /// `None` when the service is unknown, has no active deployment, or the
    /// referenced record is missing.
    pub async fn resolve(&self, service_id: &ServiceId) -> Result<Option<DeploymentRecord>, RepositoryError> {
        let Some(service) = self.service_repository.query(service_id).await? else {
            return Ok(None);
        };
        let Some(deployment_id) = service.active_deployment_id else {
            return Ok(None);
        };
        self.deployment_repository.query(&deployment_id).await
    }
}

// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Deploy Task
//!
//! Drives one [`DeployTaskDescriptor`] to a terminal deployment status:
//!
//! 1. ensure the `ServiceRecord` exists
//! 2. persist the `DeploymentRecord` in `deploying` (before any side effect)
//! 3. pull the image if absent
//! 4. find or create the service network
//! 5. when the descriptor binds host ports, terminate every existing
//!    container of the service first
//! 6. start `<serviceId>-<deploymentId>` on the service network
//! 7. poll the runtime until the container runs or attempts run out
//! 8. on timeout mark the deployment `failed`; the active deployment is untouched
//! 9. on success mark it `running`, make it active, refresh mesh aliases
//!
//! Failures in steps 1-2 propagate to the queue runner. Any failure in steps
//! 3-9 before the deployment is running ends the deployment as `failed` with
//! the error text as the reason. A failure after it is marked running (making
//! it active) leaves the record running and propagates the error.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::application::network_service::{NetworkError, NetworkService};
use crate::application::task_runner::{QueueTask, TaskEnvelope};
use crate::domain::deployment::{ContainerEndpoint, DeploymentId, DeploymentStatus};
use crate::domain::errors::DomainError;
use crate::domain::repository::{DeploymentRepository, RepositoryError, ServiceRepository};
use crate::domain::runtime::{ContainerRuntime, RunContainerRequest, RuntimeError};
use crate::domain::service::ServiceId;
use crate::domain::service_descriptor::ServiceDescriptor;

pub const CONTAINER_FAILED_TO_START: &str = "Container failed to start";

/// Work item carried by the deploy queue.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployTaskDescriptor {
    pub service_id: ServiceId,
    pub deployment_id: DeploymentId,
    pub service_descriptor: ServiceDescriptor,
}

/// Injected wait used between readiness polls.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(5_000),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Running,
    Failed(String),
}

pub struct DeployTask {
    service_repository: Arc<dyn ServiceRepository>,
    deployment_repository: Arc<dyn DeploymentRepository>,
    runtime: Arc<dyn ContainerRuntime>,
    network_service: Arc<NetworkService>,
    sleeper: Arc<dyn Sleeper>,
    readiness: ReadinessPolicy,
}

impl DeployTask {
    pub fn new(
        service_repository: Arc<dyn ServiceRepository>,
        deployment_repository: Arc<dyn DeploymentRepository>,
        runtime: Arc<dyn ContainerRuntime>,
        network_service: Arc<NetworkService>,
        sleeper: Arc<dyn Sleeper>,
        readiness: ReadinessPolicy,
    ) -> Self {
        Self {
            service_repository,
            deployment_repository,
            runtime,
            network_service,
            sleeper,
            readiness,
        }
    }

    pub async fn deploy(&self, task_id: &str, task: &DeployTaskDescriptor) -> Result<DeployOutcome, DeployError> {
        let service_id = &task.service_id;
        let deployment_id = &task.deployment_id;
        info!(task_id, service_id = %service_id, deployment_id = %deployment_id, "Starting deploy task");

        if self.service_repository.query(service_id).await?.is_none() {
            self.service_repository.create(service_id).await?;
            info!(task_id, service_id = %service_id, "Created service");
        }

        self.deployment_repository
            .create(deployment_id, task.service_descriptor.clone())
            .await?;
        info!(task_id, service_id = %service_id, deployment_id = %deployment_id, "Created deployment");

        let outcome = match self.roll_out(task_id, task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = e.to_string();
                error!(
                    task_id,
                    service_id = %service_id,
                    deployment_id = %deployment_id,
                    error = %reason,
                    "Deployment failed"
                );
                let still_deploying = matches!(
                    self.deployment_repository.query(deployment_id).await?,
                    Some(record) if record.status == DeploymentStatus::Deploying
                );
                if !still_deploying {
                    // Already marked running: the record is left as is and the cause surfaces to the runner.
                    metrics::counter!("paas_deployments_total", "outcome" => "error").increment(1);
                    return Err(e);
                }
                self.deployment_repository.mark_failed(deployment_id, &reason).await?;
                DeployOutcome::Failed(reason)
            }
        };

        let label = match outcome {
            DeployOutcome::Running => "running",
            DeployOutcome::Failed(_) => "failed",
        };
        metrics::counter!("paas_deployments_total", "outcome" => label).increment(1);

        Ok(outcome)
    }

    async fn roll_out(&self, task_id: &str, task: &DeployTaskDescriptor) -> Result<DeployOutcome, DeployError> {
        let service_id = &task.service_id;
        let deployment_id = &task.deployment_id;
        let descriptor = &task.service_descriptor;

        self.runtime.pull_image_if_absent(&descriptor.image).await?;

        let network_id = self.network_service.find_or_create_service_network(service_id).await?;
        info!(task_id, service_id = %service_id, network_id = %network_id, "Resolved service network");

        if !descriptor.host_ports().is_empty() {
            self.terminate_service_containers(task_id, service_id).await?;
        }

        let started = self
            .runtime
            .run_container(RunContainerRequest {
                service_id: service_id.clone(),
                deployment_id: deployment_id.clone(),
                image: descriptor.image.clone(),
                network_id,
                environment: descriptor.environment.clone(),
                volumes: descriptor.volumes.clone(),
                host_ports: descriptor.host_ports().to_vec(),
            })
            .await?;
        info!(
            task_id,
            service_id = %service_id,
            deployment_id = %deployment_id,
            container_id = %started.container_id,
            "Started container"
        );

        if !self.wait_until_running(service_id, deployment_id).await? {
            warn!(
                task_id,
                service_id = %service_id,
                deployment_id = %deployment_id,
                attempts = self.readiness.max_attempts,
                "Container did not reach running state"
            );
            self.deployment_repository
                .mark_failed(deployment_id, CONTAINER_FAILED_TO_START)
                .await?;
            return Ok(DeployOutcome::Failed(CONTAINER_FAILED_TO_START.to_string()));
        }

        let port = u16::try_from(descriptor.networking.ingress.container_port).map_err(|_| {
            DomainError::new("Container port out of range")
                .with("container_port", descriptor.networking.ingress.container_port)
        })?;

        self.deployment_repository
            .mark_running(
                deployment_id,
                ContainerEndpoint {
                    hostname: started.hostname,
                    port,
                },
            )
            .await?;
        self.service_repository
            .set_active_deployment(service_id, deployment_id)
            .await?;
        info!(task_id, service_id = %service_id, deployment_id = %deployment_id, "Deployment complete");

        // The deployment is already active here; alias drift is repaired by the next deploy or restart.
        if let Err(e) = self.network_service.configure_service_network(service_id).await {
            warn!(
                task_id,
                service_id = %service_id,
                error = %e,
                "Failed to refresh mesh aliases for service network"
            );
        }

        Ok(DeployOutcome::Running)
    }

    async fn terminate_service_containers(&self, task_id: &str, service_id: &ServiceId) -> Result<(), DeployError> {
        let containers = self.runtime.list_containers().await?;
        for container in containers
            .iter()
            .filter(|c| c.service_id.as_ref() == Some(service_id))
        {
            info!(
                task_id,
                service_id = %service_id,
                container_id = %container.container_id,
                "Terminating container to free host ports"
            );
            self.runtime.terminate_container(&container.container_id).await?;
        }
        Ok(())
    }

    async fn wait_until_running(
        &self,
        service_id: &ServiceId,
        deployment_id: &DeploymentId,
    ) -> Result<bool, DeployError> {
        for attempt in 1..=self.readiness.max_attempts {
            if self.runtime.is_container_running(service_id, deployment_id).await? {
                return Ok(true);
            }
            if attempt < self.readiness.max_attempts {
                self.sleeper.sleep(self.readiness.delay).await;
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl QueueTask<DeployTaskDescriptor> for DeployTask {
    async fn run(&self, envelope: TaskEnvelope<DeployTaskDescriptor>) -> anyhow::Result<()> {
        self.deploy(&envelope.task_id, &envelope.task).await?;
        Ok(())
    }
}

// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! Deployment Cleanup - periodic reconciler for stale containers
//!
//! Every pass recomputes the protected set (every service's active deployment
//! plus every deployment still `deploying`) and terminates each managed
//! container outside it, including containers missing their id labels.
//! Container health is never inspected.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::task_runner::PeriodicTask;
use crate::domain::deployment::{DeploymentId, DeploymentStatus};
use crate::domain::repository::{DeploymentRepository, ServiceRepository};
use crate::domain::runtime::{ContainerRuntime, ManagedContainer};

/// Result of one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub terminated_containers: Vec<String>,
    pub cleaned_up_deployments: Vec<DeploymentId>,
    pub failed_containers: Vec<String>,
}

pub struct CleanupTask {
    service_repository: Arc<dyn ServiceRepository>,
    deployment_repository: Arc<dyn DeploymentRepository>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl CleanupTask {
    pub fn new(
        service_repository: Arc<dyn ServiceRepository>,
        deployment_repository: Arc<dyn DeploymentRepository>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            service_repository,
            deployment_repository,
            runtime,
        }
    }

    async fn protected_deployments(&self) -> anyhow::Result<HashSet<DeploymentId>> {
        let mut protected: HashSet<DeploymentId> = self
            .service_repository
            .query_all()
            .await?
            .into_iter()
            .filter_map(|service| service.active_deployment_id)
            .collect();

        protected.extend(
            self.deployment_repository
                .query_by_status(DeploymentStatus::Deploying)
                .await?
                .into_iter()
                .map(|deployment| deployment.deployment_id),
        );
        Ok(protected)
    }

    fn is_eligible(protected: &HashSet<DeploymentId>, container: &ManagedContainer) -> bool {
        match (&container.service_id, &container.deployment_id) {
            (Some(_), Some(deployment_id)) => !protected.contains(deployment_id),
            _ => true,
        }
    }

    async fn clean_up_container(
        &self,
        container: &ManagedContainer,
        report: &mut CleanupReport,
    ) -> anyhow::Result<()> {
        self.runtime.terminate_container(&container.container_id).await?;
        metrics::counter!("paas_containers_cleaned_total").increment(1);
        report.terminated_containers.push(container.container_id.clone());

        let Some(deployment_id) = &container.deployment_id else {
            return Ok(());
        };
        match self.deployment_repository.query(deployment_id).await? {
            Some(deployment) if deployment.status == DeploymentStatus::Running => {
                self.deployment_repository.mark_cleaned_up(deployment_id).await?;
                report.cleaned_up_deployments.push(deployment_id.clone());
            }
            Some(deployment) => {
                debug!(
                    deployment_id = %deployment_id,
                    status = %deployment.status,
                    "Leaving deployment status unchanged"
                );
            }
            None => {
                warn!(
                    container_id = %container.container_id,
                    deployment_id = %deployment_id,
                    "Terminated container has no deployment record"
                );
            }
        }
        Ok(())
    }

    /// Each eligible container is handled on its own; failures are collected
    /// in the report instead of aborting the pass.
    pub async fn reconcile(&self) -> anyhow::Result<CleanupReport> {
        let protected = self.protected_deployments().await?;
        let containers = self.runtime.list_containers().await?;

        let eligible: Vec<&ManagedContainer> = containers
            .iter()
            .filter(|container| Self::is_eligible(&protected, container))
            .collect();

        if eligible.is_empty() {
            debug!("No stale containers found");
            return Ok(CleanupReport::default());
        }

        info!(
            container_ids = ?eligible.iter().map(|c| c.container_id.as_str()).collect::<Vec<_>>(),
            "Found containers to clean up"
        );

        let mut report = CleanupReport::default();
        for container in eligible {
            if let Err(e) = self.clean_up_container(container, &mut report).await {
                error!(
                    container_id = %container.container_id,
                    error = %e,
                    "Failed to clean up container"
                );
                report.failed_containers.push(container.container_id.clone());
            }
        }

        info!(
            terminated = report.terminated_containers.len(),
            cleaned_up = report.cleaned_up_deployments.len(),
            failed = report.failed_containers.len(),
            "Cleaned up containers"
        );
        Ok(report)
    }
}

#[async_trait]
impl PeriodicTask for CleanupTask {
    fn name(&self) -> &'static str {
        "deployment-cleanup"
    }

    async fn run(&self) -> anyhow::Result<()> {
        let report = self.reconcile().await?;
        if !report.failed_containers.is_empty() {
            anyhow::bail!(
                "failed to clean up {} container(s): {}",
                report.failed_containers.len(),
                report.failed_containers.join(", ")
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{descriptor, Fixture};
    use crate::domain::deployment::ContainerEndpoint;
    use crate::domain::service::ServiceId;

    fn cleanup_task(fixture: &Fixture) -> CleanupTask {
        CleanupTask::new(
            fixture.services.clone(),
            fixture.deployments.clone(),
            fixture.runtime.clone(),
        )
    }

    async fn running_deployment(fixture: &Fixture, deployment_id: &str) {
        let id = DeploymentId::new(deployment_id);
        fixture.deployments.create(&id, descriptor("svc1", 8080)).await.unwrap();
        fixture
            .deployments
            .mark_running(
                &id,
                ContainerEndpoint {
                    hostname: format!("svc1-{}", deployment_id),
                    port: 8080,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_terminates_unprotected_and_orphaned_containers() {
        let fixture = Fixture::new();
        let service_id = ServiceId::new("svc1");
        fixture.services.create(&service_id).await.unwrap();
        running_deployment(&fixture, "d1").await;
        running_deployment(&fixture, "d2").await;
        fixture.services.set_active_deployment(&service_id, &DeploymentId::new("d2")).await.unwrap();
        fixture.deployments.create(&DeploymentId::new("d3"), descriptor("svc1", 8080)).await.unwrap();

        fixture.runtime.add_container("c1", Some("svc1"), Some("d1"));
        fixture.runtime.add_container("c2", Some("svc1"), Some("d2"));
        fixture.runtime.add_container("c3", Some("svc1"), Some("d3"));
        fixture.runtime.add_container("c4", None, None);

        let report = cleanup_task(&fixture).reconcile().await.unwrap();

        assert_eq!(fixture.runtime.terminated_ids(), vec!["c1".to_string(), "c4".to_string()]);
        assert_eq!(report.cleaned_up_deployments, vec![DeploymentId::new("d1")]);

        let d1 = fixture.deployments.query(&DeploymentId::new("d1")).await.unwrap().unwrap();
        assert_eq!(d1.status, DeploymentStatus::CleanedUp);
        assert_eq!(d1.container, None);

        let d2 = fixture.deployments.query(&DeploymentId::new("d2")).await.unwrap().unwrap();
        assert_eq!(d2.status, DeploymentStatus::Running);
        let d3 = fixture.deployments.query(&DeploymentId::new("d3")).await.unwrap().unwrap();
        assert_eq!(d3.status, DeploymentStatus::Deploying);
    }

    #[tokio::test]
    async fn test_container_without_record_is_terminated_only() {
        let fixture = Fixture::new();
        fixture.runtime.add_container("c9", Some("svc9"), Some("gone"));

        let report = cleanup_task(&fixture).reconcile().await.unwrap();

        assert_eq!(report.terminated_containers, vec!["c9".to_string()]);
        assert!(report.cleaned_up_deployments.is_empty());
        assert!(fixture.deployments.query(&DeploymentId::new("gone")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_deployment_container_is_terminated_and_stays_failed() {
        let fixture = Fixture::new();
        let id = DeploymentId::new("d5");
        fixture.deployments.create(&id, descriptor("svc1", 8080)).await.unwrap();
        fixture.deployments.mark_failed(&id, "Container failed to start").await.unwrap();
        fixture.runtime.add_container("c5", Some("svc1"), Some("d5"));

        let report = cleanup_task(&fixture).reconcile().await.unwrap();

        assert_eq!(report.terminated_containers, vec!["c5".to_string()]);
        let record = fixture.deployments.query(&id).await.unwrap().unwrap();
        assert_eq!(record.status, DeploymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_nothing_to_do_when_all_protected() {
        let fixture = Fixture::new();
        fixture.deployments.create(&DeploymentId::new("d1"), descriptor("svc1", 8080)).await.unwrap();
        fixture.runtime.add_container("c1", Some("svc1"), Some("d1"));

        let report = cleanup_task(&fixture).reconcile().await.unwrap();

        assert_eq!(report, CleanupReport::default());
        assert!(fixture.runtime.terminated_ids().is_empty());
    }

    #[tokio::test]
    async fn test_one_failing_container_does_not_stop_the_pass() {
        let fixture = Fixture::new();
        fixture.services.create(&ServiceId::new("svc1")).await.unwrap();
        running_deployment(&fixture, "d1").await;
        running_deployment(&fixture, "d2").await;

        fixture.runtime.add_container("c1", Some("svc1"), Some("d1"));
        fixture.runtime.add_container("c2", Some("svc1"), Some("d2"));
        fixture.runtime.add_container("c3", None, None);
        fixture.runtime.fail_terminate.lock().insert("c1".to_string());

        let task = cleanup_task(&fixture);
        let report = task.reconcile().await.unwrap();

        assert_eq!(fixture.runtime.terminated_ids(), vec!["c2".to_string(), "c3".to_string()]);
        assert_eq!(report.failed_containers, vec!["c1".to_string()]);
        assert_eq!(report.cleaned_up_deployments, vec![DeploymentId::new("d2")]);

        let d1 = fixture.deployments.query(&DeploymentId::new("d1")).await.unwrap().unwrap();
        assert_eq!(d1.status, DeploymentStatus::Running);
        let d2 = fixture.deployments.query(&DeploymentId::new("d2")).await.unwrap().unwrap();
        assert_eq!(d2.status, DeploymentStatus::CleanedUp);

        // c1 is still listed, so the periodic run reports the failure
        let err = task.run().await.unwrap_err();
        assert!(err.to_string().contains("c1"));
    }
}

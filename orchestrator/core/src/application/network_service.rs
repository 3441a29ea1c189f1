// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! Per-service virtual networks and mesh DNS aliases.
//!
//! Each service gets one runtime network. The control plane's own container
//! is attached to every service network; its aliases on that network are the
//! `<peer>.mesh` names the service's active deployment may call, which is how
//! mesh traffic from a service container reaches the mesh proxy.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::application::active_deployment::ActiveDeploymentResolver;
use crate::domain::errors::DomainError;
use crate::domain::repository::RepositoryError;
use crate::domain::runtime::{ContainerRuntime, RuntimeError};
use crate::domain::service::ServiceId;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub struct NetworkService {
    runtime: Arc<dyn ContainerRuntime>,
    resolver: ActiveDeploymentResolver,
    control_plane_container: String,
}

impl NetworkService {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        resolver: ActiveDeploymentResolver,
        control_plane_container: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            resolver,
            control_plane_container: control_plane_container.into(),
        }
    }

    /// Network id for `service_id`, creating the network on first use.
    /// Losing a creation race to another caller is not an error.
    pub async fn find_or_create_service_network(&self, service_id: &ServiceId) -> Result<String, NetworkError> {
        if let Some(network_id) = self.runtime.find_network(service_id).await? {
            return Ok(network_id);
        }

        match self.runtime.create_network(service_id).await {
            Ok(network_id) => Ok(network_id),
            Err(RuntimeError::Conflict(message)) => {
                debug!(service_id = %service_id, %message, "Service network created concurrently");
                self.runtime.find_network(service_id).await?.ok_or_else(|| {
                    DomainError::new("Failed to find service network")
                        .with("service_id", service_id)
                        .into()
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `<peer>.mesh` for every egress peer of the active deployment.
    pub async fn mesh_egress_aliases(&self, service_id: &ServiceId) -> Result<Vec<String>, NetworkError> {
        let aliases: Vec<String> = self
            .resolver
            .resolve(service_id)
            .await?
            .map(|deployment| {
                deployment
                    .service_descriptor
                    .mesh_egress()
                    .iter()
                    .map(ServiceId::mesh_alias)
                    .collect()
            })
            .unwrap_or_default();
        Ok(aliases)
    }

    /// Re-attach the control plane container to the service network with the
    /// current mesh aliases. Aliases of a live attachment cannot be changed,
    /// so this always disconnects first.
    pub async fn configure_service_network(&self, service_id: &ServiceId) -> Result<(), NetworkError> {
        let network_id = self.find_or_create_service_network(service_id).await?;
        let dns_aliases = self.mesh_egress_aliases(service_id).await?;

        match self
            .runtime
            .disconnect_network(&network_id, &self.control_plane_container)
            .await
        {
            Ok(()) | Err(RuntimeError::NotConnected(_)) => {}
            Err(e) => return Err(e.into()),
        }

        self.runtime
            .connect_network(&network_id, &self.control_plane_container, dns_aliases.clone())
            .await?;

        info!(service_id = %service_id, network_id = %network_id, ?dns_aliases, "Reconfigured service network");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{descriptor_with_mesh, Fixture};
    use crate::domain::deployment::{ContainerEndpoint, DeploymentId};
    use crate::domain::repository::{DeploymentRepository, ServiceRepository};

    #[tokio::test]
    async fn test_find_or_create_is_idempotent() {
        let fixture = Fixture::new();
        let service_id = ServiceId::new("svc1");

        let first = fixture.network_service().find_or_create_service_network(&service_id).await.unwrap();
        let second = fixture.network_service().find_or_create_service_network(&service_id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fixture.runtime.created_networks.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_creation_conflict_resolves_to_existing_network() {
        let fixture = Fixture::new();
        fixture.runtime.conflict_on_create.store(true, std::sync::atomic::Ordering::SeqCst);

        let network_id = fixture
            .network_service()
            .find_or_create_service_network(&ServiceId::new("svc1"))
            .await
            .unwrap();

        assert_eq!(network_id, "net-svc1");
    }

    #[tokio::test]
    async fn test_configure_reconnects_with_egress_aliases() {
        let fixture = Fixture::new();
        let service_id = ServiceId::new("svc-a");
        let deployment_id = DeploymentId::new("d1");
        fixture.services.create(&service_id).await.unwrap();
        fixture
            .deployments
            .create(&deployment_id, descriptor_with_mesh("svc-a", &[], &["svc-b", "svc-c"]))
            .await
            .unwrap();
        fixture
            .deployments
            .mark_running(
                &deployment_id,
                ContainerEndpoint {
                    hostname: "svc-a-d1".to_string(),
                    port: 8080,
                },
            )
            .await
            .unwrap();
        fixture.services.set_active_deployment(&service_id, &deployment_id).await.unwrap();

        let network = fixture.network_service();
        network.configure_service_network(&service_id).await.unwrap();
        network.configure_service_network(&service_id).await.unwrap();

        let connections = fixture.runtime.connections.lock().clone();
        assert_eq!(connections.len(), 2);
        let (network_id, container, aliases) = &connections[1];
        assert_eq!(network_id, "net-svc-a");
        assert_eq!(container, "/homelab-paas-1");
        assert_eq!(aliases, &vec!["svc-b.mesh".to_string(), "svc-c.mesh".to_string()]);
        assert_eq!(fixture.runtime.disconnects.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_configure_without_active_deployment_uses_no_aliases() {
        let fixture = Fixture::new();
        let service_id = ServiceId::new("svc1");

        fixture.network_service().configure_service_network(&service_id).await.unwrap();

        let connections = fixture.runtime.connections.lock().clone();
        assert_eq!(connections.len(), 1);
        assert!(connections[0].2.is_empty());
    }
}

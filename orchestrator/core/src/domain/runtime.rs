// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Container runtime boundary.
//!
//! The control plane never owns container identity beyond three labels
//! (`managed-by`, `service-id`, `deployment-id`) and the endpoint snapshot on
//! the deployment record. Everything it needs from the runtime is expressed by
//! [`ContainerRuntime`]; `crate::infrastructure::runtime::DockerRuntime` is the
//! production adapter.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::IpAddr;
use thiserror::Error;

use crate::domain::deployment::DeploymentId;
use crate::domain::service::ServiceId;
use crate::domain::service_descriptor::{HostPortBinding, VolumeBinding};

pub const LABEL_MANAGED_BY: &str = "managed-by";
pub const LABEL_SERVICE_ID: &str = "service-id";
pub const LABEL_DEPLOYMENT_ID: &str = "deployment-id";

/// Container name, and therefore hostname on the service network.
pub fn container_name(service_id: &ServiceId, deployment_id: &DeploymentId) -> String {
    format!("{}-{}", service_id, deployment_id)
}

/// A container carrying the platform's `managed-by` label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedContainer {
    pub container_id: String,
    pub service_id: Option<ServiceId>,
    pub deployment_id: Option<DeploymentId>,
    pub ip_addresses: Vec<IpAddr>,
    pub state: Option<String>,
}

impl ManagedContainer {
    pub fn is_running(&self) -> bool {
        self.state.as_deref() == Some("running")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContainerRequest {
    pub service_id: ServiceId,
    pub deployment_id: DeploymentId,
    pub image: String,
    pub network_id: String,
    pub environment: BTreeMap<String, String>,
    pub volumes: Vec<VolumeBinding>,
    pub host_ports: Vec<HostPortBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedContainer {
    pub container_id: String,
    pub hostname: String,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The object already exists (e.g. duplicate network name).
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Container is not connected to network: {0}")]
    NotConnected(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Container runtime error: {0}")]
    Api(String),
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Id of the network labeled for this service, if any.
    async fn find_network(&self, service_id: &ServiceId) -> Result<Option<String>, RuntimeError>;

    /// Create the service network. A duplicate name yields [`RuntimeError::Conflict`].
    async fn create_network(&self, service_id: &ServiceId) -> Result<String, RuntimeError>;

    async fn connect_network(
        &self,
        network_id: &str,
        container: &str,
        dns_aliases: Vec<String>,
    ) -> Result<(), RuntimeError>;

    /// Yields [`RuntimeError::NotConnected`] when the container is not attached.
    async fn disconnect_network(&self, network_id: &str, container: &str) -> Result<(), RuntimeError>;

    /// Every container carrying the platform's `managed-by` label.
    async fn list_containers(&self) -> Result<Vec<ManagedContainer>, RuntimeError>;

    /// Create and start a labeled container attached to the service network.
    async fn run_container(&self, request: RunContainerRequest) -> Result<StartedContainer, RuntimeError>;

    /// Stop and remove.
    async fn terminate_container(&self, container_id: &str) -> Result<(), RuntimeError>;

    async fn pull_image_if_absent(&self, image: &str) -> Result<(), RuntimeError>;

    async fn is_container_running(
        &self,
        service_id: &ServiceId,
        deployment_id: &DeploymentId,
    ) -> Result<bool, RuntimeError>;
}

// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Docker adapter for [`ContainerRuntime`].
//!
//! Every network and container it creates carries the `managed-by` label, and
//! every lookup filters on it, so containers started by other tools on the
//! same host are never listed or touched.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerSummary, EndpointSettings, HostConfig, PortBinding};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, DisconnectNetworkOptions, ListNetworksOptions};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::domain::deployment::DeploymentId;
use crate::domain::runtime::{
    container_name, ContainerRuntime, ManagedContainer, RunContainerRequest, RuntimeError, StartedContainer,
    LABEL_DEPLOYMENT_ID, LABEL_MANAGED_BY, LABEL_SERVICE_ID,
};
use crate::domain::service::ServiceId;

const STOP_TIMEOUT_SECS: i64 = 10;

pub struct DockerRuntime {
    docker: Docker,
    managed_by: String,
}

impl DockerRuntime {
    pub fn new(socket_path: Option<&str>, managed_by: impl Into<String>) -> Result<Self, RuntimeError> {
        let docker = if let Some(path) = socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(path, 120, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| {
                RuntimeError::Api(format!(
                    "Failed to connect to Docker at {}: {}\n\n\
                     Ensure Docker is running and the socket path is correct.",
                    path, e
                ))
            })?
        } else {
            Docker::connect_with_local_defaults().map_err(|e| {
                RuntimeError::Api(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket\n\
                     - Socket not mounted into the control plane container",
                    e
                ))
            })?
        };

        Ok(Self {
            docker,
            managed_by: managed_by.into(),
        })
    }

    /// Verify Docker daemon is accessible
    pub async fn healthcheck(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Api(format!("Cannot connect to Docker daemon: {}", e)))?;
        Ok(())
    }

    fn network_name(&self, service_id: &ServiceId) -> String {
        format!("{}-{}", self.managed_by, service_id)
    }

    fn label_filter(&self, extra: &[(&str, &str)]) -> HashMap<String, Vec<String>> {
        let mut labels = vec![format!("{}={}", LABEL_MANAGED_BY, self.managed_by)];
        labels.extend(extra.iter().map(|(key, value)| format!("{}={}", key, value)));
        HashMap::from([("label".to_string(), labels)])
    }

    async fn list_labeled(&self, extra: &[(&str, &str)]) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: self.label_filter(extra),
            ..Default::default()
        };
        self.docker
            .list_containers(Some(options))
            .await
            .map_err(map_docker_error)
    }
}

fn map_docker_error(err: DockerError) -> RuntimeError {
    match err {
        // Docker reports a missing endpoint on disconnect with either 403 or 404
        DockerError::DockerResponseServerError { message, .. } if message.contains("is not connected") => {
            RuntimeError::NotConnected(message)
        }
        DockerError::DockerResponseServerError { status_code: 409, message } => RuntimeError::Conflict(message),
        DockerError::DockerResponseServerError { status_code: 404, message } => RuntimeError::NotFound(message),
        other => RuntimeError::Api(other.to_string()),
    }
}

fn to_managed_container(summary: ContainerSummary) -> Option<ManagedContainer> {
    let container_id = summary.id?;
    let labels = summary.labels.unwrap_or_default();
    let ip_addresses = summary
        .network_settings
        .and_then(|settings| settings.networks)
        .map(|networks| {
            networks
                .into_values()
                .filter_map(|endpoint| endpoint.ip_address)
                .filter_map(|ip| ip.parse::<IpAddr>().ok())
                .collect()
        })
        .unwrap_or_default();

    Some(ManagedContainer {
        container_id,
        service_id: labels.get(LABEL_SERVICE_ID).map(|id| ServiceId::new(id.as_str())),
        deployment_id: labels.get(LABEL_DEPLOYMENT_ID).map(|id| DeploymentId::new(id.as_str())),
        ip_addresses,
        state: summary.state,
    })
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn find_network(&self, service_id: &ServiceId) -> Result<Option<String>, RuntimeError> {
        let options = ListNetworksOptions::<String> {
            filters: self.label_filter(&[(LABEL_SERVICE_ID, service_id.as_str())]),
        };
        let networks = self
            .docker
            .list_networks(Some(options))
            .await
            .map_err(map_docker_error)?;
        Ok(networks.into_iter().find_map(|network| network.id))
    }

    async fn create_network(&self, service_id: &ServiceId) -> Result<String, RuntimeError> {
        let name = self.network_name(service_id);
        let options = CreateNetworkOptions::<String> {
            name: name.clone(),
            driver: "bridge".to_string(),
            labels: HashMap::from([
                (LABEL_MANAGED_BY.to_string(), self.managed_by.clone()),
                (LABEL_SERVICE_ID.to_string(), service_id.to_string()),
            ]),
            ..Default::default()
        };
        self.docker.create_network(options).await.map_err(map_docker_error)?;
        info!(service_id = %service_id, network = %name, "Created service network");

        self.find_network(service_id)
            .await?
            .ok_or_else(|| RuntimeError::NotFound(format!("Network {} not visible after creation", name)))
    }

    async fn connect_network(
        &self,
        network_id: &str,
        container: &str,
        dns_aliases: Vec<String>,
    ) -> Result<(), RuntimeError> {
        let options = ConnectNetworkOptions::<String> {
            container: container.to_string(),
            endpoint_config: EndpointSettings {
                aliases: Some(dns_aliases),
                ..Default::default()
            },
        };
        self.docker
            .connect_network(network_id, options)
            .await
            .map_err(map_docker_error)
    }

    async fn disconnect_network(&self, network_id: &str, container: &str) -> Result<(), RuntimeError> {
        let options = DisconnectNetworkOptions::<String> {
            container: container.to_string(),
            force: false,
        };
        self.docker
            .disconnect_network(network_id, options)
            .await
            .map_err(map_docker_error)
    }

    async fn list_containers(&self) -> Result<Vec<ManagedContainer>, RuntimeError> {
        Ok(self
            .list_labeled(&[])
            .await?
            .into_iter()
            .filter_map(to_managed_container)
            .collect())
    }

    async fn run_container(&self, request: RunContainerRequest) -> Result<StartedContainer, RuntimeError> {
        let name = container_name(&request.service_id, &request.deployment_id);

        let env: Vec<String> = request
            .environment
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();

        let binds: Vec<String> = request
            .volumes
            .iter()
            .map(|volume| format!("{}:{}:rw", volume.host_path, volume.container_path))
            .collect();

        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        for binding in &request.host_ports {
            let key = format!("{}/{}", binding.container_port, binding.protocol.as_str());
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(binding.host_port.to_string()),
                }]),
            );
        }

        let labels = HashMap::from([
            (LABEL_MANAGED_BY.to_string(), self.managed_by.clone()),
            (LABEL_SERVICE_ID.to_string(), request.service_id.to_string()),
            (LABEL_DEPLOYMENT_ID.to_string(), request.deployment_id.to_string()),
        ]);

        let host_config = HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            network_mode: Some(request.network_id.clone()),
            ..Default::default()
        };

        let config = Config {
            image: Some(request.image.clone()),
            env: Some(env),
            labels: Some(labels),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(map_docker_error)?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_docker_error)?;

        info!(
            container_id = %created.id,
            service_id = %request.service_id,
            deployment_id = %request.deployment_id,
            image = %request.image,
            "Started service container"
        );

        Ok(StartedContainer {
            container_id: created.id,
            hostname: name,
        })
    }

    async fn terminate_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        match self
            .docker
            .stop_container(container_id, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
            .await
        {
            Ok(()) => {}
            // 304: already stopped
            Err(DockerError::DockerResponseServerError { status_code: 304, .. }) => {}
            Err(e) => return Err(map_docker_error(e)),
        }

        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(container_id, Some(options))
            .await
            .map_err(map_docker_error)?;

        info!(container_id, "Terminated container");
        Ok(())
    }

    async fn pull_image_if_absent(&self, image: &str) -> Result<(), RuntimeError> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image, "Image present locally");
            return Ok(());
        }

        info!(image, "Pulling image");
        let options = Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            if let Err(e) = result {
                return Err(RuntimeError::Api(format!("Failed to pull image {}: {}", image, e)));
            }
        }
        info!(image, "Pulled image");
        Ok(())
    }

    async fn is_container_running(
        &self,
        service_id: &ServiceId,
        deployment_id: &DeploymentId,
    ) -> Result<bool, RuntimeError> {
        let containers = self
            .list_labeled(&[
                (LABEL_SERVICE_ID, service_id.as_str()),
                (LABEL_DEPLOYMENT_ID, deployment_id.as_str()),
            ])
            .await?;
        Ok(containers
            .iter()
            .any(|container| container.state.as_deref() == Some("running")))
    }
}

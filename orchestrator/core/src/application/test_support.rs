// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Shared fakes for application-layer unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::application::active_deployment::ActiveDeploymentResolver;
use crate::application::network_service::NetworkService;
use crate::domain::deployment::{DeploymentId, DeploymentRecord};
use crate::domain::runtime::{
    container_name, ContainerRuntime, ManagedContainer, RunContainerRequest, RuntimeError, StartedContainer,
};
use crate::domain::service::{ServiceId, ServiceRecord};
use crate::domain::service_descriptor::{IngressConfig, Networking, ServiceDescriptor, ServiceProxyConfig};
use crate::infrastructure::kv_store::InMemoryKeyValueStore;
use crate::infrastructure::repositories::{KvDeploymentRepository, KvServiceRepository};

#[derive(Default)]
pub struct FakeRuntime {
    pub networks: Mutex<HashMap<ServiceId, String>>,
    pub created_networks: Mutex<Vec<ServiceId>>,
    pub conflict_on_create: AtomicBool,
    pub attached: Mutex<HashSet<(String, String)>>,
    pub connections: Mutex<Vec<(String, String, Vec<String>)>>,
    pub disconnects: Mutex<Vec<(String, String)>>,
    pub containers: Mutex<Vec<ManagedContainer>>,
    pub started: Mutex<Vec<RunContainerRequest>>,
    pub terminated: Mutex<Vec<String>>,
    pub fail_terminate: Mutex<HashSet<String>>,
    pub pulled: Mutex<Vec<String>>,
    pub fail_pull: AtomicBool,
    pub reports_running: AtomicBool,
    pub running_polls: AtomicUsize,
}

impl FakeRuntime {
    pub fn add_container(&self, container_id: &str, service_id: Option<&str>, deployment_id: Option<&str>) {
        self.containers.lock().push(ManagedContainer {
            container_id: container_id.to_string(),
            service_id: service_id.map(ServiceId::new),
            deployment_id: deployment_id.map(DeploymentId::new),
            ip_addresses: Vec::<IpAddr>::new(),
            state: Some("running".to_string()),
        });
    }

    pub fn terminated_ids(&self) -> Vec<String> {
        let mut ids = self.terminated.lock().clone();
        ids.sort();
        ids
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn find_network(&self, service_id: &ServiceId) -> Result<Option<String>, RuntimeError> {
        Ok(self.networks.lock().get(service_id).cloned())
    }

    async fn create_network(&self, service_id: &ServiceId) -> Result<String, RuntimeError> {
        let network_id = format!("net-{}", service_id);
        self.networks.lock().insert(service_id.clone(), network_id.clone());
        if self.conflict_on_create.load(Ordering::SeqCst) {
            return Err(RuntimeError::Conflict("network already exists".to_string()));
        }
        self.created_networks.lock().push(service_id.clone());
        Ok(network_id)
    }

    async fn connect_network(
        &self,
        network_id: &str,
        container: &str,
        dns_aliases: Vec<String>,
    ) -> Result<(), RuntimeError> {
        self.attached.lock().insert((network_id.to_string(), container.to_string()));
        self.connections
            .lock()
            .push((network_id.to_string(), container.to_string(), dns_aliases));
        Ok(())
    }

    async fn disconnect_network(&self, network_id: &str, container: &str) -> Result<(), RuntimeError> {
        let key = (network_id.to_string(), container.to_string());
        if !self.attached.lock().remove(&key) {
            return Err(RuntimeError::NotConnected(container.to_string()));
        }
        self.disconnects.lock().push(key);
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ManagedContainer>, RuntimeError> {
        Ok(self.containers.lock().clone())
    }

    async fn run_container(&self, request: RunContainerRequest) -> Result<StartedContainer, RuntimeError> {
        let hostname = container_name(&request.service_id, &request.deployment_id);
        let container_id = format!("container-{}", hostname);
        self.add_container(
            &container_id,
            Some(request.service_id.as_str()),
            Some(request.deployment_id.as_str()),
        );
        self.started.lock().push(request);
        Ok(StartedContainer { container_id, hostname })
    }

    async fn terminate_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        if self.fail_terminate.lock().contains(container_id) {
            return Err(RuntimeError::NotFound(format!("No such container: {}", container_id)));
        }
        self.containers.lock().retain(|c| c.container_id != container_id);
        self.terminated.lock().push(container_id.to_string());
        Ok(())
    }

    async fn pull_image_if_absent(&self, image: &str) -> Result<(), RuntimeError> {
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(RuntimeError::Api(format!("pull access denied for {}", image)));
        }
        self.pulled.lock().push(image.to_string());
        Ok(())
    }

    async fn is_container_running(
        &self,
        _service_id: &ServiceId,
        _deployment_id: &DeploymentId,
    ) -> Result<bool, RuntimeError> {
        self.running_polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reports_running.load(Ordering::SeqCst))
    }
}

pub struct Fixture {
    pub runtime: Arc<FakeRuntime>,
    pub services: Arc<KvServiceRepository>,
    pub deployments: Arc<KvDeploymentRepository>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            runtime: Arc::new(FakeRuntime::default()),
            services: Arc::new(KvServiceRepository::new(Arc::new(
                InMemoryKeyValueStore::<ServiceRecord>::new(),
            ))),
            deployments: Arc::new(KvDeploymentRepository::new(Arc::new(
                InMemoryKeyValueStore::<DeploymentRecord>::new(),
            ))),
        }
    }

    pub fn resolver(&self) -> ActiveDeploymentResolver {
        ActiveDeploymentResolver::new(self.services.clone(), self.deployments.clone())
    }

    pub fn network_service(&self) -> NetworkService {
        NetworkService::new(self.runtime.clone(), self.resolver(), "/homelab-paas-1")
    }
}

pub fn descriptor(service_id: &str, container_port: u32) -> ServiceDescriptor {
    ServiceDescriptor {
        service_id: ServiceId::new(service_id),
        image: "img:latest".to_string(),
        networking: Networking {
            ingress: IngressConfig {
                container_port,
                public: false,
                authorized_users: None,
            },
            service_proxy: None,
            host_ports: None,
        },
        environment: BTreeMap::new(),
        volumes: Vec::new(),
    }
}

pub fn descriptor_with_mesh(service_id: &str, ingress: &[&str], egress: &[&str]) -> ServiceDescriptor {
    let mut descriptor = descriptor(service_id, 8080);
    descriptor.networking.service_proxy = Some(ServiceProxyConfig {
        ingress: Some(ingress.iter().map(|id| ServiceId::new(*id)).collect()),
        egress: Some(egress.iter().map(|id| ServiceId::new(*id)).collect()),
    });
    descriptor
}

// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the domain repository traits, both built
//! on a [`KeyValueStore`] so the same code runs against sled or memory.
//!
//! - **KvServiceRepository** - `ServiceRecord` keyed by service id
//! - **KvDeploymentRepository** - `DeploymentRecord` keyed by deployment id
//!
//! Every mutation is a single [`KeyValueStore::update`] that applies the
//! aggregate's own state-transition method, so illegal transitions and
//! missing records surface as `RepositoryError::Domain` without writing.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::domain::deployment::{ContainerEndpoint, DeploymentId, DeploymentRecord, DeploymentStatus};
use crate::domain::errors::DomainError;
use crate::domain::repository::{
    DeploymentRepository, KeyValueStore, RepositoryError, ServiceRepository, StorageBackend,
};
use crate::domain::service::{ServiceId, ServiceRecord};
use crate::domain::service_descriptor::ServiceDescriptor;
use crate::infrastructure::kv_store::{open_sled_database, InMemoryKeyValueStore, SledKeyValueStore};

const SERVICES_TREE: &str = "services";
const DEPLOYMENTS_TREE: &str = "deployments";

#[derive(Clone)]
pub struct KvServiceRepository {
    store: Arc<dyn KeyValueStore<ServiceRecord>>,
}

impl KvServiceRepository {
    pub fn new(store: Arc<dyn KeyValueStore<ServiceRecord>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ServiceRepository for KvServiceRepository {
    async fn query_all(&self) -> Result<Vec<ServiceRecord>, RepositoryError> {
        self.store.values()
    }

    async fn query(&self, service_id: &ServiceId) -> Result<Option<ServiceRecord>, RepositoryError> {
        self.store.get(service_id.as_str())
    }

    async fn create(&self, service_id: &ServiceId) -> Result<ServiceRecord, RepositoryError> {
        self.store.update(service_id.as_str(), &|current: Option<ServiceRecord>| match current {
            Some(_) => Err(DomainError::new("Service already exists")
                .with("service_id", service_id)
                .into()),
            None => Ok(ServiceRecord::new(service_id.clone())),
        })
    }

    async fn set_active_deployment(
        &self,
        service_id: &ServiceId,
        deployment_id: &DeploymentId,
    ) -> Result<(), RepositoryError> {
        self.store.update(service_id.as_str(), &|current: Option<ServiceRecord>| {
            let mut record = current.ok_or_else(|| {
                DomainError::new("Service does not exist").with("service_id", service_id)
            })?;
            record.active_deployment_id = Some(deployment_id.clone());
            Ok(record)
        })?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct KvDeploymentRepository {
    store: Arc<dyn KeyValueStore<DeploymentRecord>>,
}

impl KvDeploymentRepository {
    pub fn new(store: Arc<dyn KeyValueStore<DeploymentRecord>>) -> Self {
        Self { store }
    }

    fn mutate(
        &self,
        deployment_id: &DeploymentId,
        apply: &(dyn Fn(&mut DeploymentRecord) -> Result<(), DomainError> + Send + Sync),
    ) -> Result<(), RepositoryError> {
        self.store.update(deployment_id.as_str(), &|current: Option<DeploymentRecord>| {
            let mut record = current.ok_or_else(|| {
                DomainError::new("Deployment does not exist").with("deployment_id", deployment_id)
            })?;
            apply(&mut record)?;
            Ok(record)
        })?;
        Ok(())
    }
}

#[async_trait]
impl DeploymentRepository for KvDeploymentRepository {
    async fn query(&self, deployment_id: &DeploymentId) -> Result<Option<DeploymentRecord>, RepositoryError> {
        self.store.get(deployment_id.as_str())
    }

    async fn query_by_status(&self, status: DeploymentStatus) -> Result<Vec<DeploymentRecord>, RepositoryError> {
        Ok(self
            .store
            .values()?
            .into_iter()
            .filter(|record| record.status == status)
            .collect())
    }

    async fn query_for_service(&self, service_id: &ServiceId) -> Result<Vec<DeploymentRecord>, RepositoryError> {
        let mut records: Vec<DeploymentRecord> = self
            .store
            .values()?
            .into_iter()
            .filter(|record| &record.service_id == service_id)
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn create(
        &self,
        deployment_id: &DeploymentId,
        service_descriptor: ServiceDescriptor,
    ) -> Result<DeploymentRecord, RepositoryError> {
        let created_at = Utc::now();
        self.store.update(deployment_id.as_str(), &|current: Option<DeploymentRecord>| match current {
            Some(_) => Err(DomainError::new("Deployment already exists")
                .with("deployment_id", deployment_id)
                .into()),
            None => Ok(DeploymentRecord::new(
                deployment_id.clone(),
                service_descriptor.clone(),
                created_at,
            )),
        })
    }

    async fn mark_running(
        &self,
        deployment_id: &DeploymentId,
        container: ContainerEndpoint,
    ) -> Result<(), RepositoryError> {
        self.mutate(deployment_id, &|record| record.mark_running(container.clone()))
    }

    async fn mark_failed(&self, deployment_id: &DeploymentId, failure_reason: &str) -> Result<(), RepositoryError> {
        self.mutate(deployment_id, &|record| record.mark_failed(failure_reason))
    }

    async fn mark_cleaned_up(&self, deployment_id: &DeploymentId) -> Result<(), RepositoryError> {
        self.mutate(deployment_id, &|record| record.mark_cleaned_up())
    }
}

/// Both repositories over the configured backend.
pub fn build_repositories(
    backend: &StorageBackend,
    data_dir: &std::path::Path,
) -> Result<(Arc<KvServiceRepository>, Arc<KvDeploymentRepository>), RepositoryError> {
    match backend {
        StorageBackend::InMemory => Ok((
            Arc::new(KvServiceRepository::new(Arc::new(
                InMemoryKeyValueStore::<ServiceRecord>::new(),
            ))),
            Arc::new(KvDeploymentRepository::new(Arc::new(
                InMemoryKeyValueStore::<DeploymentRecord>::new(),
            ))),
        )),
        StorageBackend::Sled => {
            let db = open_sled_database(data_dir)?;
            let services: SledKeyValueStore<ServiceRecord> = SledKeyValueStore::open(&db, SERVICES_TREE)?;
            let deployments: SledKeyValueStore<DeploymentRecord> =
                SledKeyValueStore::open(&db, DEPLOYMENTS_TREE)?;
            Ok((
                Arc::new(KvServiceRepository::new(Arc::new(services))),
                Arc::new(KvDeploymentRepository::new(Arc::new(deployments))),
            ))
        }
    }
}

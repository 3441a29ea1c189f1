// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the two aggregates, one repository per
//! aggregate, implemented in `crate::infrastructure::repositories` on top of
//! a [`KeyValueStore`].
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `ServiceRepository` | `ServiceRecord` | `KvServiceRepository` |
//! | `DeploymentRepository` | `DeploymentRecord` | `KvDeploymentRepository` |
//!
//! ## Consistency
//!
//! There are no transactions across keys. Every mutation goes through
//! [`KeyValueStore::update`], which loads the current value, applies a
//! function and stores the result atomically for that key, so concurrent
//! readers never observe a half-written record.

use async_trait::async_trait;

use crate::domain::deployment::{ContainerEndpoint, DeploymentId, DeploymentRecord, DeploymentStatus};
use crate::domain::errors::DomainError;
use crate::domain::service::{ServiceId, ServiceRecord};
use crate::domain::service_descriptor::ServiceDescriptor;

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    Sled,
    InMemory,
}

/// Update function passed to [`KeyValueStore::update`]. It may be invoked more
/// than once when the backend retries a contended write.
pub type UpdateFn<'a, V> = &'a (dyn Fn(Option<V>) -> Result<V, RepositoryError> + Send + Sync);

/// Ordered key-value persistence used as the backing for both repositories.
pub trait KeyValueStore<V>: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<V>, RepositoryError>;

    fn set(&self, key: &str, value: V) -> Result<(), RepositoryError>;

    /// Atomically replace the value at `key` with `update(current)`.
    /// Returns the stored value. If `update` fails nothing is written.
    fn update(&self, key: &str, update: UpdateFn<'_, V>) -> Result<V, RepositoryError>;

    /// All values in key order.
    fn values(&self) -> Result<Vec<V>, RepositoryError>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn query_all(&self) -> Result<Vec<ServiceRecord>, RepositoryError>;

    async fn query(&self, service_id: &ServiceId) -> Result<Option<ServiceRecord>, RepositoryError>;

    /// Fails if the service already exists.
    async fn create(&self, service_id: &ServiceId) -> Result<ServiceRecord, RepositoryError>;

    /// Fails if the service does not exist.
    async fn set_active_deployment(
        &self,
        service_id: &ServiceId,
        deployment_id: &DeploymentId,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    async fn query(&self, deployment_id: &DeploymentId) -> Result<Option<DeploymentRecord>, RepositoryError>;

    async fn query_by_status(&self, status: DeploymentStatus) -> Result<Vec<DeploymentRecord>, RepositoryError>;

    /// Deployments of one service, newest first.
    async fn query_for_service(&self, service_id: &ServiceId) -> Result<Vec<DeploymentRecord>, RepositoryError>;

    /// Persist a new record in `deploying` status.
    async fn create(
        &self,
        deployment_id: &DeploymentId,
        service_descriptor: ServiceDescriptor,
    ) -> Result<DeploymentRecord, RepositoryError>;

    async fn mark_running(
        &self,
        deployment_id: &DeploymentId,
        container: ContainerEndpoint,
    ) -> Result<(), RepositoryError>;

    async fn mark_failed(&self, deployment_id: &DeploymentId, failure_reason: &str) -> Result<(), RepositoryError>;

    async fn mark_cleaned_up(&self, deployment_id: &DeploymentId) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<sled::Error> for RepositoryError {
    fn from(err: sled::Error) -> Self {
        RepositoryError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

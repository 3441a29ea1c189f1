// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Deployment aggregate
//!
//! One attempt at running a service descriptor as a container. The record is
//! created in `deploying` before any side effect and then moves through a
//! small state machine:
//!
//! ```text
//! deploying ──► running ──► cleaned-up
//!     │
//!     └──────► failed
//! ```
//!
//! Any other transition is rejected with a [`DomainError`]. The persisted
//! JSON shape of [`DeploymentRecord`] is the durable on-disk contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::DomainError;
use crate::domain::service::ServiceId;
use crate::domain::service_descriptor::ServiceDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id for a deploy attempt. The simple (hyphen-less) form keeps
    /// container names short.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeploymentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    Deploying,
    Running,
    Failed,
    CleanedUp,
}

impl DeploymentStatus {
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        matches!(
            (self, next),
            (DeploymentStatus::Deploying, DeploymentStatus::Running)
                | (DeploymentStatus::Deploying, DeploymentStatus::Failed)
                | (DeploymentStatus::Running, DeploymentStatus::CleanedUp)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::CleanedUp => "cleaned-up",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network endpoint of a running deployment's container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEndpoint {
    pub hostname: String,
    pub port: u16,
}

impl ContainerEndpoint {
    pub fn authority(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub service_id: ServiceId,
    pub deployment_id: DeploymentId,
    pub created_at: DateTime<Utc>,
    pub service_descriptor: ServiceDescriptor,
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerEndpoint>,
}

impl DeploymentRecord {
    pub fn new(
        deployment_id: DeploymentId,
        service_descriptor: ServiceDescriptor,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            service_id: service_descriptor.service_id.clone(),
            deployment_id,
            created_at,
            service_descriptor,
            status: DeploymentStatus::Deploying,
            failure_reason: None,
            container: None,
        }
    }

    pub fn mark_running(&mut self, container: ContainerEndpoint) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::Running)?;
        self.container = Some(container);
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    pub fn mark_cleaned_up(&mut self) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::CleanedUp)?;
        self.container = None;
        Ok(())
    }

    fn transition(&mut self, next: DeploymentStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::new("Illegal deployment status transition")
                .with("deployment_id", &self.deployment_id)
                .with("from", self.status)
                .with("to", next));
        }
        self.status = next;
        Ok(())
    }
}

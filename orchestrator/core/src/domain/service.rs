// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Service aggregate
//!
//! A service is the logical deployable unit addressed by its `ServiceId`. The
//! record itself is deliberately thin: it only remembers which deployment is
//! currently receiving traffic. Everything else lives on the deployment.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::deployment::DeploymentId;

/// Stable identifier of a service, also used as its DNS label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// DNS name other services use to reach this one through the mesh.
    pub fn mesh_alias(&self) -> String {
        format!("{}.mesh", self.0)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Persisted service record.
///
/// `active_deployment_id`, when present, always references a deployment in
/// `running` status. The deploy task only sets it after the deployment has
/// been marked running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub service_id: ServiceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deployment_id: Option<DeploymentId>,
}

impl ServiceRecord {
    pub fn new(service_id: ServiceId) -> Self {
        Self {
            service_id,
            active_deployment_id: None,
        }
    }
}

// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

//! Service Descriptor
//!
//! The declarative document a caller submits to deploy a service. A snapshot
//! of it is stored on every deployment record, so later edits never change
//! what a past deployment ran.
//!
//! ```yaml
//! serviceId: svc1
//! image: ghcr.io/me/svc1:latest
//! networking:
//!   ingress:
//!     containerPort: 8080
//!     public: false
//!     authorizedUsers: [alice]
//!   serviceProxy:
//!     ingress: [svc-a]
//!     egress: [svc-b]
//!   hostPorts:
//!     - containerPort: 53
//!       hostPort: 53
//!       protocol: udp
//! environment:
//!   LOG_LEVEL: debug
//! volumes:
//!   - hostPath: /srv/svc1
//!     containerPath: /data
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::errors::ValidationError;
use crate::domain::service::ServiceId;

pub const MAX_SERVICE_ID_LENGTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub service_id: ServiceId,
    pub image: String,
    pub networking: Networking,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Networking {
    pub ingress: IngressConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_proxy: Option<ServiceProxyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_ports: Option<Vec<HostPortBinding>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    pub container_port: u32,
    #[serde(default)]
    pub public: bool,
    /// `None` lets any platform-authorized user through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_users: Option<Vec<String>>,
}

/// Mesh allow-lists. Both sides of a call must opt in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProxyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Vec<ServiceId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress: Option<Vec<ServiceId>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPortBinding {
    pub container_port: u32,
    pub host_port: u32,
    #[serde(default)]
    pub protocol: PortProtocol,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    #[default]
    Tcp,
    Udp,
}

impl PortProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortProtocol::Tcp => "tcp",
            PortProtocol::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeBinding {
    pub host_path: String,
    pub container_path: String,
}

impl ServiceDescriptor {
    /// Parse and validate a YAML (or JSON, which is valid YAML) document.
    pub fn from_yaml_str(document: &str) -> Result<Self, ValidationError> {
        let descriptor: Self = serde_yaml::from_str(document)
            .map_err(|e| ValidationError::new(vec![e.to_string()]))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Parse and validate an already-decoded JSON document.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ValidationError> {
        let descriptor: Self = serde_json::from_value(value)
            .map_err(|e| ValidationError::new(vec![e.to_string()]))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        let service_id = self.service_id.as_str();
        if service_id.is_empty() {
            errors.push("serviceId: must not be empty".to_string());
        } else {
            if service_id.len() > MAX_SERVICE_ID_LENGTH {
                errors.push(format!(
                    "serviceId: must be at most {} characters",
                    MAX_SERVICE_ID_LENGTH
                ));
            }
            if !is_dns_label(service_id) {
                errors.push(
                    "serviceId: must contain only lowercase letters, digits and '-', and not start or end with '-'"
                        .to_string(),
                );
            }
        }

        if self.image.trim().is_empty() {
            errors.push("image: must not be empty".to_string());
        }

        if !is_port(self.networking.ingress.container_port) {
            errors.push("networking.ingress.containerPort: must be between 1 and 65535".to_string());
        }

        for (i, binding) in self.host_ports().iter().enumerate() {
            if !is_port(binding.container_port) {
                errors.push(format!(
                    "networking.hostPorts[{}].containerPort: must be between 1 and 65535",
                    i
                ));
            }
            if !is_port(binding.host_port) {
                errors.push(format!(
                    "networking.hostPorts[{}].hostPort: must be between 1 and 65535",
                    i
                ));
            }
        }

        for (i, volume) in self.volumes.iter().enumerate() {
            if !volume.host_path.starts_with('/') {
                errors.push(format!("volumes[{}].hostPath: must be an absolute path", i));
            }
            if !volume.container_path.starts_with('/') {
                errors.push(format!("volumes[{}].containerPath: must be an absolute path", i));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(errors))
        }
    }

    pub fn is_public(&self) -> bool {
        self.networking.ingress.public
    }

    pub fn authorized_users(&self) -> Option<&[String]> {
        self.networking.ingress.authorized_users.as_deref()
    }

    pub fn host_ports(&self) -> &[HostPortBinding] {
        self.networking.host_ports.as_deref().unwrap_or_default()
    }

    pub fn mesh_ingress(&self) -> &[ServiceId] {
        self.networking
            .service_proxy
            .as_ref()
            .and_then(|proxy| proxy.ingress.as_deref())
            .unwrap_or_default()
    }

    pub fn mesh_egress(&self) -> &[ServiceId] {
        self.networking
            .service_proxy
            .as_ref()
            .and_then(|proxy| proxy.egress.as_deref())
            .unwrap_or_default()
    }
}

fn is_port(port: u32) -> bool {
    (1..=65_535).contains(&port)
}

fn is_dns_label(label: &str) -> bool {
    !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

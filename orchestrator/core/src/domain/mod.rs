// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain model: services, deployments, descriptors, configuration and the
//! collaborator interfaces (persistence, container runtime, authentication).

pub mod auth;
pub mod deployment;
pub mod errors;
pub mod platform_config;
pub mod repository;
pub mod runtime;
pub mod service;
pub mod service_descriptor;

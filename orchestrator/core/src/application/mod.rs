// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod lifecycle;
pub mod task_runner;
pub mod active_deployment;
pub mod network_service;
pub mod deploy_task;
pub mod deploy_service;
pub mod cleanup_task;
pub mod network_sync_task;

#[cfg(test)]
pub(crate) mod test_support;

pub use deploy_service::DeployService;
pub use deploy_task::{DeployTask, DeployTaskDescriptor, ReadinessPolicy, TokioSleeper};
pub use cleanup_task::CleanupTask;
pub use network_sync_task::NetworkSyncTask;

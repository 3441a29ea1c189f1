// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! Entry point for deploy requests: assigns a deployment id and queues the
//! work. The deployment record itself is created by the deploy task when the
//! queue runner picks it up.

use std::sync::Arc;
use tracing::info;

use crate::application::deploy_task::DeployTaskDescriptor;
use crate::application::task_runner::TaskQueue;
use crate::domain::deployment::DeploymentId;
use crate::domain::service_descriptor::ServiceDescriptor;

pub struct DeployService {
    queue: Arc<dyn TaskQueue<DeployTaskDescriptor>>,
}

impl DeployService {
    pub fn new(queue: Arc<dyn TaskQueue<DeployTaskDescriptor>>) -> Self {
        Self { queue }
    }

    pub fn start_deployment(&self, service_descriptor: ServiceDescriptor) -> DeploymentId {
        let deployment_id = DeploymentId::generate();
        let service_id = service_descriptor.service_id.clone();
        let task_id = self.queue.enqueue(DeployTaskDescriptor {
            service_id: service_id.clone(),
            deployment_id: deployment_id.clone(),
            service_descriptor,
        });
        info!(
            task_id = %task_id,
            service_id = %service_id,
            deployment_id = %deployment_id,
            queued = self.queue.len(),
            "Queued deployment"
        );
        deployment_id
    }
}

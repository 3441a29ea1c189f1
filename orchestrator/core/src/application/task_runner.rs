// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Task Scheduling
//!
//! Three background shapes, all driven by the shared [`Lifecycle`]:
//!
//! | Runner | Shape | On error |
//! |--------|-------|----------|
//! | [`QueueTaskRunner`] | single worker pulling from a [`TaskQueue`], idle sleep when empty | logged, loop continues |
//! | [`PeriodicTaskRunner`] | run, then sleep for the period | logged, loop continues |
//! | [`StartupTaskRunner`] | run once at boot | logged, boot continues |
//!
//! Loops exit after the current iteration once the lifecycle is closed.
//! The queue is in-process only; queued tasks are lost on restart.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::application::lifecycle::Lifecycle;

/// A queued unit of work together with the id it was assigned on enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEnvelope<T> {
    pub task_id: String,
    pub task: T,
}

pub trait TaskQueue<T>: Send + Sync {
    /// Returns the assigned task id.
    fn enqueue(&self, task: T) -> String;

    fn dequeue(&self) -> Option<TaskEnvelope<T>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// First-in-first-out in-process queue.
pub struct InMemoryTaskQueue<T> {
    items: Mutex<VecDeque<TaskEnvelope<T>>>,
}

impl<T> InMemoryTaskQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> Default for InMemoryTaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> TaskQueue<T> for InMemoryTaskQueue<T> {
    fn enqueue(&self, task: T) -> String {
        let task_id = Uuid::new_v4().simple().to_string();
        self.items.lock().push_back(TaskEnvelope {
            task_id: task_id.clone(),
            task,
        });
        task_id
    }

    fn dequeue(&self) -> Option<TaskEnvelope<T>> {
        self.items.lock().pop_front()
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }
}

#[async_trait]
pub trait QueueTask<T: Send + 'static>: Send + Sync {
    async fn run(&self, envelope: TaskEnvelope<T>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait StartupTask: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> anyhow::Result<()>;
}

pub struct QueueTaskRunner<T: Send + 'static> {
    queue: Arc<dyn TaskQueue<T>>,
    task: Arc<dyn QueueTask<T>>,
    idle_delay: Duration,
    lifecycle: Lifecycle,
}

impl<T: Send + 'static> QueueTaskRunner<T> {
    pub fn new(
        queue: Arc<dyn TaskQueue<T>>,
        task: Arc<dyn QueueTask<T>>,
        idle_delay: Duration,
        lifecycle: Lifecycle,
    ) -> Self {
        Self {
            queue,
            task,
            idle_delay,
            lifecycle,
        }
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    pub async fn run(&self) {
        info!(idle_delay_ms = self.idle_delay.as_millis() as u64, "Starting queue task runner");

        while self.lifecycle.is_open() {
            let Some(envelope) = self.queue.dequeue() else {
                self.lifecycle.sleep(self.idle_delay).await;
                continue;
            };

            let task_id = envelope.task_id.clone();
            debug!(task_id = %task_id, "Running queued task");
            if let Err(e) = self.task.run(envelope).await {
                error!(task_id = %task_id, error = %e, "Queued task failed");
            }
        }

        info!("Queue task runner stopped");
    }
}

pub struct PeriodicTaskRunner {
    task: Arc<dyn PeriodicTask>,
    period: Duration,
    lifecycle: Lifecycle,
}

impl PeriodicTaskRunner {
    pub fn new(task: Arc<dyn PeriodicTask>, period: Duration, lifecycle: Lifecycle) -> Self {
        Self {
            task,
            period,
            lifecycle,
        }
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    pub async fn run(&self) {
        let name = self.task.name();
        info!(task = name, period_ms = self.period.as_millis() as u64, "Starting periodic task runner");

        while self.lifecycle.is_open() {
            if let Err(e) = self.task.run().await {
                error!(task = name, error = %e, "Periodic task failed");
            }
            self.lifecycle.sleep(self.period).await;
        }

        info!(task = name, "Periodic task runner stopped");
    }
}

pub struct StartupTaskRunner {
    tasks: Vec<Arc<dyn StartupTask>>,
}

impl StartupTaskRunner {
    pub fn new(tasks: Vec<Arc<dyn StartupTask>>) -> Self {
        Self { tasks }
    }

    /// Run every task once, in order.
    pub async fn run(&self) {
        for task in &self.tasks {
            info!(task = task.name(), "Running startup task");
            if let Err(e) = task.run().await {
                error!(task = task.name(), error = %e, "Startup task failed");
            }
        }
    }
}

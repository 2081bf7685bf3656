//! Task tracker - polls remote tasks to a terminal state.
//!
//! Each tracker owns its own polling loop; trackers share nothing but the
//! (immutable) client, so sibling operations can be awaited concurrently.
//! The poll wait is the only suspension point of a reconciliation pass.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::RemoteClient;
use crate::config::{OperationClass, ReconcileContext};
use crate::error::{ReconcileError, Result};
use crate::model::{RemoteTask, TaskStatus};

/// Terminal state of a tracked task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded(RemoteTask),
    Failed(RemoteTask),
}

impl TaskOutcome {
    pub fn task(&self) -> &RemoteTask {
        match self {
            TaskOutcome::Succeeded(task) | TaskOutcome::Failed(task) => task,
        }
    }

    /// Turn a `Failed` outcome into a recoverable `TaskFailed` error.
    pub fn into_result(self) -> Result<RemoteTask> {
        match self {
            TaskOutcome::Succeeded(task) => Ok(task),
            TaskOutcome::Failed(task) => Err(ReconcileError::TaskFailed {
                task_id: task.id,
                fatal: false,
                errors: task.errors,
            }),
        }
    }
}

/// Polls a remote task by ID until it succeeds, fails, times out, or the
/// caller cancels.
pub struct TaskTracker<'a> {
    client: &'a dyn RemoteClient,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl<'a> TaskTracker<'a> {
    pub fn new(client: &'a dyn RemoteClient, poll_interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            client,
            poll_interval,
            cancel,
        }
    }

    /// Tracker with the poll cadence configured for `class`.
    pub fn for_class(ctx: &'a ReconcileContext, class: OperationClass) -> Self {
        Self::new(
            ctx.client.as_ref(),
            ctx.config.poll_interval(class),
            ctx.cancel.clone(),
        )
    }

    /// Wait for a task to reach a terminal state.
    ///
    /// With `must_succeed` a FAILED task is a fatal error; otherwise it is
    /// returned as [`TaskOutcome::Failed`] for the caller to inspect.
    pub async fn await_task(
        &self,
        task_id: &str,
        timeout: Duration,
        must_succeed: bool,
    ) -> Result<TaskOutcome> {
        let deadline = Instant::now() + timeout;
        let mut polls = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ReconcileError::Cancelled {
                    task_id: task_id.to_string(),
                });
            }

            let task = self
                .client
                .get_task(task_id)
                .await
                .map_err(ReconcileError::remote("get task"))?;
            polls += 1;

            match task.status {
                TaskStatus::Successful => {
                    info!("Task {} succeeded after {} poll(s)", task_id, polls);
                    return Ok(TaskOutcome::Succeeded(task));
                }
                TaskStatus::Failed if must_succeed => {
                    warn!("Task {} failed: {:?}", task_id, task.errors);
                    return Err(ReconcileError::TaskFailed {
                        task_id: task.id,
                        fatal: true,
                        errors: task.errors,
                    });
                }
                TaskStatus::Failed => {
                    warn!("Task {} failed: {:?}", task_id, task.errors);
                    return Ok(TaskOutcome::Failed(task));
                }
                TaskStatus::Unknown => {
                    warn!("Task {} reports an unrecognised status, still waiting", task_id);
                }
                TaskStatus::Pending | TaskStatus::InProgress => {
                    debug!("Task {} is {:?}", task_id, task.status);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("Task {} still running after {:?}", task_id, timeout);
                return Err(ReconcileError::TaskTimeout {
                    task_id: task_id.to_string(),
                    timeout,
                });
            }

            let wait = self.poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Stopped waiting for task {}; the remote task keeps running", task_id);
                    return Err(ReconcileError::Cancelled {
                        task_id: task_id.to_string(),
                    });
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Identifier of the resource of `kind` produced by a task.
    pub async fn get_resource_id(&self, task_id: &str, kind: &str) -> Result<String> {
        let task = self
            .client
            .get_task(task_id)
            .await
            .map_err(ReconcileError::remote("get task"))?;
        resource_id(&task, kind)
    }
}

/// Identifier of the resource of `kind` referenced by `task`.
pub fn resource_id(task: &RemoteTask, kind: &str) -> Result<String> {
    task.resources
        .iter()
        .find(|r| r.kind.eq_ignore_ascii_case(kind))
        .map(|r| r.id.clone())
        .ok_or_else(|| ReconcileError::TaskResourceMissing {
            task_id: task.id.clone(),
            kind: kind.to_string(),
        })
}

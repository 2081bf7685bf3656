//! Reconcilers for workload domains and clusters.
//!
//! Each reconciler compares desired state with the remote management plane
//! and drives it through build → validate → submit → await, then rebuilds
//! the observed state from fresh remote reads.

pub mod cluster;
pub mod domain;

use std::future::Future;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info};

use crate::config::{OperationClass, ReconcileContext};
use crate::error::{MemberFailure, ReconcileError, Result};
use crate::model::{DeleteResponse, TaskRef};
use crate::task::TaskTracker;

pub use cluster::ClusterReconciler;
pub use domain::DomainReconciler;

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Desired state supplied by the caller.
    type Desired: Send + Sync;
    /// State rebuilt from remote reads.
    type Observed: Send + Sync;

    /// Create the resource and read it back.
    async fn create(&self, ctx: &ReconcileContext, desired: &Self::Desired)
    -> Result<Self::Observed>;

    /// Finish a create whose task was submitted by an earlier pass that timed
    /// out or was cancelled, then read the resource back.
    async fn resume_create(
        &self,
        ctx: &ReconcileContext,
        task_id: &str,
        desired: &Self::Desired,
    ) -> Result<Self::Observed>;

    /// Read the resource by ID. `NotFound` tells the caller to drop its record.
    async fn read(
        &self,
        ctx: &ReconcileContext,
        id: &str,
        desired: &Self::Desired,
    ) -> Result<Self::Observed>;

    /// Read the resource again using the state it was last applied with,
    /// so edits made to the desired state since then stay visible to the
    /// next update.
    async fn refresh(
        &self,
        ctx: &ReconcileContext,
        prior: &Self::Observed,
    ) -> Result<Self::Observed>;

    /// Converge the resource from `prior` to `desired` and read it back.
    async fn update(
        &self,
        ctx: &ReconcileContext,
        prior: &Self::Observed,
        desired: &Self::Desired,
    ) -> Result<Self::Observed>;

    /// Delete the resource.
    async fn delete(&self, ctx: &ReconcileContext, prior: &Self::Observed) -> Result<()>;
}

/// Wait for a mark-for-deletion update. A failed mark stops the delete.
pub(crate) async fn await_deletion_mark(ctx: &ReconcileContext, mark: &TaskRef) -> Result<()> {
    let tracker = TaskTracker::for_class(ctx, OperationClass::Delete);
    tracker
        .await_task(&mark.id, ctx.config.delete_timeout, false)
        .await?
        .into_result()?;
    Ok(())
}

/// Wait for a submitted delete.
///
/// The delete task ID comes from the delete response when there is one and
/// from the mark-for-deletion update otherwise.
pub(crate) async fn await_deletion(
    ctx: &ReconcileContext,
    mark: &TaskRef,
    response: DeleteResponse,
) -> Result<()> {
    let task_id = match response.task() {
        Some(task) => task.id.clone(),
        None => {
            debug!("Delete returned no task, tracking update task {}", mark.id);
            mark.id.clone()
        }
    };
    let tracker = TaskTracker::for_class(ctx, OperationClass::Delete);
    tracker
        .await_task(&task_id, ctx.config.delete_timeout, true)
        .await?;
    Ok(())
}

/// Run independent member operations concurrently and collect every failure.
pub(crate) async fn run_members<I, F>(operation: &'static str, members: I) -> Result<()>
where
    I: IntoIterator<Item = (String, F)>,
    F: Future<Output = Result<()>>,
{
    let (names, futures): (Vec<String>, Vec<F>) = members.into_iter().unzip();
    if names.is_empty() {
        return Ok(());
    }
    info!("Running {} {} operation(s)", names.len(), operation);

    let failures: Vec<MemberFailure> = names
        .into_iter()
        .zip(join_all(futures).await)
        .filter_map(|(member, result)| {
            result.err().map(|error| MemberFailure {
                member,
                operation,
                error,
            })
        })
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ReconcileError::Members(failures))
    }
}

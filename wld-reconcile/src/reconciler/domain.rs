//! Domain reconciler.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::cluster::{
    create_cluster, delete_cluster, observe_cluster, unmanaged_cluster, update_cluster_hosts,
};
use super::{Reconciler, await_deletion, await_deletion_mark, run_members};
use crate::config::{OperationClass, ReconcileContext};
use crate::diff::{ClusterChanges, DomainUpdatePlan, plan_domain_update};
use crate::error::{ReconcileError, Result};
use crate::model::{
    ClusterDesiredState, ClusterObservedState, DomainDesiredState, DomainObservedState,
    RemoteCluster, VcenterObservedState,
};
use crate::spec::{build_create_spec, build_domain_deletion_mark, build_update_spec};
use crate::task::TaskTracker;
use crate::validator::Validator;

/// Reconciler for workload domains and their nested clusters.
#[derive(Debug, Default)]
pub struct DomainReconciler;

impl DomainReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Compute the plan an update from `prior` to `desired` would execute.
    pub fn plan(
        &self,
        ctx: &ReconcileContext,
        prior: &DomainObservedState,
        desired: &DomainDesiredState,
    ) -> Result<DomainUpdatePlan> {
        plan_domain_update(
            &prior.applied(),
            desired,
            ctx.client.supports_combined_expand_contract(),
        )
    }

    async fn rename(
        &self,
        ctx: &ReconcileContext,
        id: &str,
        prior: &DomainDesiredState,
        desired: &DomainDesiredState,
    ) -> Result<()> {
        let Some(spec) = build_update_spec(prior, desired) else {
            return Ok(());
        };
        info!("Renaming domain {} to '{}'", id, desired.name);
        let task = ctx
            .client
            .update_domain(id, &spec)
            .await
            .map_err(ReconcileError::remote("update domain"))?;

        TaskTracker::for_class(ctx, OperationClass::Update)
            .await_task(&task.id, ctx.config.update_timeout, false)
            .await?
            .into_result()?;
        ctx.audit.domain_renamed(id, &desired.name);
        Ok(())
    }

    /// Add clusters, then remove clusters once every addition succeeded.
    async fn change_membership(
        &self,
        ctx: &ReconcileContext,
        domain_id: &str,
        added: &[ClusterDesiredState],
        removed: &[ClusterDesiredState],
    ) -> Result<()> {
        run_members(
            "create cluster",
            added.iter().map(|cluster| {
                (cluster.name.clone(), async move {
                    create_cluster(ctx, domain_id, cluster).await.map(|_| ())
                })
            }),
        )
        .await?;

        let mut removals = Vec::with_capacity(removed.len());
        for cluster in removed {
            let id = cluster.id.clone().ok_or_else(|| {
                ReconcileError::DataIntegrity(format!(
                    "cluster '{}' has no remote identifier",
                    cluster.name
                ))
            })?;
            removals.push((cluster.name.clone(), id));
        }
        run_members(
            "delete cluster",
            removals
                .iter()
                .map(|(name, id)| (name.clone(), delete_cluster(ctx, id))),
        )
        .await
    }
}

#[async_trait]
impl Reconciler for DomainReconciler {
    type Desired = DomainDesiredState;
    type Observed = DomainObservedState;

    async fn create(
        &self,
        ctx: &ReconcileContext,
        desired: &DomainDesiredState,
    ) -> Result<DomainObservedState> {
        let spec = build_create_spec(desired)?;
        Validator::new(ctx.client.as_ref())
            .validate_domain(&spec)
            .await?
            .into_result()?;

        info!(
            "Creating domain '{}' with {} cluster(s)",
            desired.name,
            desired.clusters.len()
        );
        let task = ctx
            .client
            .create_domain(&spec)
            .await
            .map_err(ReconcileError::remote("create domain"))?;

        let id = await_domain_creation(ctx, &task.id, &desired.name).await?;
        self.read(ctx, &id, desired).await
    }

    async fn resume_create(
        &self,
        ctx: &ReconcileContext,
        task_id: &str,
        desired: &DomainDesiredState,
    ) -> Result<DomainObservedState> {
        let id = await_domain_creation(ctx, task_id, &desired.name).await?;
        self.read(ctx, &id, desired).await
    }

    async fn read(
        &self,
        ctx: &ReconcileContext,
        id: &str,
        desired: &DomainDesiredState,
    ) -> Result<DomainObservedState> {
        let domain = ctx
            .client
            .get_domain(id)
            .await
            .map_err(ReconcileError::remote("get domain"))?
            .ok_or_else(|| ReconcileError::NotFound(format!("domain {}", id)))?;

        let vcenter = domain.vcenters.first().ok_or_else(|| {
            ReconcileError::DataIntegrity(format!(
                "no vCenter Server instance found for domain {}",
                id
            ))
        })?;

        let remote_clusters: Vec<RemoteCluster> = ctx
            .client
            .list_clusters()
            .await
            .map_err(ReconcileError::remote("list clusters"))?
            .into_iter()
            .filter(|c| domain.cluster_ids.contains(&c.id))
            .collect();

        let clusters = match_clusters(&desired.clusters, &remote_clusters, id);
        debug!(
            "Read domain {} with {} managed cluster(s)",
            id,
            clusters.len()
        );

        Ok(DomainObservedState {
            id: domain.id.clone(),
            desired: DomainDesiredState {
                name: domain.name.clone(),
                clusters: clusters.iter().map(|c| c.desired.clone()).collect(),
                ..desired.clone()
            },
            status: domain.status.clone(),
            domain_type: domain.domain_type.clone(),
            sso_id: domain.sso_id.clone(),
            sso_name: domain.sso_name.clone(),
            is_management_sso_domain: domain.is_management_sso_domain,
            vcenter: VcenterObservedState {
                id: vcenter.id.clone(),
                fqdn: vcenter.fqdn.clone(),
            },
            clusters,
        })
    }

    async fn refresh(
        &self,
        ctx: &ReconcileContext,
        prior: &DomainObservedState,
    ) -> Result<DomainObservedState> {
        self.read(ctx, &prior.id, &prior.applied()).await
    }

    async fn update(
        &self,
        ctx: &ReconcileContext,
        prior: &DomainObservedState,
        desired: &DomainDesiredState,
    ) -> Result<DomainObservedState> {
        let applied = prior.applied();
        let plan = self.plan(ctx, prior, desired)?;
        if plan.is_empty() {
            info!("Domain {} is up to date", prior.id);
            return self.refresh(ctx, prior).await;
        }

        if plan.rename.is_some() {
            self.rename(ctx, &prior.id, &applied, desired).await?;
        }

        match &plan.clusters {
            ClusterChanges::Unchanged => {}
            ClusterChanges::Membership { added, removed } => {
                self.change_membership(ctx, &prior.id, added, removed)
                    .await?;
            }
            ClusterChanges::InPlace(updates) => {
                run_members(
                    "update cluster",
                    updates.iter().map(|update| {
                        (update.cluster_name.clone(), update_cluster_hosts(ctx, update))
                    }),
                )
                .await?;
            }
        }

        self.read(ctx, &prior.id, desired).await
    }

    async fn delete(&self, ctx: &ReconcileContext, prior: &DomainObservedState) -> Result<()> {
        info!("Deleting domain {} ({})", prior.desired.name, prior.id);
        let mark = ctx
            .client
            .update_domain(&prior.id, &build_domain_deletion_mark())
            .await
            .map_err(ReconcileError::remote("mark domain for deletion"))?;
        await_deletion_mark(ctx, &mark).await?;
        ctx.audit.domain_marked_for_deletion(&prior.id);

        let response = ctx
            .client
            .delete_domain(&prior.id)
            .await
            .map_err(ReconcileError::remote("delete domain"))?;
        await_deletion(ctx, &mark, response).await?;

        ctx.audit.domain_deleted(&prior.id);
        Ok(())
    }
}

async fn await_domain_creation(ctx: &ReconcileContext, task_id: &str, name: &str) -> Result<String> {
    let tracker = TaskTracker::for_class(ctx, OperationClass::Create);
    tracker
        .await_task(task_id, ctx.config.create_timeout, true)
        .await?;
    let id = tracker.get_resource_id(task_id, "Domain").await?;

    ctx.audit.domain_created(&id, name);
    Ok(id)
}

/// Pair desired clusters with the domain's remote clusters, by remote
/// identifier when known and by name otherwise.
///
/// Desired clusters missing remotely are left out so the next update adds
/// them again. Remote clusters nobody asked for are kept, so the next update
/// removes them.
fn match_clusters(
    desired: &[ClusterDesiredState],
    remote: &[RemoteCluster],
    domain_id: &str,
) -> Vec<ClusterObservedState> {
    let mut unmatched: Vec<&RemoteCluster> = remote.iter().collect();
    let mut observed = Vec::with_capacity(desired.len());

    for cluster in desired {
        let pos = cluster
            .id
            .as_ref()
            .and_then(|id| unmatched.iter().position(|r| r.id == *id))
            .or_else(|| unmatched.iter().position(|r| r.name == cluster.name));
        match pos {
            Some(pos) => {
                let mut state = observe_cluster(cluster, unmatched.remove(pos));
                state.domain_id.get_or_insert_with(|| domain_id.to_string());
                observed.push(state);
            }
            None => warn!(
                "Cluster '{}' not found in domain {}",
                cluster.name, domain_id
            ),
        }
    }
    for cluster in unmatched {
        warn!(
            "Cluster '{}' ({}) in domain {} is not in the desired state",
            cluster.name, cluster.id, domain_id
        );
        let mut state = observe_cluster(&unmanaged_cluster(cluster), cluster);
        state.domain_id.get_or_insert_with(|| domain_id.to_string());
        observed.push(state);
    }
    observed
}

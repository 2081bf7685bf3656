//! Cluster reconciler - clusters managed on their own or inside a domain.
//!
//! The sub-operations here follow build → validate → submit → await and are
//! reused by the domain reconciler's update path.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Reconciler, await_deletion, await_deletion_mark};
use crate::config::{OperationClass, ReconcileContext};
use crate::diff::{ClusterHostUpdate, HostChange, plan_cluster_update};
use crate::error::{ReconcileError, Result};
use crate::model::{
    ClusterDesiredState, ClusterObservedState, ClusterResource, DatastoreDesiredState,
    HostMembership, HostObservedState, RemoteCluster,
};
use crate::spec::{
    ClusterUpdateSpec, build_cluster_creation_spec, build_cluster_deletion_mark,
    build_cluster_rename_spec, build_host_change_spec,
};
use crate::task::TaskTracker;
use crate::validator::Validator;

/// Reconciler for a standalone cluster attached to an existing domain.
#[derive(Debug, Default)]
pub struct ClusterReconciler;

impl ClusterReconciler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Reconciler for ClusterReconciler {
    type Desired = ClusterResource;
    type Observed = ClusterObservedState;

    async fn create(
        &self,
        ctx: &ReconcileContext,
        desired: &ClusterResource,
    ) -> Result<ClusterObservedState> {
        let id = create_cluster(ctx, &desired.domain_id, &desired.cluster).await?;
        self.read(ctx, &id, desired).await
    }

    async fn resume_create(
        &self,
        ctx: &ReconcileContext,
        task_id: &str,
        desired: &ClusterResource,
    ) -> Result<ClusterObservedState> {
        let id = await_cluster_creation(ctx, &desired.domain_id, &desired.cluster, task_id).await?;
        self.read(ctx, &id, desired).await
    }

    async fn read(
        &self,
        ctx: &ReconcileContext,
        id: &str,
        desired: &ClusterResource,
    ) -> Result<ClusterObservedState> {
        let remote = fetch_cluster(ctx, id).await?;
        let mut observed = observe_cluster(&desired.cluster, &remote);
        if observed.domain_id.is_none() {
            observed.domain_id = Some(desired.domain_id.clone());
        }
        Ok(observed)
    }

    async fn refresh(
        &self,
        ctx: &ReconcileContext,
        prior: &ClusterObservedState,
    ) -> Result<ClusterObservedState> {
        let remote = fetch_cluster(ctx, &prior.id).await?;
        let mut observed = observe_cluster(&prior.applied(), &remote);
        if observed.domain_id.is_none() {
            observed.domain_id = prior.domain_id.clone();
        }
        Ok(observed)
    }

    async fn update(
        &self,
        ctx: &ReconcileContext,
        prior: &ClusterObservedState,
        desired: &ClusterResource,
    ) -> Result<ClusterObservedState> {
        if let Some(domain_id) = &prior.domain_id
            && *domain_id != desired.domain_id
        {
            return Err(ReconcileError::SpecBuild(format!(
                "cluster {} belongs to domain {}; moving it to {} is not supported",
                prior.id, domain_id, desired.domain_id
            )));
        }

        let plan = plan_cluster_update(
            &prior.applied(),
            &desired.cluster,
            ctx.client.supports_combined_expand_contract(),
        )?;
        if plan.is_empty() {
            info!("Cluster {} is up to date", prior.id);
            return self.refresh(ctx, prior).await;
        }

        if let Some(name) = &plan.rename {
            rename_cluster(ctx, &prior.id, name).await?;
        }
        if plan.hosts != HostChange::NoChange {
            let update = ClusterHostUpdate {
                cluster_id: prior.id.clone(),
                cluster_name: desired.cluster.name.clone(),
                change: plan.hosts,
            };
            update_cluster_hosts(ctx, &update).await?;
        }

        self.read(ctx, &prior.id, desired).await
    }

    async fn delete(&self, ctx: &ReconcileContext, prior: &ClusterObservedState) -> Result<()> {
        delete_cluster(ctx, &prior.id).await
    }
}

async fn fetch_cluster(ctx: &ReconcileContext, id: &str) -> Result<RemoteCluster> {
    ctx.client
        .get_cluster(id)
        .await
        .map_err(ReconcileError::remote("get cluster"))?
        .ok_or_else(|| ReconcileError::NotFound(format!("cluster {}", id)))
}

/// Create a cluster in `domain_id` and return its remote identifier.
pub(crate) async fn create_cluster(
    ctx: &ReconcileContext,
    domain_id: &str,
    cluster: &ClusterDesiredState,
) -> Result<String> {
    let spec = build_cluster_creation_spec(domain_id, cluster)?;
    Validator::new(ctx.client.as_ref())
        .validate_cluster_creation(&spec)
        .await?
        .into_result()?;

    info!("Creating cluster '{}' in domain {}", cluster.name, domain_id);
    let task = ctx
        .client
        .create_cluster(&spec)
        .await
        .map_err(ReconcileError::remote("create cluster"))?;

    await_cluster_creation(ctx, domain_id, cluster, &task.id).await
}

async fn await_cluster_creation(
    ctx: &ReconcileContext,
    domain_id: &str,
    cluster: &ClusterDesiredState,
    task_id: &str,
) -> Result<String> {
    let tracker = TaskTracker::for_class(ctx, OperationClass::Create);
    tracker
        .await_task(task_id, ctx.config.create_timeout, true)
        .await?;
    let id = tracker.get_resource_id(task_id, "Cluster").await?;

    ctx.audit.cluster_created(domain_id, &id, &cluster.name);
    Ok(id)
}

/// Submit a validated cluster update and wait for it without treating a
/// failed task as fatal.
async fn submit_cluster_update(
    ctx: &ReconcileContext,
    cluster_id: &str,
    spec: &ClusterUpdateSpec,
) -> Result<()> {
    Validator::new(ctx.client.as_ref())
        .validate_cluster_update(cluster_id, spec)
        .await?
        .into_result()?;

    let task = ctx
        .client
        .update_cluster(cluster_id, spec)
        .await
        .map_err(ReconcileError::remote("update cluster"))?;

    TaskTracker::for_class(ctx, OperationClass::Update)
        .await_task(&task.id, ctx.config.update_timeout, false)
        .await?
        .into_result()?;
    Ok(())
}

pub(crate) async fn rename_cluster(ctx: &ReconcileContext, cluster_id: &str, name: &str) -> Result<()> {
    info!("Renaming cluster {} to '{}'", cluster_id, name);
    submit_cluster_update(ctx, cluster_id, &build_cluster_rename_spec(name)).await?;
    ctx.audit.cluster_renamed(cluster_id, name);
    Ok(())
}

/// Expand and/or contract the host set of an existing cluster.
pub(crate) async fn update_cluster_hosts(
    ctx: &ReconcileContext,
    update: &ClusterHostUpdate,
) -> Result<()> {
    let spec = build_host_change_spec(&update.change)?;

    let ids = |hosts: &[HostMembership]| -> Vec<String> {
        hosts.iter().map(|h| h.host_id.clone()).collect()
    };
    let (added, removed) = match &update.change {
        HostChange::NoChange => (vec![], vec![]),
        HostChange::Expand(added) => (ids(added), vec![]),
        HostChange::Contract(removed) => (vec![], ids(removed)),
        HostChange::ExpandAndContract { added, removed } => (ids(added), ids(removed)),
    };
    info!(
        "Updating hosts of cluster '{}' ({}): +{:?} -{:?}",
        update.cluster_name, update.cluster_id, added, removed
    );

    submit_cluster_update(ctx, &update.cluster_id, &spec).await?;
    ctx.audit
        .cluster_hosts_changed(&update.cluster_id, &added, &removed);
    Ok(())
}

/// Mark a cluster for deletion, then delete it.
pub(crate) async fn delete_cluster(ctx: &ReconcileContext, cluster_id: &str) -> Result<()> {
    info!("Deleting cluster {}", cluster_id);
    let mark = ctx
        .client
        .update_cluster(cluster_id, &build_cluster_deletion_mark())
        .await
        .map_err(ReconcileError::remote("mark cluster for deletion"))?;
    await_deletion_mark(ctx, &mark).await?;

    let response = ctx
        .client
        .delete_cluster(cluster_id)
        .await
        .map_err(ReconcileError::remote("delete cluster"))?;
    await_deletion(ctx, &mark, response).await?;

    ctx.audit.cluster_deleted(cluster_id);
    Ok(())
}

/// Rebuild a cluster's observed state from its remote record.
///
/// Host license keys and NIC bindings cannot be read back and are carried
/// over from the matching desired host. Hosts keep the desired order, with
/// hosts only the remote system knows appended in remote order.
pub(crate) fn observe_cluster(
    desired: &ClusterDesiredState,
    remote: &RemoteCluster,
) -> ClusterObservedState {
    let mut remote_hosts: Vec<_> = remote.hosts.iter().collect();
    let mut memberships = Vec::with_capacity(remote_hosts.len());
    let mut hosts = Vec::with_capacity(remote_hosts.len());

    for wanted in &desired.hosts {
        if let Some(pos) = remote_hosts.iter().position(|h| h.id == wanted.host_id) {
            let host = remote_hosts.remove(pos);
            memberships.push(wanted.clone());
            hosts.push(HostObservedState {
                host_id: host.id.clone(),
                ip_address: host.ip_address.clone(),
                hostname: host.fqdn.clone(),
            });
        }
    }
    for host in remote_hosts {
        warn!(
            "Host {} in cluster {} is not in the desired state",
            host.id, remote.id
        );
        memberships.push(HostMembership {
            host_id: host.id.clone(),
            license_key: String::new(),
            nics: vec![],
        });
        hosts.push(HostObservedState {
            host_id: host.id.clone(),
            ip_address: host.ip_address.clone(),
            hostname: host.fqdn.clone(),
        });
    }

    ClusterObservedState {
        desired: ClusterDesiredState {
            name: remote.name.clone(),
            id: Some(remote.id.clone()),
            hosts: memberships,
            ..desired.clone()
        },
        id: remote.id.clone(),
        domain_id: remote.domain_id.clone(),
        primary_datastore_name: remote.primary_datastore_name.clone(),
        primary_datastore_type: remote.primary_datastore_type.clone(),
        is_default: remote.is_default,
        is_stretched: remote.is_stretched,
        hosts,
    }
}

/// Template for a remote cluster that no desired state describes.
///
/// Only what the remote record carries is filled in; switches, licenses and
/// datastore settings stay empty.
pub(crate) fn unmanaged_cluster(remote: &RemoteCluster) -> ClusterDesiredState {
    let datastore_name = remote.primary_datastore_name.clone().unwrap_or_default();
    let datastore = match remote.primary_datastore_type.as_deref() {
        Some("NFS") => DatastoreDesiredState::Nfs {
            datastore_name,
            server: String::new(),
            path: String::new(),
            read_only: false,
        },
        _ => DatastoreDesiredState::Vsan {
            datastore_name,
            failures_to_tolerate: 1,
            license_key: String::new(),
            dedup_and_compression: false,
        },
    };
    ClusterDesiredState {
        name: remote.name.clone(),
        id: Some(remote.id.clone()),
        hosts: vec![],
        vds: vec![],
        datastore,
        geneve_vlan_id: None,
    }
}

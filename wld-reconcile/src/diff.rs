//! Diff engine - classifies membership changes between two snapshots.
//!
//! Clusters within a domain and hosts within a cluster are compared by
//! identity key. The result of a domain comparison is a [`DomainUpdatePlan`]
//! that the reconciler executes as-is; every ambiguity is rejected here,
//! before any remote mutation.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use tracing::debug;

use crate::error::{ReconcileError, Result};
use crate::model::{ClusterDesiredState, DomainDesiredState, HostMembership};

/// Partition of two member sequences by identity key.
#[derive(Debug, PartialEq, Eq)]
pub struct MemberDiff<'a, M> {
    /// In desired only, in desired order.
    pub added: Vec<&'a M>,
    /// In prior only, in prior order.
    pub removed: Vec<&'a M>,
    /// In both, as (prior, desired) pairs in desired order.
    pub retained: Vec<(&'a M, &'a M)>,
}

impl<M> MemberDiff<'_, M> {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

fn index_by_key<'a, M, K, F>(members: &'a [M], key: &F, side: &str) -> Result<HashMap<K, &'a M>>
where
    K: Eq + Hash + Display,
    F: Fn(&M) -> K,
{
    let mut index = HashMap::with_capacity(members.len());
    for member in members {
        let k = key(member);
        if index.contains_key(&k) {
            return Err(ReconcileError::SpecBuild(format!(
                "duplicate identity '{}' in {} members",
                k, side
            )));
        }
        index.insert(k, member);
    }
    Ok(index)
}

/// Compare two ordered member sequences by identity key.
///
/// A key repeated within either side is a configuration error.
pub fn diff_members<'a, M, K, F>(prior: &'a [M], desired: &'a [M], key: F) -> Result<MemberDiff<'a, M>>
where
    K: Eq + Hash + Display,
    F: Fn(&M) -> K,
{
    let prior_index = index_by_key(prior, &key, "prior")?;
    let desired_index = index_by_key(desired, &key, "desired")?;

    let mut added = Vec::new();
    let mut retained = Vec::new();
    for member in desired {
        match prior_index.get(&key(member)) {
            Some(prior_member) => retained.push((*prior_member, member)),
            None => added.push(member),
        }
    }

    let removed = prior
        .iter()
        .filter(|member| !desired_index.contains_key(&key(member)))
        .collect();

    Ok(MemberDiff {
        added,
        removed,
        retained,
    })
}

/// Host membership change within a retained cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostChange {
    NoChange,
    Expand(Vec<HostMembership>),
    Contract(Vec<HostMembership>),
    /// Only produced when the remote API accepts both in one update.
    ExpandAndContract {
        added: Vec<HostMembership>,
        removed: Vec<HostMembership>,
    },
}

/// Classify the host diff of a retained cluster.
pub fn classify_hosts(
    prior: &ClusterDesiredState,
    desired: &ClusterDesiredState,
    combined_supported: bool,
) -> Result<HostChange> {
    let diff = diff_members(&prior.hosts, &desired.hosts, |h| h.host_id.clone())?;

    if let Some((old, _)) = diff.retained.iter().find(|(old, new)| old != new) {
        return Err(ReconcileError::AmbiguousDiff(format!(
            "host {} in cluster '{}' changed in place; only adding or removing hosts is supported",
            old.host_id, desired.name
        )));
    }

    let added: Vec<HostMembership> = diff.added.into_iter().cloned().collect();
    let removed: Vec<HostMembership> = diff.removed.into_iter().cloned().collect();

    match (added.is_empty(), removed.is_empty()) {
        (true, true) => Ok(HostChange::NoChange),
        (false, true) => Ok(HostChange::Expand(added)),
        (true, false) => Ok(HostChange::Contract(removed)),
        (false, false) if combined_supported => {
            Ok(HostChange::ExpandAndContract { added, removed })
        }
        (false, false) => Err(ReconcileError::AmbiguousDiff(format!(
            "cluster '{}' adds {} and removes {} host(s) in one pass; expand and contract separately",
            desired.name,
            added.len(),
            removed.len()
        ))),
    }
}

/// An in-place host update of an existing cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHostUpdate {
    pub cluster_id: String,
    pub cluster_name: String,
    pub change: HostChange,
}

/// How the clusters of a domain change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClusterChanges {
    #[default]
    Unchanged,
    /// Cluster count changed: whole clusters are added and removed.
    Membership {
        added: Vec<ClusterDesiredState>,
        removed: Vec<ClusterDesiredState>,
    },
    /// Cluster count unchanged: hosts of existing clusters change.
    InPlace(Vec<ClusterHostUpdate>),
}

/// Everything an update pass will do to a domain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DomainUpdatePlan {
    pub rename: Option<String>,
    pub clusters: ClusterChanges,
}

impl DomainUpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.rename.is_none() && self.clusters == ClusterChanges::Unchanged
    }
}

fn differing_fields(prior: &ClusterDesiredState, desired: &ClusterDesiredState) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if prior.vds != desired.vds {
        fields.push("vds");
    }
    if prior.datastore != desired.datastore {
        fields.push("datastore");
    }
    if prior.geneve_vlan_id != desired.geneve_vlan_id {
        fields.push("geneve_vlan_id");
    }
    fields
}

fn require_id(cluster: &ClusterDesiredState) -> Result<String> {
    cluster.id.clone().ok_or_else(|| {
        ReconcileError::DataIntegrity(format!(
            "cluster '{}' has no remote identifier",
            cluster.name
        ))
    })
}

/// Classify cluster changes between the applied and the desired domain.
///
/// Differing cluster counts mean whole clusters are added or removed; equal
/// counts are compared position by position and may only expand or
/// contract the host set of each cluster.
pub fn plan_cluster_changes(
    prior: &[ClusterDesiredState],
    desired: &[ClusterDesiredState],
    combined_supported: bool,
) -> Result<ClusterChanges> {
    let diff = diff_members(prior, desired, |c| c.name.clone())?;

    if prior.len() != desired.len() {
        if let Some((_, modified)) = diff.retained.iter().find(|(old, new)| !old.same_config(new)) {
            return Err(ReconcileError::AmbiguousDiff(format!(
                "cluster count changed and cluster '{}' was modified in the same pass",
                modified.name
            )));
        }
        for removed in &diff.removed {
            require_id(removed)?;
        }
        debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Cluster membership change"
        );
        return Ok(ClusterChanges::Membership {
            added: diff.added.into_iter().cloned().collect(),
            removed: diff.removed.into_iter().cloned().collect(),
        });
    }

    let mut updates = Vec::new();
    for (position, (old, new)) in prior.iter().zip(desired).enumerate() {
        let same_identity = old.name == new.name
            && match (&old.id, &new.id) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            };
        if !same_identity {
            return Err(ReconcileError::AmbiguousDiff(format!(
                "cluster at position {} changed from '{}' to '{}'; cluster order or identity cannot change without changing the cluster count",
                position, old.name, new.name
            )));
        }
        if old.same_config(new) {
            continue;
        }

        let fields = differing_fields(old, new);
        if !fields.is_empty() {
            return Err(ReconcileError::AmbiguousDiff(format!(
                "cluster '{}' changes {}; only host expansion or contraction is supported",
                new.name,
                fields.join(", ")
            )));
        }

        let change = classify_hosts(old, new, combined_supported)?;
        if change == HostChange::NoChange {
            // Host order changed only.
            continue;
        }
        updates.push(ClusterHostUpdate {
            cluster_id: require_id(old)?,
            cluster_name: new.name.clone(),
            change,
        });
    }

    if updates.is_empty() {
        Ok(ClusterChanges::Unchanged)
    } else {
        Ok(ClusterChanges::InPlace(updates))
    }
}

/// Changes to a standalone cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterUpdatePlan {
    pub rename: Option<String>,
    pub hosts: HostChange,
}

impl ClusterUpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.rename.is_none() && self.hosts == HostChange::NoChange
    }
}

/// Compute the update plan for a standalone cluster.
///
/// The cluster is identified by its remote ID, so its name may change; its
/// switch and datastore configuration may not.
pub fn plan_cluster_update(
    prior: &ClusterDesiredState,
    desired: &ClusterDesiredState,
    combined_supported: bool,
) -> Result<ClusterUpdatePlan> {
    if let (Some(a), Some(b)) = (&prior.id, &desired.id)
        && a != b
    {
        return Err(ReconcileError::AmbiguousDiff(format!(
            "cluster identifier changed from {} to {}",
            a, b
        )));
    }

    let fields = differing_fields(prior, desired);
    if !fields.is_empty() {
        return Err(ReconcileError::AmbiguousDiff(format!(
            "cluster '{}' changes {}; only renaming and host expansion or contraction are supported",
            desired.name,
            fields.join(", ")
        )));
    }

    Ok(ClusterUpdatePlan {
        rename: (prior.name != desired.name).then(|| desired.name.clone()),
        hosts: classify_hosts(prior, desired, combined_supported)?,
    })
}

/// Compute the update plan for a domain.
///
/// Only the name and the cluster membership can change on an existing domain.
pub fn plan_domain_update(
    prior: &DomainDesiredState,
    desired: &DomainDesiredState,
    combined_supported: bool,
) -> Result<DomainUpdatePlan> {
    if prior.org_name != desired.org_name {
        return Err(ReconcileError::SpecBuild(
            "org_name cannot be changed on an existing domain".to_string(),
        ));
    }
    if prior.vcenter != desired.vcenter {
        return Err(ReconcileError::SpecBuild(
            "vcenter cannot be changed on an existing domain".to_string(),
        ));
    }
    if prior.nsx != desired.nsx {
        return Err(ReconcileError::SpecBuild(
            "nsx_configuration cannot be changed on an existing domain".to_string(),
        ));
    }

    let rename = (prior.name != desired.name).then(|| desired.name.clone());
    let clusters = plan_cluster_changes(&prior.clusters, &desired.clusters, combined_supported)?;

    Ok(DomainUpdatePlan { rename, clusters })
}

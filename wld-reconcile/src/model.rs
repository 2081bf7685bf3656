//! Typed desired and observed state records for domains and clusters.
//!
//! Desired records are built fresh from caller input on every pass and never
//! mutated in place. Observed records are rebuilt entirely from remote reads
//! after every mutation.

use serde::{Deserialize, Serialize};

/// Network settings for an appliance (vCenter Server, NSX Manager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplianceNetwork {
    pub ip_address: String,
    pub dns_name: String,
    pub gateway: Option<String>,
    pub subnet_mask: Option<String>,
}

/// vCenter Server instance backing a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcenterDesiredState {
    pub name: String,
    pub network: ApplianceNetwork,
    pub datacenter_name: String,
    pub root_password: String,
    pub vm_size: Option<String>,
    pub storage_size: Option<String>,
}

/// A single NSX Manager node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsxManagerNode {
    pub name: String,
    pub network: ApplianceNetwork,
}

/// Network overlay (NSX) configuration of a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsxDesiredState {
    pub managers: Vec<NsxManagerNode>,
    pub vip: String,
    pub vip_fqdn: String,
    pub license_key: String,
    pub admin_password: String,
    pub form_factor: Option<String>,
}

/// Desired state of a workload domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDesiredState {
    pub name: String,
    pub org_name: Option<String>,
    pub vcenter: VcenterDesiredState,
    pub nsx: Option<NsxDesiredState>,
    pub clusters: Vec<ClusterDesiredState>,
}

/// Binding of a physical NIC on a host to a distributed switch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NicBinding {
    pub nic: String,
    pub vds_name: String,
}

/// A commissioned host assigned to a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMembership {
    /// Remote host identifier, stable across passes.
    pub host_id: String,
    pub license_key: String,
    pub nics: Vec<NicBinding>,
}

/// Traffic type carried by a port group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportType {
    Management,
    Vsan,
    Vmotion,
    Public,
    Nfs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortGroup {
    pub name: String,
    pub transport_type: TransportType,
}

/// Distributed switch topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdsDesiredState {
    pub name: String,
    pub port_groups: Vec<PortGroup>,
}

/// Primary datastore of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatastoreDesiredState {
    Vsan {
        datastore_name: String,
        failures_to_tolerate: u8,
        license_key: String,
        dedup_and_compression: bool,
    },
    Nfs {
        datastore_name: String,
        server: String,
        path: String,
        read_only: bool,
    },
}

impl DatastoreDesiredState {
    pub fn datastore_name(&self) -> &str {
        match self {
            DatastoreDesiredState::Vsan { datastore_name, .. }
            | DatastoreDesiredState::Nfs { datastore_name, .. } => datastore_name,
        }
    }
}

/// Desired state of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDesiredState {
    pub name: String,
    /// Remote identifier, known once the cluster exists.
    pub id: Option<String>,
    pub hosts: Vec<HostMembership>,
    pub vds: Vec<VdsDesiredState>,
    pub datastore: DatastoreDesiredState,
    pub geneve_vlan_id: Option<u16>,
}

impl ClusterDesiredState {
    /// Compares everything except the remote identifier.
    pub fn same_config(&self, other: &ClusterDesiredState) -> bool {
        self.name == other.name
            && self.hosts == other.hosts
            && self.vds == other.vds
            && self.datastore == other.datastore
            && self.geneve_vlan_id == other.geneve_vlan_id
    }
}

/// A standalone cluster attached to an existing domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterResource {
    pub domain_id: String,
    pub cluster: ClusterDesiredState,
}

/// Host attributes only the remote system knows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostObservedState {
    pub host_id: String,
    pub ip_address: Option<String>,
    pub hostname: Option<String>,
}

/// A cluster as read back from the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterObservedState {
    /// Desired fields the cluster was applied with; `id` is always set.
    pub desired: ClusterDesiredState,
    pub id: String,
    pub domain_id: Option<String>,
    pub primary_datastore_name: Option<String>,
    pub primary_datastore_type: Option<String>,
    pub is_default: bool,
    pub is_stretched: bool,
    pub hosts: Vec<HostObservedState>,
}

/// vCenter fields assigned by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcenterObservedState {
    pub id: String,
    pub fqdn: String,
}

/// A domain as read back from the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainObservedState {
    pub id: String,
    pub desired: DomainDesiredState,
    pub status: Option<String>,
    pub domain_type: Option<String>,
    pub sso_id: Option<String>,
    pub sso_name: Option<String>,
    pub is_management_sso_domain: bool,
    pub vcenter: VcenterObservedState,
    pub clusters: Vec<ClusterObservedState>,
}

impl DomainObservedState {
    /// Desired-state snapshot the domain was last applied with, with remote
    /// cluster identifiers filled in.
    pub fn applied(&self) -> DomainDesiredState {
        let mut desired = self.desired.clone();
        desired.clusters = self.clusters.iter().map(|c| c.applied()).collect();
        desired
    }
}

impl ClusterObservedState {
    pub fn applied(&self) -> ClusterDesiredState {
        ClusterDesiredState {
            id: Some(self.id.clone()),
            ..self.desired.clone()
        }
    }
}

/// Status of a remote task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Successful,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Successful | TaskStatus::Failed)
    }
}

/// A resource referenced by a remote task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResource {
    /// Resource kind as reported remotely ("Domain", "Cluster", ...).
    pub kind: String,
    pub id: String,
}

/// An asynchronous operation owned by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTask {
    pub id: String,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub resources: Vec<TaskResource>,
}

/// Handle to a task accepted by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: String,
}

impl TaskRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Answer to a delete request.
///
/// Depending on deployment shape the remote system acknowledges a delete
/// synchronously, asynchronously, or without a task at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResponse {
    Completed(TaskRef),
    Accepted(TaskRef),
    NoTask,
}

impl DeleteResponse {
    pub fn task(&self) -> Option<&TaskRef> {
        match self {
            DeleteResponse::Completed(task) | DeleteResponse::Accepted(task) => Some(task),
            DeleteResponse::NoTask => None,
        }
    }
}

/// vCenter reference inside a remote domain record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVcenter {
    pub id: String,
    pub fqdn: String,
}

/// A domain record as returned by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDomain {
    pub id: String,
    pub name: String,
    pub status: Option<String>,
    pub domain_type: Option<String>,
    pub sso_id: Option<String>,
    pub sso_name: Option<String>,
    pub is_management_sso_domain: bool,
    pub vcenters: Vec<RemoteVcenter>,
    pub cluster_ids: Vec<String>,
}

/// A host reference inside a remote cluster record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHost {
    pub id: String,
    pub fqdn: Option<String>,
    pub ip_address: Option<String>,
}

/// A cluster record as returned by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCluster {
    pub id: String,
    pub name: String,
    pub domain_id: Option<String>,
    pub primary_datastore_name: Option<String>,
    pub primary_datastore_type: Option<String>,
    pub is_default: bool,
    pub is_stretched: bool,
    pub hosts: Vec<RemoteHost>,
}

//! Shared test utilities for wld-reconcile integration tests.
//!
//! `MockRemoteClient` is an in-memory management plane: it records every
//! call, hands out task ids for mutations, replays scripted task status
//! sequences and applies the effect of a mutation when its script ends in
//! SUCCESSFUL.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use wld_reconcile::client::{CheckStatus, ValidationCheck, ValidationReport};
use wld_reconcile::model::{
    ApplianceNetwork, ClusterDesiredState, DatastoreDesiredState, DeleteResponse,
    DomainDesiredState, HostMembership, NicBinding, PortGroup, RemoteCluster, RemoteDomain,
    RemoteHost, RemoteTask, RemoteVcenter, TaskRef, TaskResource, TaskStatus, TransportType,
    VcenterDesiredState, VdsDesiredState,
};
use wld_reconcile::spec::{
    ClusterCreationSpec, ClusterSpec, ClusterUpdateSpec, DomainCreationSpec, DomainUpdateSpec,
};
use wld_reconcile::{
    ReconcileAuditLogger, ReconcileContext, ReconcilerConfig, RemoteClient, RemoteError,
    RemoteResult,
};

/// A recorded remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ValidateDomain(String),
    CreateDomain(DomainCreationSpec),
    UpdateDomain(String, DomainUpdateSpec),
    DeleteDomain(String),
    GetDomain(String),
    ValidateClusterCreation(ClusterCreationSpec),
    ValidateClusterUpdate(String, ClusterUpdateSpec),
    CreateCluster(ClusterCreationSpec),
    UpdateCluster(String, ClusterUpdateSpec),
    DeleteCluster(String),
    GetCluster(String),
    ListClusters,
    GetTask(String),
}

impl Call {
    /// True for calls that change remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::CreateDomain(_)
                | Call::UpdateDomain(..)
                | Call::DeleteDomain(_)
                | Call::CreateCluster(_)
                | Call::UpdateCluster(..)
                | Call::DeleteCluster(_)
        )
    }
}

/// How the mock answers DELETE requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    Completed,
    Accepted,
    NoTask,
}

enum Effect {
    None,
    CreateDomain(DomainCreationSpec),
    UpdateDomain(String, DomainUpdateSpec),
    DeleteDomain(String),
    CreateCluster(ClusterCreationSpec),
    UpdateCluster(String, ClusterUpdateSpec),
    DeleteCluster(String),
}

struct MockState {
    calls: Vec<Call>,
    tasks: HashMap<String, VecDeque<RemoteTask>>,
    scripts: HashMap<&'static str, VecDeque<Vec<TaskStatus>>>,
    domains: HashMap<String, RemoteDomain>,
    clusters: Vec<RemoteCluster>,
    domain_validation: ValidationReport,
    cluster_validation: ValidationReport,
    delete_mode: DeleteMode,
    combined: bool,
    next_id: u32,
}

pub struct MockRemoteClient {
    state: Mutex<MockState>,
}

pub fn passing_report() -> ValidationReport {
    ValidationReport {
        result_status: CheckStatus::Succeeded,
        checks: vec![],
    }
}

pub fn failing_report(description: &str, message: &str) -> ValidationReport {
    ValidationReport {
        result_status: CheckStatus::Failed,
        checks: vec![ValidationCheck {
            description: description.to_string(),
            result_status: CheckStatus::Failed,
            error_message: Some(message.to_string()),
        }],
    }
}

fn remote_cluster(id: String, domain_id: &str, spec: &ClusterSpec) -> RemoteCluster {
    let (ds_name, ds_type) = match (
        &spec.datastore_spec.vsan_datastore_spec,
        &spec.datastore_spec.nfs_datastore_specs,
    ) {
        (Some(vsan), _) => (Some(vsan.datastore_name.clone()), Some("VSAN".to_string())),
        (None, Some(nfs)) => (
            nfs.first().map(|n| n.datastore_name.clone()),
            Some("NFS".to_string()),
        ),
        (None, None) => (None, None),
    };
    RemoteCluster {
        id,
        name: spec.name.clone(),
        domain_id: Some(domain_id.to_string()),
        primary_datastore_name: ds_name,
        primary_datastore_type: ds_type,
        is_default: false,
        is_stretched: false,
        hosts: spec.host_specs.iter().map(|h| remote_host(&h.id)).collect(),
    }
}

fn remote_host(id: &str) -> RemoteHost {
    RemoteHost {
        id: id.to_string(),
        fqdn: Some(format!("{}.example.test", id)),
        ip_address: Some(format!("10.0.1.{}", id.len())),
    }
}

impl MockRemoteClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                calls: Vec::new(),
                tasks: HashMap::new(),
                scripts: HashMap::new(),
                domains: HashMap::new(),
                clusters: Vec::new(),
                domain_validation: passing_report(),
                cluster_validation: passing_report(),
                delete_mode: DeleteMode::Accepted,
                combined: false,
                next_id: 0,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Script the task status sequence of the next `operation` call
    /// ("create_domain", "update_domain", "delete_domain", "create_cluster",
    /// "update_cluster", "delete_cluster"). The last status repeats.
    pub fn script(&self, operation: &'static str, statuses: Vec<TaskStatus>) {
        self.lock()
            .scripts
            .entry(operation)
            .or_default()
            .push_back(statuses);
    }

    /// Register a task directly, without a mutation.
    pub fn add_task(&self, id: &str, statuses: Vec<TaskStatus>) {
        let tasks = statuses
            .into_iter()
            .map(|status| task(id, status, vec![]))
            .collect();
        self.lock().tasks.insert(id.to_string(), tasks);
    }

    pub fn reject_domain_validation(&self, report: ValidationReport) {
        self.lock().domain_validation = report;
    }

    pub fn reject_cluster_validation(&self, report: ValidationReport) {
        self.lock().cluster_validation = report;
    }

    pub fn set_delete_mode(&self, mode: DeleteMode) {
        self.lock().delete_mode = mode;
    }

    pub fn set_combined_expand_contract(&self, combined: bool) {
        self.lock().combined = combined;
    }

    pub fn insert_domain(&self, domain: RemoteDomain) {
        self.lock().domains.insert(domain.id.clone(), domain);
    }

    pub fn insert_cluster(&self, cluster: RemoteCluster) {
        self.lock().clusters.push(cluster);
    }

    pub fn domain(&self, id: &str) -> Option<RemoteDomain> {
        self.lock().domains.get(id).cloned()
    }

    pub fn cluster(&self, id: &str) -> Option<RemoteCluster> {
        self.lock().clusters.iter().find(|c| c.id == id).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of `get_task` calls for `task_id`.
    pub fn polls(&self, task_id: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::GetTask(id) if id == task_id))
            .count()
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.lock();
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }

    /// Allocate a task for `operation` and apply `effect` if its script
    /// ends in SUCCESSFUL.
    fn submit(&self, operation: &'static str, effect: Effect) -> TaskRef {
        let task_id = self.next_id("task");
        let mut state = self.lock();
        let statuses = state
            .scripts
            .get_mut(operation)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| vec![TaskStatus::Successful]);
        let succeeds = statuses.last() == Some(&TaskStatus::Successful);

        let mut resources = vec![];
        if succeeds {
            state.next_id += 1;
            let new_id = state.next_id;
            if let Some(resource) = apply(&mut state, effect, new_id) {
                resources.push(resource);
            }
        }

        let sequence = statuses
            .into_iter()
            .map(|status| {
                let res = if status == TaskStatus::Successful {
                    resources.clone()
                } else {
                    vec![]
                };
                task(&task_id, status, res)
            })
            .collect();
        state.tasks.insert(task_id.clone(), sequence);
        TaskRef::new(task_id)
    }
}

fn task(id: &str, status: TaskStatus, resources: Vec<TaskResource>) -> RemoteTask {
    RemoteTask {
        id: id.to_string(),
        name: None,
        kind: None,
        status,
        errors: if status == TaskStatus::Failed {
            vec!["scripted failure".to_string()]
        } else {
            vec![]
        },
        resources,
    }
}

fn apply(state: &mut MockState, effect: Effect, new_id: u32) -> Option<TaskResource> {
    match effect {
        Effect::None => None,
        Effect::CreateDomain(spec) => {
            let domain_id = format!("domain-{}", new_id);
            let mut cluster_ids = vec![];
            for (i, cluster) in spec.compute_spec.cluster_specs.iter().enumerate() {
                let cluster_id = format!("cluster-{}-{}", new_id, i);
                state
                    .clusters
                    .push(remote_cluster(cluster_id.clone(), &domain_id, cluster));
                cluster_ids.push(cluster_id);
            }
            state.domains.insert(
                domain_id.clone(),
                RemoteDomain {
                    id: domain_id.clone(),
                    name: spec.domain_name.clone(),
                    status: Some("ACTIVE".to_string()),
                    domain_type: Some("VI".to_string()),
                    sso_id: Some("sso-1".to_string()),
                    sso_name: Some("vsphere.local".to_string()),
                    is_management_sso_domain: false,
                    vcenters: vec![RemoteVcenter {
                        id: format!("vc-{}", new_id),
                        fqdn: spec.vcenter_spec.network_details_spec.dns_name.clone(),
                    }],
                    cluster_ids,
                },
            );
            Some(TaskResource {
                kind: "Domain".to_string(),
                id: domain_id,
            })
        }
        Effect::UpdateDomain(id, spec) => {
            if let Some(domain) = state.domains.get_mut(&id)
                && let Some(name) = spec.name
            {
                domain.name = name;
            }
            None
        }
        Effect::DeleteDomain(id) => {
            if let Some(domain) = state.domains.remove(&id) {
                state.clusters.retain(|c| !domain.cluster_ids.contains(&c.id));
            }
            None
        }
        Effect::CreateCluster(spec) => {
            let cluster_id = format!("cluster-{}", new_id);
            for cluster in &spec.compute_spec.cluster_specs {
                state
                    .clusters
                    .push(remote_cluster(cluster_id.clone(), &spec.domain_id, cluster));
            }
            if let Some(domain) = state.domains.get_mut(&spec.domain_id) {
                domain.cluster_ids.push(cluster_id.clone());
            }
            Some(TaskResource {
                kind: "Cluster".to_string(),
                id: cluster_id,
            })
        }
        Effect::UpdateCluster(id, spec) => {
            if let Some(cluster) = state.clusters.iter_mut().find(|c| c.id == id) {
                if let Some(name) = spec.name {
                    cluster.name = name;
                }
                if let Some(expansion) = spec.cluster_expansion_spec {
                    cluster
                        .hosts
                        .extend(expansion.host_specs.iter().map(|h| remote_host(&h.id)));
                }
                if let Some(compaction) = spec.cluster_compaction_spec {
                    cluster
                        .hosts
                        .retain(|h| !compaction.hosts.iter().any(|r| r.id == h.id));
                }
            }
            None
        }
        Effect::DeleteCluster(id) => {
            state.clusters.retain(|c| c.id != id);
            for domain in state.domains.values_mut() {
                domain.cluster_ids.retain(|c| *c != id);
            }
            None
        }
    }
}

#[async_trait]
impl RemoteClient for MockRemoteClient {
    async fn validate_domain(&self, spec: &DomainCreationSpec) -> RemoteResult<ValidationReport> {
        self.record(Call::ValidateDomain(spec.domain_name.clone()));
        Ok(self.lock().domain_validation.clone())
    }

    async fn create_domain(&self, spec: &DomainCreationSpec) -> RemoteResult<TaskRef> {
        self.record(Call::CreateDomain(spec.clone()));
        Ok(self.submit("create_domain", Effect::CreateDomain(spec.clone())))
    }

    async fn update_domain(&self, id: &str, spec: &DomainUpdateSpec) -> RemoteResult<TaskRef> {
        self.record(Call::UpdateDomain(id.to_string(), spec.clone()));
        Ok(self.submit(
            "update_domain",
            Effect::UpdateDomain(id.to_string(), spec.clone()),
        ))
    }

    async fn delete_domain(&self, id: &str) -> RemoteResult<DeleteResponse> {
        self.record(Call::DeleteDomain(id.to_string()));
        let mode = self.lock().delete_mode;
        let effect = Effect::DeleteDomain(id.to_string());
        Ok(match mode {
            DeleteMode::Completed => DeleteResponse::Completed(self.submit("delete_domain", effect)),
            DeleteMode::Accepted => DeleteResponse::Accepted(self.submit("delete_domain", effect)),
            DeleteMode::NoTask => {
                let mut state = self.lock();
                apply(&mut state, effect, 0);
                DeleteResponse::NoTask
            }
        })
    }

    async fn get_domain(&self, id: &str) -> RemoteResult<Option<RemoteDomain>> {
        self.record(Call::GetDomain(id.to_string()));
        Ok(self.domain(id))
    }

    async fn validate_cluster_creation(
        &self,
        spec: &ClusterCreationSpec,
    ) -> RemoteResult<ValidationReport> {
        self.record(Call::ValidateClusterCreation(spec.clone()));
        Ok(self.lock().cluster_validation.clone())
    }

    async fn validate_cluster_update(
        &self,
        id: &str,
        spec: &ClusterUpdateSpec,
    ) -> RemoteResult<ValidationReport> {
        self.record(Call::ValidateClusterUpdate(id.to_string(), spec.clone()));
        Ok(self.lock().cluster_validation.clone())
    }

    async fn create_cluster(&self, spec: &ClusterCreationSpec) -> RemoteResult<TaskRef> {
        self.record(Call::CreateCluster(spec.clone()));
        Ok(self.submit("create_cluster", Effect::CreateCluster(spec.clone())))
    }

    async fn update_cluster(&self, id: &str, spec: &ClusterUpdateSpec) -> RemoteResult<TaskRef> {
        self.record(Call::UpdateCluster(id.to_string(), spec.clone()));
        let effect = if spec.mark_for_deletion == Some(true) {
            Effect::None
        } else {
            Effect::UpdateCluster(id.to_string(), spec.clone())
        };
        Ok(self.submit("update_cluster", effect))
    }

    async fn delete_cluster(&self, id: &str) -> RemoteResult<DeleteResponse> {
        self.record(Call::DeleteCluster(id.to_string()));
        let mode = self.lock().delete_mode;
        let effect = Effect::DeleteCluster(id.to_string());
        Ok(match mode {
            DeleteMode::Completed => {
                DeleteResponse::Completed(self.submit("delete_cluster", effect))
            }
            DeleteMode::Accepted => DeleteResponse::Accepted(self.submit("delete_cluster", effect)),
            DeleteMode::NoTask => {
                let mut state = self.lock();
                apply(&mut state, effect, 0);
                DeleteResponse::NoTask
            }
        })
    }

    async fn get_cluster(&self, id: &str) -> RemoteResult<Option<RemoteCluster>> {
        self.record(Call::GetCluster(id.to_string()));
        Ok(self.cluster(id))
    }

    async fn list_clusters(&self) -> RemoteResult<Vec<RemoteCluster>> {
        self.record(Call::ListClusters);
        Ok(self.lock().clusters.clone())
    }

    async fn get_task(&self, id: &str) -> RemoteResult<RemoteTask> {
        self.record(Call::GetTask(id.to_string()));
        let mut state = self.lock();
        let sequence = state.tasks.get_mut(id).ok_or_else(|| RemoteError::Status {
            status: 404,
            code: Some("TASK_NOT_FOUND".to_string()),
            message: format!("task {} not found", id),
        })?;
        let task = if sequence.len() > 1 {
            sequence.pop_front()
        } else {
            sequence.front().cloned()
        };
        task.ok_or_else(|| RemoteError::Decode(format!("task {} has no status", id)))
    }

    fn supports_combined_expand_contract(&self) -> bool {
        self.lock().combined
    }
}

/// Context with default timeouts and a silent audit logger.
pub fn context(client: Arc<MockRemoteClient>) -> ReconcileContext {
    ReconcileContext::new(client, ReconcilerConfig::default())
        .with_audit(Arc::new(ReconcileAuditLogger::new_noop()))
}

pub fn host(id: &str) -> HostMembership {
    HostMembership {
        host_id: id.to_string(),
        license_key: "ESX-LIC".to_string(),
        nics: vec![NicBinding {
            nic: "vmnic0".to_string(),
            vds_name: "vds01".to_string(),
        }],
    }
}

pub fn cluster(name: &str, hosts: &[&str]) -> ClusterDesiredState {
    ClusterDesiredState {
        name: name.to_string(),
        id: None,
        hosts: hosts.iter().map(|h| host(h)).collect(),
        vds: vec![VdsDesiredState {
            name: "vds01".to_string(),
            port_groups: vec![PortGroup {
                name: "pg-mgmt".to_string(),
                transport_type: TransportType::Management,
            }],
        }],
        datastore: DatastoreDesiredState::Vsan {
            datastore_name: format!("{}-vsan", name),
            failures_to_tolerate: 1,
            license_key: "VSAN-LIC".to_string(),
            dedup_and_compression: false,
        },
        geneve_vlan_id: Some(2),
    }
}

pub fn domain(name: &str, clusters: Vec<ClusterDesiredState>) -> DomainDesiredState {
    DomainDesiredState {
        name: name.to_string(),
        org_name: Some("acme".to_string()),
        vcenter: VcenterDesiredState {
            name: format!("vc-{}", name),
            network: ApplianceNetwork {
                ip_address: "10.0.0.10".to_string(),
                dns_name: format!("vc-{}.example.test", name),
                gateway: Some("10.0.0.1".to_string()),
                subnet_mask: Some("255.255.255.0".to_string()),
            },
            datacenter_name: format!("dc-{}", name),
            root_password: "secret".to_string(),
            vm_size: None,
            storage_size: None,
        },
        nsx: None,
        clusters,
    }
}

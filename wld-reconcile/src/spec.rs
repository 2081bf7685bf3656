//! Spec builder - turns desired state into remote request specs.
//!
//! Pure transformations, no I/O. The request types serialize to the
//! management plane's JSON shape (camelCase).

use serde::{Deserialize, Serialize};

use crate::diff::HostChange;
use crate::error::{ReconcileError, Result};
use crate::model::{
    ApplianceNetwork, ClusterDesiredState, DatastoreDesiredState, DomainDesiredState,
    HostMembership, NsxDesiredState, TransportType, VcenterDesiredState,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDetailsSpec {
    pub ip_address: String,
    pub dns_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_mask: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcenterSpec {
    pub name: String,
    pub network_details_spec: NetworkDetailsSpec,
    pub datacenter_name: String,
    pub root_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NsxManagerSpec {
    pub name: String,
    pub network_details_spec: NetworkDetailsSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NsxTSpec {
    pub nsx_manager_specs: Vec<NsxManagerSpec>,
    pub vip: String,
    pub vip_fqdn: String,
    pub license_key: String,
    pub nsx_manager_admin_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_factor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmNic {
    pub id: String,
    pub vds_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostNetworkSpec {
    pub vm_nics: Vec<VmNic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSpec {
    pub id: String,
    pub license_key: String,
    pub host_network_spec: HostNetworkSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortgroupSpec {
    pub name: String,
    pub transport_type: TransportType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VdsSpec {
    pub name: String,
    pub port_group_specs: Vec<PortgroupSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NsxTClusterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geneve_vlan_id: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NsxClusterSpec {
    pub nsx_t_cluster_spec: NsxTClusterSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    pub vds_specs: Vec<VdsSpec>,
    pub nsx_cluster_spec: NsxClusterSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VsanDatastoreSpec {
    pub datastore_name: String,
    pub failures_to_tolerate: u8,
    pub license_key: String,
    pub dedup_and_compression_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfsDatastoreSpec {
    pub datastore_name: String,
    pub nas_volume: NasVolumeSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NasVolumeSpec {
    pub server_name: Vec<String>,
    pub path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatastoreSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vsan_datastore_spec: Option<VsanDatastoreSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nfs_datastore_specs: Option<Vec<NfsDatastoreSpec>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub name: String,
    pub host_specs: Vec<HostSpec>,
    pub datastore_spec: DatastoreSpec,
    pub network_spec: NetworkSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeSpec {
    pub cluster_specs: Vec<ClusterSpec>,
}

/// Request to create a workload domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainCreationSpec {
    pub domain_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_name: Option<String>,
    pub vcenter_spec: VcenterSpec,
    #[serde(rename = "nsxTSpec", skip_serializing_if = "Option::is_none")]
    pub nsx_t_spec: Option<NsxTSpec>,
    pub compute_spec: ComputeSpec,
}

/// Partial update of a workload domain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainUpdateSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark_for_deletion: Option<bool>,
}

/// Request to add a cluster to an existing domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCreationSpec {
    pub domain_id: String,
    pub compute_spec: ComputeSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterExpansionSpec {
    pub host_specs: Vec<HostSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostReference {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCompactionSpec {
    pub hosts: Vec<HostReference>,
}

/// Partial update of an existing cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterUpdateSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark_for_deletion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_expansion_spec: Option<ClusterExpansionSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_compaction_spec: Option<ClusterCompactionSpec>,
}

fn network_details(network: &ApplianceNetwork) -> NetworkDetailsSpec {
    NetworkDetailsSpec {
        ip_address: network.ip_address.clone(),
        dns_name: network.dns_name.clone(),
        gateway: network.gateway.clone(),
        subnet_mask: network.subnet_mask.clone(),
    }
}

pub fn build_vcenter_spec(vcenter: &VcenterDesiredState) -> VcenterSpec {
    VcenterSpec {
        name: vcenter.name.clone(),
        network_details_spec: network_details(&vcenter.network),
        datacenter_name: vcenter.datacenter_name.clone(),
        root_password: vcenter.root_password.clone(),
        vm_size: vcenter.vm_size.clone(),
        storage_size: vcenter.storage_size.clone(),
    }
}

pub fn build_nsx_spec(nsx: &NsxDesiredState) -> Result<NsxTSpec> {
    if nsx.managers.is_empty() {
        return Err(ReconcileError::SpecBuild(
            "nsx_configuration requires at least one manager node".to_string(),
        ));
    }
    Ok(NsxTSpec {
        nsx_manager_specs: nsx
            .managers
            .iter()
            .map(|m| NsxManagerSpec {
                name: m.name.clone(),
                network_details_spec: network_details(&m.network),
            })
            .collect(),
        vip: nsx.vip.clone(),
        vip_fqdn: nsx.vip_fqdn.clone(),
        license_key: nsx.license_key.clone(),
        nsx_manager_admin_password: nsx.admin_password.clone(),
        form_factor: nsx.form_factor.clone(),
    })
}

pub fn build_host_spec(host: &HostMembership) -> HostSpec {
    HostSpec {
        id: host.host_id.clone(),
        license_key: host.license_key.clone(),
        host_network_spec: HostNetworkSpec {
            vm_nics: host
                .nics
                .iter()
                .map(|n| VmNic {
                    id: n.nic.clone(),
                    vds_name: n.vds_name.clone(),
                })
                .collect(),
        },
    }
}

fn build_datastore_spec(datastore: &DatastoreDesiredState) -> DatastoreSpec {
    match datastore {
        DatastoreDesiredState::Vsan {
            datastore_name,
            failures_to_tolerate,
            license_key,
            dedup_and_compression,
        } => DatastoreSpec {
            vsan_datastore_spec: Some(VsanDatastoreSpec {
                datastore_name: datastore_name.clone(),
                failures_to_tolerate: *failures_to_tolerate,
                license_key: license_key.clone(),
                dedup_and_compression_enabled: *dedup_and_compression,
            }),
            nfs_datastore_specs: None,
        },
        DatastoreDesiredState::Nfs {
            datastore_name,
            server,
            path,
            read_only,
        } => DatastoreSpec {
            vsan_datastore_spec: None,
            nfs_datastore_specs: Some(vec![NfsDatastoreSpec {
                datastore_name: datastore_name.clone(),
                nas_volume: NasVolumeSpec {
                    server_name: vec![server.clone()],
                    path: path.clone(),
                    read_only: *read_only,
                },
            }]),
        },
    }
}

/// Build the compute spec of a single cluster.
pub fn build_cluster_spec(cluster: &ClusterDesiredState) -> Result<ClusterSpec> {
    if cluster.hosts.is_empty() {
        return Err(ReconcileError::SpecBuild(format!(
            "cluster '{}' has no hosts",
            cluster.name
        )));
    }
    if cluster.vds.is_empty() {
        return Err(ReconcileError::SpecBuild(format!(
            "cluster '{}' has no vds",
            cluster.name
        )));
    }

    Ok(ClusterSpec {
        name: cluster.name.clone(),
        host_specs: cluster.hosts.iter().map(build_host_spec).collect(),
        datastore_spec: build_datastore_spec(&cluster.datastore),
        network_spec: NetworkSpec {
            vds_specs: cluster
                .vds
                .iter()
                .map(|v| VdsSpec {
                    name: v.name.clone(),
                    port_group_specs: v
                        .port_groups
                        .iter()
                        .map(|p| PortgroupSpec {
                            name: p.name.clone(),
                            transport_type: p.transport_type,
                        })
                        .collect(),
                })
                .collect(),
            nsx_cluster_spec: NsxClusterSpec {
                nsx_t_cluster_spec: NsxTClusterSpec {
                    geneve_vlan_id: cluster.geneve_vlan_id,
                },
            },
        },
    })
}

/// Build the creation spec of a domain and all of its clusters.
pub fn build_create_spec(domain: &DomainDesiredState) -> Result<DomainCreationSpec> {
    if domain.clusters.is_empty() {
        return Err(ReconcileError::SpecBuild(format!(
            "domain '{}' has no cluster configuration",
            domain.name
        )));
    }

    let cluster_specs = domain
        .clusters
        .iter()
        .map(build_cluster_spec)
        .collect::<Result<Vec<_>>>()?;

    Ok(DomainCreationSpec {
        domain_name: domain.name.clone(),
        org_name: domain.org_name.clone(),
        vcenter_spec: build_vcenter_spec(&domain.vcenter),
        nsx_t_spec: domain.nsx.as_ref().map(build_nsx_spec).transpose()?,
        compute_spec: ComputeSpec { cluster_specs },
    })
}

/// Build the spec adding one cluster to an existing domain.
pub fn build_cluster_creation_spec(
    domain_id: &str,
    cluster: &ClusterDesiredState,
) -> Result<ClusterCreationSpec> {
    Ok(ClusterCreationSpec {
        domain_id: domain_id.to_string(),
        compute_spec: ComputeSpec {
            cluster_specs: vec![build_cluster_spec(cluster)?],
        },
    })
}

/// Build the minimal domain update spec, or `None` if nothing updatable changed.
pub fn build_update_spec(
    prior: &DomainDesiredState,
    desired: &DomainDesiredState,
) -> Option<DomainUpdateSpec> {
    (prior.name != desired.name).then(|| DomainUpdateSpec {
        name: Some(desired.name.clone()),
        ..Default::default()
    })
}

pub fn build_domain_deletion_mark() -> DomainUpdateSpec {
    DomainUpdateSpec {
        name: None,
        mark_for_deletion: Some(true),
    }
}

pub fn build_cluster_deletion_mark() -> ClusterUpdateSpec {
    ClusterUpdateSpec {
        mark_for_deletion: Some(true),
        ..Default::default()
    }
}

pub fn build_cluster_rename_spec(name: &str) -> ClusterUpdateSpec {
    ClusterUpdateSpec {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

/// Build an expansion and/or contraction spec from a host change.
pub fn build_host_change_spec(change: &HostChange) -> Result<ClusterUpdateSpec> {
    let expansion = |added: &[HostMembership]| ClusterExpansionSpec {
        host_specs: added.iter().map(build_host_spec).collect(),
    };
    let compaction = |removed: &[HostMembership]| ClusterCompactionSpec {
        hosts: removed
            .iter()
            .map(|h| HostReference {
                id: h.host_id.clone(),
            })
            .collect(),
    };

    let spec = match change {
        HostChange::NoChange => {
            return Err(ReconcileError::SpecBuild(
                "no host change to build an update spec from".to_string(),
            ));
        }
        HostChange::Expand(added) => ClusterUpdateSpec {
            cluster_expansion_spec: Some(expansion(added)),
            ..Default::default()
        },
        HostChange::Contract(removed) => ClusterUpdateSpec {
            cluster_compaction_spec: Some(compaction(removed)),
            ..Default::default()
        },
        HostChange::ExpandAndContract { added, removed } => ClusterUpdateSpec {
            cluster_expansion_spec: Some(expansion(added)),
            cluster_compaction_spec: Some(compaction(removed)),
            ..Default::default()
        },
    };
    Ok(spec)
}

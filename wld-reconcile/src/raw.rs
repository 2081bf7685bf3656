//! Raw desired-state input and its conversion into typed records.
//!
//! The raw records mirror the declarative configuration file: every field is
//! optional and nested blocks are lists. `TryFrom` turns them into the typed
//! model, rejecting missing or malformed fields with a
//! [`ReconcileError::SpecBuild`] naming the field path.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};
use crate::model::{
    ApplianceNetwork, ClusterDesiredState, ClusterResource, DatastoreDesiredState,
    DomainDesiredState, HostMembership, NicBinding, NsxDesiredState, NsxManagerNode, PortGroup,
    TransportType, VcenterDesiredState, VdsDesiredState,
};

const NAME_LEN: std::ops::RangeInclusive<usize> = 3..=20;
const MAX_FAILURES_TO_TOLERATE: u8 = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    pub name: Option<String>,
    pub org_name: Option<String>,
    pub vcenter: Vec<VcenterConfig>,
    pub nsx_configuration: Vec<NsxConfig>,
    pub cluster: Vec<ClusterConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VcenterConfig {
    pub name: Option<String>,
    pub ip_address: Option<String>,
    pub dns_name: Option<String>,
    pub gateway: Option<String>,
    pub subnet_mask: Option<String>,
    pub datacenter_name: Option<String>,
    pub root_password: Option<String>,
    pub vm_size: Option<String>,
    pub storage_size: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NsxConfig {
    pub nsx_manager_node: Vec<NsxManagerConfig>,
    pub vip: Option<String>,
    pub vip_fqdn: Option<String>,
    pub license_key: Option<String>,
    pub nsx_manager_admin_password: Option<String>,
    pub form_factor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NsxManagerConfig {
    pub name: Option<String>,
    pub ip_address: Option<String>,
    pub dns_name: Option<String>,
    pub gateway: Option<String>,
    pub subnet_mask: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub name: Option<String>,
    pub id: Option<String>,
    pub host: Vec<HostConfig>,
    pub vds: Vec<VdsConfig>,
    pub vsan_datastore: Vec<VsanDatastoreConfig>,
    pub nfs_datastores: Vec<NfsDatastoreConfig>,
    pub geneve_vlan_id: Option<u16>,
}

/// A cluster managed on its own, attached to an existing domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterResourceConfig {
    pub domain_id: Option<String>,
    #[serde(flatten)]
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub id: Option<String>,
    pub license_key: Option<String>,
    pub vmnic: Vec<VmnicConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VmnicConfig {
    pub id: Option<String>,
    pub vds_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VdsConfig {
    pub name: Option<String>,
    pub portgroup: Vec<PortgroupConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortgroupConfig {
    pub name: Option<String>,
    pub transport_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VsanDatastoreConfig {
    pub datastore_name: Option<String>,
    pub failures_to_tolerate: Option<u8>,
    pub license_key: Option<String>,
    pub dedup_and_compression_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NfsDatastoreConfig {
    pub datastore_name: Option<String>,
    pub server_name: Option<String>,
    pub path: Option<String>,
    pub read_only: Option<bool>,
}

fn invalid(path: &str, problem: impl std::fmt::Display) -> ReconcileError {
    ReconcileError::SpecBuild(format!("{}: {}", path, problem))
}

fn required(value: Option<String>, path: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(invalid(path, "is required")),
    }
}

fn name_in_range(value: String, path: &str) -> Result<String> {
    let len = value.chars().count();
    if NAME_LEN.contains(&len) {
        Ok(value)
    } else {
        Err(invalid(
            path,
            format!(
                "must be {} to {} characters, got {}",
                NAME_LEN.start(),
                NAME_LEN.end(),
                len
            ),
        ))
    }
}

fn exactly_one<T>(mut items: Vec<T>, path: &str) -> Result<T> {
    match items.len() {
        1 => Ok(items.remove(0)),
        0 => Err(invalid(path, "exactly one block is required")),
        n => Err(invalid(path, format!("exactly one block is allowed, got {}", n))),
    }
}

fn at_most_one<T>(mut items: Vec<T>, path: &str) -> Result<Option<T>> {
    match items.len() {
        0 => Ok(None),
        1 => Ok(Some(items.remove(0))),
        n => Err(invalid(path, format!("at most one block is allowed, got {}", n))),
    }
}

fn network(
    ip_address: Option<String>,
    dns_name: Option<String>,
    gateway: Option<String>,
    subnet_mask: Option<String>,
    path: &str,
) -> Result<ApplianceNetwork> {
    Ok(ApplianceNetwork {
        ip_address: required(ip_address, &format!("{}.ip_address", path))?,
        dns_name: required(dns_name, &format!("{}.dns_name", path))?,
        gateway,
        subnet_mask,
    })
}

fn transport_type(value: &str, path: &str) -> Result<TransportType> {
    match value.to_ascii_uppercase().as_str() {
        "MANAGEMENT" => Ok(TransportType::Management),
        "VSAN" => Ok(TransportType::Vsan),
        "VMOTION" => Ok(TransportType::Vmotion),
        "PUBLIC" => Ok(TransportType::Public),
        "NFS" => Ok(TransportType::Nfs),
        other => Err(invalid(path, format!("unknown transport type '{}'", other))),
    }
}

fn convert_vcenter(raw: VcenterConfig) -> Result<VcenterDesiredState> {
    let path = "vcenter";
    Ok(VcenterDesiredState {
        name: required(raw.name, "vcenter.name")?,
        network: network(raw.ip_address, raw.dns_name, raw.gateway, raw.subnet_mask, path)?,
        datacenter_name: required(raw.datacenter_name, "vcenter.datacenter_name")?,
        root_password: required(raw.root_password, "vcenter.root_password")?,
        vm_size: raw.vm_size,
        storage_size: raw.storage_size,
    })
}

fn convert_nsx(raw: NsxConfig) -> Result<NsxDesiredState> {
    if raw.nsx_manager_node.is_empty() {
        return Err(invalid(
            "nsx_configuration.nsx_manager_node",
            "at least one manager node is required",
        ));
    }
    let managers = raw
        .nsx_manager_node
        .into_iter()
        .enumerate()
        .map(|(i, node)| {
            let path = format!("nsx_configuration.nsx_manager_node[{}]", i);
            Ok(NsxManagerNode {
                name: required(node.name, &format!("{}.name", path))?,
                network: network(
                    node.ip_address,
                    node.dns_name,
                    node.gateway,
                    node.subnet_mask,
                    &path,
                )?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(NsxDesiredState {
        managers,
        vip: required(raw.vip, "nsx_configuration.vip")?,
        vip_fqdn: required(raw.vip_fqdn, "nsx_configuration.vip_fqdn")?,
        license_key: required(raw.license_key, "nsx_configuration.license_key")?,
        admin_password: required(
            raw.nsx_manager_admin_password,
            "nsx_configuration.nsx_manager_admin_password",
        )?,
        form_factor: raw.form_factor,
    })
}

fn convert_datastore(
    vsan: Vec<VsanDatastoreConfig>,
    nfs: Vec<NfsDatastoreConfig>,
    path: &str,
) -> Result<DatastoreDesiredState> {
    match (vsan.len(), nfs.len()) {
        (1, 0) => {
            let ds = exactly_one(vsan, &format!("{}.vsan_datastore", path))?;
            let ftt = ds.failures_to_tolerate.unwrap_or(1);
            if ftt > MAX_FAILURES_TO_TOLERATE {
                return Err(invalid(
                    &format!("{}.vsan_datastore.failures_to_tolerate", path),
                    format!("must be at most {}", MAX_FAILURES_TO_TOLERATE),
                ));
            }
            Ok(DatastoreDesiredState::Vsan {
                datastore_name: required(
                    ds.datastore_name,
                    &format!("{}.vsan_datastore.datastore_name", path),
                )?,
                failures_to_tolerate: ftt,
                license_key: required(
                    ds.license_key,
                    &format!("{}.vsan_datastore.license_key", path),
                )?,
                dedup_and_compression: ds.dedup_and_compression_enabled.unwrap_or(false),
            })
        }
        (0, 1) => {
            let ds = exactly_one(nfs, &format!("{}.nfs_datastores", path))?;
            let ds_path = format!("{}.nfs_datastores", path);
            Ok(DatastoreDesiredState::Nfs {
                datastore_name: required(ds.datastore_name, &format!("{}.datastore_name", ds_path))?,
                server: required(ds.server_name, &format!("{}.server_name", ds_path))?,
                path: required(ds.path, &format!("{}.path", ds_path))?,
                read_only: ds.read_only.unwrap_or(false),
            })
        }
        (v, n) => Err(invalid(
            path,
            format!(
                "exactly one primary datastore is required, got {} vsan and {} nfs",
                v, n
            ),
        )),
    }
}

fn convert_cluster(raw: ClusterConfig, path: &str) -> Result<ClusterDesiredState> {
    let name = required(raw.name, &format!("{}.name", path))?;

    if raw.vds.is_empty() {
        return Err(invalid(&format!("{}.vds", path), "at least one vds is required"));
    }
    let vds = raw
        .vds
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            let vds_path = format!("{}.vds[{}]", path, i);
            let port_groups = v
                .portgroup
                .into_iter()
                .enumerate()
                .map(|(j, pg)| {
                    let pg_path = format!("{}.portgroup[{}]", vds_path, j);
                    let kind = required(pg.transport_type, &format!("{}.transport_type", pg_path))?;
                    Ok(PortGroup {
                        name: required(pg.name, &format!("{}.name", pg_path))?,
                        transport_type: transport_type(&kind, &pg_path)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(VdsDesiredState {
                name: required(v.name, &format!("{}.name", vds_path))?,
                port_groups,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let vds_names: HashSet<&str> = vds.iter().map(|v| v.name.as_str()).collect();

    if raw.host.is_empty() {
        return Err(invalid(&format!("{}.host", path), "at least one host is required"));
    }
    let mut host_ids = HashSet::new();
    let mut hosts = Vec::with_capacity(raw.host.len());
    for (i, host) in raw.host.into_iter().enumerate() {
        let host_path = format!("{}.host[{}]", path, i);
        let host_id = required(host.id, &format!("{}.id", host_path))?;
        if !host_ids.insert(host_id.clone()) {
            return Err(invalid(&host_path, format!("duplicate host id '{}'", host_id)));
        }
        let nics = host
            .vmnic
            .into_iter()
            .enumerate()
            .map(|(j, nic)| {
                let nic_path = format!("{}.vmnic[{}]", host_path, j);
                let vds_name = required(nic.vds_name, &format!("{}.vds_name", nic_path))?;
                if !vds_names.contains(vds_name.as_str()) {
                    return Err(invalid(
                        &nic_path,
                        format!("vds '{}' is not declared on the cluster", vds_name),
                    ));
                }
                Ok(NicBinding {
                    nic: required(nic.id, &format!("{}.id", nic_path))?,
                    vds_name,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        hosts.push(HostMembership {
            host_id,
            license_key: required(host.license_key, &format!("{}.license_key", host_path))?,
            nics,
        });
    }

    Ok(ClusterDesiredState {
        name,
        id: raw.id.filter(|id| !id.is_empty()),
        hosts,
        vds,
        datastore: convert_datastore(raw.vsan_datastore, raw.nfs_datastores, path)?,
        geneve_vlan_id: raw.geneve_vlan_id,
    })
}

impl TryFrom<ClusterConfig> for ClusterDesiredState {
    type Error = ReconcileError;

    fn try_from(raw: ClusterConfig) -> Result<Self> {
        convert_cluster(raw, "cluster")
    }
}

impl TryFrom<ClusterResourceConfig> for ClusterResource {
    type Error = ReconcileError;

    fn try_from(raw: ClusterResourceConfig) -> Result<Self> {
        Ok(ClusterResource {
            domain_id: required(raw.domain_id, "domain_id")?,
            cluster: ClusterDesiredState::try_from(raw.cluster)?,
        })
    }
}

impl TryFrom<DomainConfig> for DomainDesiredState {
    type Error = ReconcileError;

    fn try_from(raw: DomainConfig) -> Result<Self> {
        let name = name_in_range(required(raw.name, "name")?, "name")?;
        let org_name = raw
            .org_name
            .map(|org| name_in_range(org, "org_name"))
            .transpose()?;
        let vcenter = convert_vcenter(exactly_one(raw.vcenter, "vcenter")?)?;
        let nsx = at_most_one(raw.nsx_configuration, "nsx_configuration")?
            .map(convert_nsx)
            .transpose()?;

        if raw.cluster.is_empty() {
            return Err(invalid("cluster", "at least one cluster is required"));
        }
        let mut names = HashSet::new();
        let mut clusters = Vec::with_capacity(raw.cluster.len());
        for (i, cluster) in raw.cluster.into_iter().enumerate() {
            let cluster = convert_cluster(cluster, &format!("cluster[{}]", i))?;
            if !names.insert(cluster.name.clone()) {
                return Err(invalid(
                    &format!("cluster[{}]", i),
                    format!("duplicate cluster name '{}'", cluster.name),
                ));
            }
            clusters.push(cluster);
        }

        Ok(DomainDesiredState {
            name,
            org_name,
            vcenter,
            nsx,
            clusters,
        })
    }
}

//! Remote management plane client abstraction.
//!
//! The reconciler never talks HTTP itself; it drives an implementation of
//! [`RemoteClient`] supplied by the caller through the reconcile context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::model::{DeleteResponse, RemoteCluster, RemoteDomain, RemoteTask, TaskRef};
use crate::spec::{ClusterCreationSpec, ClusterUpdateSpec, DomainCreationSpec, DomainUpdateSpec};

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Status of a validation run or of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Succeeded,
    Warning,
    Failed,
    #[serde(other)]
    Unknown,
}

/// A single check of a dry-run validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub description: String,
    pub result_status: CheckStatus,
    pub error_message: Option<String>,
}

/// Raw result of a remote dry-run validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub result_status: CheckStatus,
    pub checks: Vec<ValidationCheck>,
}

/// Operations the reconciler needs from the management plane.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Dry-run a domain creation spec.
    async fn validate_domain(&self, spec: &DomainCreationSpec) -> RemoteResult<ValidationReport>;

    async fn create_domain(&self, spec: &DomainCreationSpec) -> RemoteResult<TaskRef>;

    async fn update_domain(&self, id: &str, spec: &DomainUpdateSpec) -> RemoteResult<TaskRef>;

    async fn delete_domain(&self, id: &str) -> RemoteResult<DeleteResponse>;

    /// Get a domain by ID. `None` if the remote system does not know it.
    async fn get_domain(&self, id: &str) -> RemoteResult<Option<RemoteDomain>>;

    /// Dry-run adding a cluster to a domain.
    async fn validate_cluster_creation(
        &self,
        spec: &ClusterCreationSpec,
    ) -> RemoteResult<ValidationReport>;

    /// Dry-run an update of an existing cluster.
    async fn validate_cluster_update(
        &self,
        id: &str,
        spec: &ClusterUpdateSpec,
    ) -> RemoteResult<ValidationReport>;

    async fn create_cluster(&self, spec: &ClusterCreationSpec) -> RemoteResult<TaskRef>;

    async fn update_cluster(&self, id: &str, spec: &ClusterUpdateSpec) -> RemoteResult<TaskRef>;

    async fn delete_cluster(&self, id: &str) -> RemoteResult<DeleteResponse>;

    /// Get a cluster by ID. `None` if the remote system does not know it.
    async fn get_cluster(&self, id: &str) -> RemoteResult<Option<RemoteCluster>>;

    /// List all clusters known to the management plane.
    async fn list_clusters(&self) -> RemoteResult<Vec<RemoteCluster>>;

    async fn get_task(&self, id: &str) -> RemoteResult<RemoteTask>;

    /// Whether one cluster update may both add and remove hosts.
    fn supports_combined_expand_contract(&self) -> bool {
        false
    }
}

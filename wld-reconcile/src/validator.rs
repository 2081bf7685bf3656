//! Check-before-mutate validation against the remote dry-run endpoints.

use tracing::{debug, warn};

use crate::client::{CheckStatus, RemoteClient, ValidationReport};
use crate::error::{ReconcileError, Result, ValidationReason};
use crate::spec::{ClusterCreationSpec, ClusterUpdateSpec, DomainCreationSpec};

/// Outcome of a dry-run validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid(Vec<ValidationReason>),
}

impl ValidationOutcome {
    /// Turn an `Invalid` outcome into a terminal error.
    pub fn into_result(self) -> Result<()> {
        match self {
            ValidationOutcome::Valid => Ok(()),
            ValidationOutcome::Invalid(reasons) => {
                Err(ReconcileError::ValidationFailed { reasons })
            }
        }
    }
}

impl From<ValidationReport> for ValidationOutcome {
    fn from(report: ValidationReport) -> Self {
        match report.result_status {
            CheckStatus::Succeeded | CheckStatus::Warning => return ValidationOutcome::Valid,
            CheckStatus::Unknown => {
                return ValidationOutcome::Invalid(vec![ValidationReason {
                    description: "validation did not reach a result".to_string(),
                    message: Some(format!("unrecognised result status {:?}", report.result_status)),
                }]);
            }
            CheckStatus::Failed => {}
        }

        let mut reasons: Vec<ValidationReason> = report
            .checks
            .into_iter()
            .filter(|c| c.result_status == CheckStatus::Failed)
            .map(|c| ValidationReason {
                description: c.description,
                message: c.error_message,
            })
            .collect();

        // A failed run without failed checks still has to surface something.
        if reasons.is_empty() {
            reasons.push(ValidationReason {
                description: "validation failed".to_string(),
                message: None,
            });
        }
        ValidationOutcome::Invalid(reasons)
    }
}

/// Submits candidate specs to the remote dry-run endpoints.
pub struct Validator<'a> {
    client: &'a dyn RemoteClient,
}

impl<'a> Validator<'a> {
    pub fn new(client: &'a dyn RemoteClient) -> Self {
        Self { client }
    }

    fn outcome(&self, subject: &str, report: ValidationReport) -> ValidationOutcome {
        let outcome = ValidationOutcome::from(report);
        match &outcome {
            ValidationOutcome::Valid => debug!("Validation of {} passed", subject),
            ValidationOutcome::Invalid(reasons) => {
                warn!("Validation of {} failed with {} reason(s)", subject, reasons.len())
            }
        }
        outcome
    }

    pub async fn validate_domain(&self, spec: &DomainCreationSpec) -> Result<ValidationOutcome> {
        let report = self
            .client
            .validate_domain(spec)
            .await
            .map_err(ReconcileError::remote("validate domain"))?;
        Ok(self.outcome(&format!("domain '{}'", spec.domain_name), report))
    }

    pub async fn validate_cluster_creation(
        &self,
        spec: &ClusterCreationSpec,
    ) -> Result<ValidationOutcome> {
        let report = self
            .client
            .validate_cluster_creation(spec)
            .await
            .map_err(ReconcileError::remote("validate cluster creation"))?;
        Ok(self.outcome(
            &format!("new cluster(s) in domain {}", spec.domain_id),
            report,
        ))
    }

    pub async fn validate_cluster_update(
        &self,
        id: &str,
        spec: &ClusterUpdateSpec,
    ) -> Result<ValidationOutcome> {
        let report = self
            .client
            .validate_cluster_update(id, spec)
            .await
            .map_err(ReconcileError::remote("validate cluster update"))?;
        Ok(self.outcome(&format!("update of cluster {}", id), report))
    }
}

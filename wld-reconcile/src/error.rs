//! Reconciliation error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// A single check reported by the remote dry-run validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReason {
    /// What was checked.
    pub description: String,
    /// Error message returned for the failed check, if any.
    pub message: Option<String>,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.description, message),
            None => write!(f, "{}", self.description),
        }
    }
}

/// Errors returned by a [`crate::RemoteClient`] implementation.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The request never produced a response (connection, TLS, timeout).
    #[error("transport: {0}")]
    Transport(String),

    /// The remote API answered with a non-success status.
    #[error("remote returned {status}{}: {message}", .code.as_deref().map(|c| format!(" ({})", c)).unwrap_or_default())]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The response body could not be decoded.
    #[error("decode: {0}")]
    Decode(String),
}

/// What the caller should do with a failed reconciliation pass.
///
/// Variant order is significant: `Members` reports the greatest action
/// among its failures, ignoring `DropRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CallerAction {
    /// The desired state is wrong; retrying will not help.
    FixInput,
    /// Transient failure; re-run the whole pass.
    Retry,
    /// Outcome unknown; re-read remote state before assuming failure.
    Reread,
    /// Surface the error to the operator verbatim.
    Surface,
    /// The remote resource is gone; drop the local record.
    DropRecord,
}

/// A failure attributed to one member (cluster) of a multi-member change.
#[derive(Debug)]
pub struct MemberFailure {
    /// Cluster name the operation was applied to.
    pub member: String,
    /// Operation that failed ("create", "expand", "delete", ...).
    pub operation: &'static str,
    pub error: ReconcileError,
}

impl fmt::Display for MemberFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.operation, self.member, self.error)
    }
}

/// Errors that can occur while reconciling a domain or cluster.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Desired state is malformed or incomplete.
    #[error("invalid desired state: {0}")]
    SpecBuild(String),

    /// Remote dry-run validation rejected the spec.
    #[error("validation failed: {}", join(.reasons))]
    ValidationFailed { reasons: Vec<ValidationReason> },

    /// A remote API call failed.
    #[error("remote call {operation} failed: {source}")]
    RemoteCall {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },

    /// Task did not reach a terminal state in time.
    #[error("task {task_id} did not complete within {timeout:?}")]
    TaskTimeout { task_id: String, timeout: Duration },

    /// Polling was cancelled by the caller; the remote task keeps running.
    #[error("polling of task {task_id} cancelled")]
    Cancelled { task_id: String },

    /// Task reached the FAILED terminal state.
    #[error("task {task_id} failed{}", if .errors.is_empty() { String::new() } else { format!(": {}", .errors.join("; ")) })]
    TaskFailed {
        task_id: String,
        /// Set when the failed task was supposed to create the resource.
        fatal: bool,
        errors: Vec<String>,
    },

    /// A completed task does not reference a resource of the requested kind.
    #[error("task {task_id} does not reference a {kind} resource")]
    TaskResourceMissing { task_id: String, kind: String },

    /// Resource does not exist remotely.
    #[error("not found: {0}")]
    NotFound(String),

    /// The change could not be classified without guessing.
    #[error("ambiguous change: {0}")]
    AmbiguousDiff(String),

    /// Remote state violates an invariant of the data model.
    #[error("data integrity: {0}")]
    DataIntegrity(String),

    /// One or more independent member operations failed.
    #[error("{} member operation(s) failed: {}", .0.len(), join(.0))]
    Members(Vec<MemberFailure>),
}

impl ReconcileError {
    pub(crate) fn remote(operation: &'static str) -> impl FnOnce(RemoteError) -> Self {
        move |source| ReconcileError::RemoteCall { operation, source }
    }

    /// How the caller should react to this error.
    pub fn caller_action(&self) -> CallerAction {
        match self {
            ReconcileError::SpecBuild(_) | ReconcileError::AmbiguousDiff(_) => {
                CallerAction::FixInput
            }
            ReconcileError::RemoteCall { .. } => CallerAction::Retry,
            ReconcileError::TaskTimeout { .. } | ReconcileError::Cancelled { .. } => {
                CallerAction::Reread
            }
            ReconcileError::ValidationFailed { .. }
            | ReconcileError::TaskFailed { .. }
            | ReconcileError::TaskResourceMissing { .. }
            | ReconcileError::DataIntegrity(_) => CallerAction::Surface,
            ReconcileError::NotFound(_) => CallerAction::DropRecord,
            ReconcileError::Members(failures) => failures
                .iter()
                .map(|f| f.error.caller_action())
                .filter(|a| *a != CallerAction::DropRecord)
                .max()
                .unwrap_or(CallerAction::Surface),
        }
    }

    /// The remote task this error is about, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ReconcileError::TaskTimeout { task_id, .. }
            | ReconcileError::Cancelled { task_id }
            | ReconcileError::TaskFailed { task_id, .. }
            | ReconcileError::TaskResourceMissing { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    /// True for errors after which the remote resource may or may not exist.
    pub fn is_indeterminate(&self) -> bool {
        self.caller_action() == CallerAction::Reread
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

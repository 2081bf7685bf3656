//! Workload domain reconciliation against an asynchronous task-based
//! management plane.

pub mod audit;
pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod model;
pub mod raw;
pub mod reconciler;
pub mod spec;
pub mod task;
pub mod validator;

pub use audit::ReconcileAuditLogger;
pub use client::{RemoteClient, RemoteResult};
pub use config::{OperationClass, ReconcileContext, ReconcilerConfig};
pub use diff::{DomainUpdatePlan, plan_domain_update};
pub use error::{CallerAction, ReconcileError, RemoteError, Result};
pub use reconciler::{ClusterReconciler, DomainReconciler, Reconciler};
pub use task::{TaskOutcome, TaskTracker};
pub use validator::{ValidationOutcome, Validator};

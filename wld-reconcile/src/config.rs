//! Reconciler configuration and per-call context.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::audit::ReconcileAuditLogger;
use crate::client::RemoteClient;

/// Class of remote operation, used to pick timeouts and poll cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    Create,
    Read,
    Update,
    Delete,
}

/// Timeouts and poll intervals for reconciliation passes.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub create_timeout: Duration,
    pub read_timeout: Duration,
    pub update_timeout: Duration,
    pub delete_timeout: Duration,
    /// Poll cadence for create and update tasks.
    pub mutate_poll_interval: Duration,
    pub delete_poll_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            create_timeout: Duration::from_secs(4 * 60 * 60),
            read_timeout: Duration::from_secs(20 * 60),
            update_timeout: Duration::from_secs(4 * 60 * 60),
            delete_timeout: Duration::from_secs(60 * 60),
            mutate_poll_interval: Duration::from_secs(20),
            delete_poll_interval: Duration::from_secs(10),
        }
    }
}

impl ReconcilerConfig {
    pub fn timeout(&self, class: OperationClass) -> Duration {
        match class {
            OperationClass::Create => self.create_timeout,
            OperationClass::Read => self.read_timeout,
            OperationClass::Update => self.update_timeout,
            OperationClass::Delete => self.delete_timeout,
        }
    }

    pub fn poll_interval(&self, class: OperationClass) -> Duration {
        match class {
            OperationClass::Delete => self.delete_poll_interval,
            _ => self.mutate_poll_interval,
        }
    }
}

/// Everything a reconciliation call needs, passed explicitly on each call.
#[derive(Clone)]
pub struct ReconcileContext {
    pub client: Arc<dyn RemoteClient>,
    pub config: Arc<ReconcilerConfig>,
    pub audit: Arc<ReconcileAuditLogger>,
    /// Cancelled by the caller to abandon in-progress polls.
    pub cancel: CancellationToken,
}

impl ReconcileContext {
    pub fn new(client: Arc<dyn RemoteClient>, config: ReconcilerConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
            audit: Arc::new(ReconcileAuditLogger::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<ReconcileAuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancel in-progress polls once `deadline` has elapsed.
    pub fn cancel_after(&self, deadline: Duration) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => cancel.cancel(),
                _ = cancel.cancelled() => {}
            }
        });
    }
}

//! Audit trail of remote mutations.
//!
//! Every completed create, update, or delete is emitted as an `info` event
//! on the `audit` target, tagged with the affected object ids.

use tracing::info;

/// Audit logger for reconciliation events.
pub struct ReconcileAuditLogger {
    enabled: bool,
}

impl ReconcileAuditLogger {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    pub fn new_noop() -> Self {
        Self { enabled: false }
    }

    fn log(&self, message: String, object_ids: &[&str]) {
        if !self.enabled {
            return;
        }
        info!(target: "audit", objects = ?object_ids, "{}", message);
    }

    // Domain events
    pub fn domain_created(&self, domain_id: &str, name: &str) {
        self.log(
            format!("Domain created: {} ({})", name, domain_id),
            &[domain_id],
        );
    }

    pub fn domain_renamed(&self, domain_id: &str, name: &str) {
        self.log(format!("Domain renamed to {}", name), &[domain_id]);
    }

    pub fn domain_marked_for_deletion(&self, domain_id: &str) {
        self.log(
            format!("Domain marked for deletion: {}", domain_id),
            &[domain_id],
        );
    }

    pub fn domain_deleted(&self, domain_id: &str) {
        self.log(format!("Domain deleted: {}", domain_id), &[domain_id]);
    }

    // Cluster events
    pub fn cluster_created(&self, domain_id: &str, cluster_id: &str, name: &str) {
        self.log(
            format!("Cluster created: {} ({}) in domain {}", name, cluster_id, domain_id),
            &[domain_id, cluster_id],
        );
    }

    pub fn cluster_renamed(&self, cluster_id: &str, name: &str) {
        self.log(format!("Cluster renamed to {}", name), &[cluster_id]);
    }

    pub fn cluster_hosts_changed(&self, cluster_id: &str, added: &[String], removed: &[String]) {
        let mut ids: Vec<&str> = vec![cluster_id];
        ids.extend(added.iter().map(String::as_str));
        ids.extend(removed.iter().map(String::as_str));
        self.log(
            format!(
                "Cluster {} hosts changed: +{} -{}",
                cluster_id,
                added.len(),
                removed.len()
            ),
            &ids,
        );
    }

    pub fn cluster_deleted(&self, cluster_id: &str) {
        self.log(format!("Cluster deleted: {}", cluster_id), &[cluster_id]);
    }
}

impl Default for ReconcileAuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

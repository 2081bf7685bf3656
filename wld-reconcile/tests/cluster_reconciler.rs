//! Standalone cluster reconciler integration tests.

mod common;

use std::sync::Arc;

use tokio_test::{assert_err, assert_ok};
use wld_reconcile::model::{ClusterObservedState, ClusterResource, TaskStatus};
use wld_reconcile::{CallerAction, ClusterReconciler, ReconcileContext, ReconcileError, Reconciler};

use common::{Call, MockRemoteClient, cluster, context, domain, failing_report};

/// A domain "wld01" with one cluster, plus a standalone cluster `name`.
async fn setup(
    client: &Arc<MockRemoteClient>,
    ctx: &ReconcileContext,
    name: &str,
    hosts: &[&str],
) -> (ClusterResource, ClusterObservedState) {
    let parent = wld_reconcile::DomainReconciler::new()
        .create(ctx, &domain("wld01", vec![cluster("cl01", &["h1"])]))
        .await
        .unwrap();
    let resource = ClusterResource {
        domain_id: parent.id.clone(),
        cluster: cluster(name, hosts),
    };
    let observed = ClusterReconciler::new().create(ctx, &resource).await.unwrap();
    client.clear_calls();
    (resource, observed)
}

#[tokio::test(start_paused = true)]
async fn test_create_attaches_cluster_to_domain() {
    let client = MockRemoteClient::new();
    let ctx = context(client.clone());
    let (resource, observed) = setup(&client, &ctx, "cl02", &["h2", "h3"]).await;

    assert_eq!(observed.desired.name, "cl02");
    assert_eq!(observed.domain_id.as_deref(), Some(resource.domain_id.as_str()));
    assert_eq!(observed.primary_datastore_type.as_deref(), Some("VSAN"));
    assert_eq!(observed.hosts.len(), 2);
    let parent = client.domain(&resource.domain_id).unwrap();
    assert!(parent.cluster_ids.contains(&observed.id));
}

#[tokio::test(start_paused = true)]
async fn test_create_validation_rejection_makes_no_mutation() {
    let client = MockRemoteClient::new();
    let ctx = context(client.clone());
    client.reject_cluster_validation(failing_report("Validate hosts", "host h9 not commissioned"));

    let resource = ClusterResource {
        domain_id: "domain-1".to_string(),
        cluster: cluster("cl02", &["h9"]),
    };
    let err = assert_err!(ClusterReconciler::new().create(&ctx, &resource).await);
    assert!(matches!(err, ReconcileError::ValidationFailed { .. }));
    assert!(client.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_read_missing_cluster_is_not_found() {
    let client = MockRemoteClient::new();
    let ctx = context(client.clone());

    let resource = ClusterResource {
        domain_id: "domain-1".to_string(),
        cluster: cluster("cl02", &["h2"]),
    };
    let err = assert_err!(ClusterReconciler::new().read(&ctx, "cluster-404", &resource).await);
    assert_eq!(err.caller_action(), CallerAction::DropRecord);
}

#[tokio::test(start_paused = true)]
async fn test_rename_and_expand() {
    let client = MockRemoteClient::new();
    let ctx = context(client.clone());
    let (mut resource, prior) = setup(&client, &ctx, "cl02", &["h2"]).await;

    resource.cluster = cluster("cl02-renamed", &["h2", "h3"]);
    let observed = assert_ok!(ClusterReconciler::new().update(&ctx, &prior, &resource).await);

    let mutations = client.mutations();
    assert_eq!(mutations.len(), 2);
    assert!(
        matches!(&mutations[0], Call::UpdateCluster(id, spec) if *id == prior.id && spec.name.as_deref() == Some("cl02-renamed"))
    );
    assert!(
        matches!(&mutations[1], Call::UpdateCluster(_, spec) if spec.cluster_expansion_spec.is_some() && spec.name.is_none())
    );
    assert_eq!(observed.desired.name, "cl02-renamed");
    assert_eq!(observed.hosts.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_update_makes_no_mutation() {
    let client = MockRemoteClient::new();
    let ctx = context(client.clone());
    let (resource, prior) = setup(&client, &ctx, "cl02", &["h2"]).await;

    let observed = assert_ok!(ClusterReconciler::new().update(&ctx, &prior, &resource).await);
    assert!(client.mutations().is_empty());
    assert_eq!(observed, prior);
}

#[tokio::test(start_paused = true)]
async fn test_moving_cluster_between_domains_rejected() {
    let client = MockRemoteClient::new();
    let ctx = context(client.clone());
    let (mut resource, prior) = setup(&client, &ctx, "cl02", &["h2"]).await;

    resource.domain_id = "domain-other".to_string();
    let err = assert_err!(ClusterReconciler::new().update(&ctx, &prior, &resource).await);
    assert_eq!(err.caller_action(), CallerAction::FixInput);
    assert!(client.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_datastore_change_is_ambiguous() {
    let client = MockRemoteClient::new();
    let ctx = context(client.clone());
    let (mut resource, prior) = setup(&client, &ctx, "cl02", &["h2"]).await;

    resource.cluster.geneve_vlan_id = Some(42);
    let err = assert_err!(ClusterReconciler::new().update(&ctx, &prior, &resource).await);
    assert!(matches!(err, ReconcileError::AmbiguousDiff(_)));
}

#[tokio::test(start_paused = true)]
async fn test_update_validation_rejection_makes_no_mutation() {
    let client = MockRemoteClient::new();
    let ctx = context(client.clone());
    let (mut resource, prior) = setup(&client, &ctx, "cl02", &["h2"]).await;
    client.reject_cluster_validation(failing_report("Validate hosts", "h3 in use"));

    resource.cluster = cluster("cl02", &["h2", "h3"]);
    let err = assert_err!(ClusterReconciler::new().update(&ctx, &prior, &resource).await);
    assert!(matches!(err, ReconcileError::ValidationFailed { .. }));
    assert!(client.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delete_is_two_phase() {
    let client = MockRemoteClient::new();
    let ctx = context(client.clone());
    let (_, prior) = setup(&client, &ctx, "cl02", &["h2"]).await;

    assert_ok!(ClusterReconciler::new().delete(&ctx, &prior).await);

    let mutations = client.mutations();
    assert_eq!(mutations.len(), 2);
    assert!(
        matches!(&mutations[0], Call::UpdateCluster(id, spec) if *id == prior.id && spec.mark_for_deletion == Some(true))
    );
    assert_eq!(mutations[1], Call::DeleteCluster(prior.id.clone()));
    assert!(client.cluster(&prior.id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_mark_never_submits_delete() {
    let client = MockRemoteClient::new();
    let ctx = context(client.clone());
    let (_, prior) = setup(&client, &ctx, "cl02", &["h2"]).await;
    client.script("update_cluster", vec![TaskStatus::Failed]);

    let err = assert_err!(ClusterReconciler::new().delete(&ctx, &prior).await);
    assert!(matches!(err, ReconcileError::TaskFailed { fatal: false, .. }));
    assert!(
        !client
            .calls()
            .iter()
            .any(|c| matches!(c, Call::DeleteCluster(_)))
    );
    assert!(client.cluster(&prior.id).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_delete_task_timeout_is_indeterminate() {
    let client = MockRemoteClient::new();
    let ctx = context(client.clone());
    let (_, prior) = setup(&client, &ctx, "cl02", &["h2"]).await;
    client.script("delete_cluster", vec![TaskStatus::InProgress]);

    let err = assert_err!(ClusterReconciler::new().delete(&ctx, &prior).await);
    assert!(matches!(err, ReconcileError::TaskTimeout { .. }));
    assert_eq!(err.caller_action(), CallerAction::Reread);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_uses_applied_state() {
    let client = MockRemoteClient::new();
    let ctx = context(client.clone());
    let (_, prior) = setup(&client, &ctx, "cl02", &["h2", "h3"]).await;

    let refreshed = assert_ok!(ClusterReconciler::new().refresh(&ctx, &prior).await);
    assert_eq!(refreshed, prior);
    assert!(client.mutations().is_empty());
}

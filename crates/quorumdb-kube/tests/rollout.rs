//! End-to-end fleet reconciliation against the in-memory store

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::StatefulSet;
use quorumdb_core::constants::labels;
use quorumdb_core::{ClusterView, MysqlCluster, MysqlClusterSpec};
use quorumdb_kube::store::fleet_pod;
use quorumdb_kube::{
    KubeError, MemoryEventPublisher, MockStore, OperationResult, RestartBehavior, Severity,
    StatefulSetSyncer, SyncerConfig, pod_updated,
};
use tokio::time::Instant;

const NAMESPACE: &str = "prod";
const FLEET: &str = "db-mysql";

fn cluster() -> MysqlCluster {
    let mut cluster = MysqlCluster::new("db", MysqlClusterSpec::default());
    cluster.metadata.namespace = Some(NAMESPACE.to_string());
    cluster.metadata.uid = Some("6b7a1c1e".to_string());
    cluster
}

fn syncer(store: &MockStore, events: &MemoryEventPublisher, config_rev: &str) -> StatefulSetSyncer {
    StatefulSetSyncer::new(
        Arc::new(store.clone()),
        Arc::new(events.clone()),
        ClusterView::new(cluster()),
        config_rev,
        "secret-1",
        SyncerConfig::default(),
    )
}

fn fleet(store: &MockStore) -> StatefulSet {
    store.statefulset(NAMESPACE, FLEET).expect("fleet exists")
}

fn update_revision(sts: &StatefulSet) -> String {
    sts.status
        .as_ref()
        .and_then(|s| s.update_revision.clone())
        .expect("update revision")
}

/// Create the fleet and its pods db-0, db-1 (leader) and db-2
async fn bootstrap(store: &MockStore, events: &MemoryEventPublisher) {
    let outcome = syncer(store, events, "config-1").sync().await.unwrap();
    assert_eq!(outcome.operation, OperationResult::Created);

    let sts = fleet(store);
    let selector = sts
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.clone())
        .unwrap();
    let revision = update_revision(&sts);
    for (name, role) in [
        ("db-0", labels::ROLE_CANDIDATE),
        ("db-1", labels::ROLE_LEADER),
        ("db-2", labels::ROLE_CANDIDATE),
    ] {
        store.insert_pod(fleet_pod(NAMESPACE, name, &selector, &revision, role));
    }
    store.reset_counts();
}

#[tokio::test(start_paused = true)]
async fn test_second_sync_is_a_noop() {
    let store = MockStore::new();
    let events = MemoryEventPublisher::new();
    bootstrap(&store, &events).await;

    let outcome = syncer(&store, &events, "config-1").sync().await.unwrap();

    assert_eq!(outcome.operation, OperationResult::None);
    let counts = store.operation_counts();
    assert_eq!(counts.updates, 0);
    assert_eq!(counts.lists, 0);
    assert_eq!(counts.deletes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_template_change_rolls_leader_last() {
    let store = MockStore::new();
    let events = MemoryEventPublisher::new();
    bootstrap(&store, &events).await;

    let outcome = syncer(&store, &events, "config-2").sync().await.unwrap();

    assert_eq!(outcome.operation, OperationResult::Updated);
    assert_eq!(
        outcome.event.message,
        "StatefulSet prod/db-mysql updated successfully"
    );
    assert_eq!(store.deleted_pods(), vec!["db-0", "db-2", "db-1"]);

    let target = update_revision(&fleet(&store));
    for name in ["db-0", "db-1", "db-2"] {
        assert!(pod_updated(&store.pod(NAMESPACE, name).unwrap(), &target));
    }

    // Converged: nothing left to do
    store.reset_counts();
    let outcome = syncer(&store, &events, "config-2").sync().await.unwrap();
    assert_eq!(outcome.operation, OperationResult::None);
    assert_eq!(store.operation_counts().deletes, 0);
    assert_eq!(store.operation_counts().updates, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_stops_before_leader() {
    let store = MockStore::new();
    let events = MemoryEventPublisher::new();
    bootstrap(&store, &events).await;
    store.set_restart_behavior(NAMESPACE, "db-2", RestartBehavior::NeverReady);
    let start = Instant::now();

    let err = syncer(&store, &events, "config-2").sync().await.unwrap_err();

    assert!(matches!(err, KubeError::WaitTimeout { ref what, .. } if what == "pod prod/db-2"));
    assert_eq!(Instant::now() - start, Duration::from_secs(2 * 60 * 60));
    assert_eq!(store.deleted_pods(), vec!["db-0", "db-2"]);

    let last = events.events().pop().unwrap();
    assert_eq!(last.severity, Severity::Warning);
    assert!(
        last.note
            .unwrap()
            .starts_with("StatefulSet prod/db-mysql failed syncing: timed out")
    );
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_fleet_is_retried_later() {
    let store = MockStore::new();
    let events = MemoryEventPublisher::new();
    bootstrap(&store, &events).await;

    let mut sick = store.pod(NAMESPACE, "db-1").unwrap();
    sick.metadata
        .labels
        .as_mut()
        .unwrap()
        .insert(labels::HEALTHY.to_string(), labels::HEALTHY_NO.to_string());
    store.insert_pod(sick.clone());

    let err = syncer(&store, &events, "config-2").sync().await.unwrap_err();
    assert!(matches!(err, KubeError::UnhealthyPrecondition { .. }));
    assert_eq!(store.operation_counts().updates, 1);
    assert_eq!(store.operation_counts().deletes, 0);

    // Leader recovers, a later reconcile finishes the rollout
    sick.metadata
        .labels
        .as_mut()
        .unwrap()
        .insert(labels::HEALTHY.to_string(), labels::HEALTHY_YES.to_string());
    store.insert_pod(sick);

    let outcome = syncer(&store, &events, "config-2").sync().await.unwrap();
    assert_eq!(outcome.operation, OperationResult::None);
    assert_eq!(store.deleted_pods(), vec!["db-0", "db-2", "db-1"]);
}

#[tokio::test(start_paused = true)]
async fn test_one_event_per_sync() {
    let store = MockStore::new();
    let events = MemoryEventPublisher::new();
    bootstrap(&store, &events).await;

    syncer(&store, &events, "config-1").sync().await.unwrap();
    syncer(&store, &events, "config-2").sync().await.unwrap();

    let recorded = events.events();
    assert_eq!(recorded.len(), 3);
    assert!(recorded.iter().all(|e| e.severity == Severity::Normal));
    assert!(recorded.iter().all(|e| e.object.as_deref() == Some("db")));
}

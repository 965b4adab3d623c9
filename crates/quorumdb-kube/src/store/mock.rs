//! Mock object store for testing
//!
//! This store keeps objects in memory, useful for unit tests without
//! requiring a Kubernetes cluster. It also plays the StatefulSet controller:
//! a template change moves `status.updateRevision`, and a deleted pod is
//! recreated at that revision according to its [`RestartBehavior`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetStatus};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use sha2::{Digest, Sha256};

use quorumdb_core::constants::{containers, labels};

use super::{ObjectStore, matches_selector};
use crate::error::{KubeError, Result};

/// In-memory object store for testing
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<RwLock<MockState>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
}

#[derive(Default)]
struct MockState {
    /// "namespace/name" -> object
    statefulsets: BTreeMap<String, StatefulSet>,
    pods: BTreeMap<String, Pod>,
    restarts: HashMap<String, RestartBehavior>,
    journal: Vec<Call>,
    version: u64,
}

impl MockState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

/// A store call, recorded in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetStatefulSet(String),
    CreateStatefulSet(String),
    UpdateStatefulSet(String),
    GetPod(String),
    ListPods(String),
    DeletePod(String),
}

/// How a deleted pod comes back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartBehavior {
    /// Running, ready and healthy at the update revision
    #[default]
    Healthy,
    /// Recreated in the Failed phase
    Failed,
    /// Running but its containers never become ready
    NeverReady,
    /// Never recreated
    Gone,
}

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

fn object_key(meta: &ObjectMeta) -> Result<(String, String)> {
    match (meta.namespace.as_deref(), meta.name.as_deref()) {
        (Some(namespace), Some(name)) => Ok((namespace.to_string(), name.to_string())),
        _ => Err(KubeError::InvalidFleet(
            "object has no namespace or name".to_string(),
        )),
    }
}

/// Revision name of the current template, like a ControllerRevision name
fn template_revision(sts: &StatefulSet) -> String {
    let name = sts.metadata.name.as_deref().unwrap_or_default();
    let template = sts
        .spec
        .as_ref()
        .map(|spec| serde_json::to_vec(&spec.template).unwrap_or_default())
        .unwrap_or_default();
    let digest = hex::encode(Sha256::digest(&template));
    format!("{name}-{}", &digest[..10])
}

fn pod_label<'a>(pod: &'a Pod, label: &str) -> Option<&'a str> {
    pod.metadata.labels.as_ref()?.get(label).map(String::as_str)
}

fn is_ready(pod: &Pod) -> bool {
    let status = pod.status.as_ref();
    status.and_then(|s| s.phase.as_deref()) == Some("Running")
        && status
            .and_then(|s| s.container_statuses.as_ref())
            .is_some_and(|cs| !cs.is_empty() && cs.iter().all(|c| c.ready))
}

fn pod_status(phase: &str, ready: bool) -> PodStatus {
    PodStatus {
        phase: Some(phase.to_string()),
        container_statuses: Some(
            [containers::MYSQL, containers::XENON]
                .into_iter()
                .map(|name| ContainerStatus {
                    name: name.to_string(),
                    ready,
                    ..Default::default()
                })
                .collect(),
        ),
        ..Default::default()
    }
}

/// A running, ready and healthy pod of a fleet
pub fn fleet_pod(
    namespace: &str,
    name: &str,
    selector: &BTreeMap<String, String>,
    revision: &str,
    role: &str,
) -> Pod {
    let mut pod_labels = selector.clone();
    pod_labels.insert(labels::REVISION_HASH.to_string(), revision.to_string());
    pod_labels.insert(labels::ROLE.to_string(), role.to_string());
    pod_labels.insert(labels::HEALTHY.to_string(), labels::HEALTHY_YES.to_string());

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(pod_labels),
            ..Default::default()
        },
        spec: None,
        status: Some(pod_status("Running", true)),
    }
}

impl MockStore {
    /// Create a new empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut self.operations.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// Store a StatefulSet as the API server would return it
    pub fn insert_statefulset(&self, mut sts: StatefulSet) {
        let mut state = self.write();
        let k = key(
            sts.metadata.namespace.as_deref().unwrap_or_default(),
            sts.metadata.name.as_deref().unwrap_or_default(),
        );
        sts.metadata.resource_version = Some(state.next_version());
        sts.metadata.creation_timestamp.get_or_insert_with(|| Time(Utc::now()));
        state.statefulsets.insert(k, sts);
    }

    pub fn insert_pod(&self, pod: Pod) {
        let k = key(
            pod.metadata.namespace.as_deref().unwrap_or_default(),
            pod.metadata.name.as_deref().unwrap_or_default(),
        );
        self.write().pods.insert(k, pod);
    }

    /// Choose how a pod comes back once deleted
    pub fn set_restart_behavior(&self, namespace: &str, name: &str, behavior: RestartBehavior) {
        self.write().restarts.insert(key(namespace, name), behavior);
    }

    pub fn statefulset(&self, namespace: &str, name: &str) -> Option<StatefulSet> {
        self.read().statefulsets.get(&key(namespace, name)).cloned()
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.read().pods.get(&key(namespace, name)).cloned()
    }

    /// Every call made so far, in order
    pub fn journal(&self) -> Vec<Call> {
        self.read().journal.clone()
    }

    /// Names of the deleted pods, in deletion order
    pub fn deleted_pods(&self) -> Vec<String> {
        self.read()
            .journal
            .iter()
            .filter_map(|call| match call {
                Call::DeletePod(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reset operation counts and the call journal
    pub fn reset_counts(&self) {
        self.count(|ops| *ops = OperationCounts::default());
        self.write().journal.clear();
    }

    /// Recreate a deleted pod the way the StatefulSet controller would
    fn recreate(state: &mut MockState, namespace: &str, old: Pod) {
        let Some((sts_key, sts)) = state.statefulsets.iter().find(|(_, sts)| {
            sts.metadata.namespace.as_deref() == Some(namespace)
                && sts.spec.as_ref().is_some_and(|spec| {
                    spec.selector.match_labels.as_ref().is_some_and(|selector| {
                        matches_selector(old.metadata.labels.as_ref(), selector)
                    })
                })
        }) else {
            return;
        };
        let sts_key = sts_key.clone();
        let revision = sts
            .status
            .as_ref()
            .and_then(|s| s.update_revision.clone())
            .unwrap_or_default();

        let name = old.metadata.name.clone().unwrap_or_default();
        let pod_key = key(namespace, &name);
        let behavior = state.restarts.get(&pod_key).copied().unwrap_or_default();

        let (status, healthy) = match behavior {
            RestartBehavior::Gone => return,
            RestartBehavior::Healthy => (pod_status("Running", true), labels::HEALTHY_YES),
            RestartBehavior::NeverReady => (pod_status("Running", false), labels::HEALTHY_NO),
            RestartBehavior::Failed => (pod_status("Failed", false), labels::HEALTHY_NO),
        };

        let mut pod_labels = old.metadata.labels.clone().unwrap_or_default();
        pod_labels.insert(labels::REVISION_HASH.to_string(), revision);
        pod_labels.insert(labels::HEALTHY.to_string(), healthy.to_string());

        state.pods.insert(
            pod_key,
            Pod {
                metadata: ObjectMeta {
                    name: Some(name),
                    namespace: Some(namespace.to_string()),
                    labels: Some(pod_labels),
                    ..Default::default()
                },
                spec: old.spec,
                status: Some(status),
            },
        );
        Self::refresh_status(state, &sts_key);
    }

    /// Recount ready and updated replicas from the pods
    fn refresh_status(state: &mut MockState, sts_key: &str) {
        let Some(sts) = state.statefulsets.get(sts_key) else {
            return;
        };
        let selector = sts
            .spec
            .as_ref()
            .and_then(|s| s.selector.match_labels.clone())
            .unwrap_or_default();
        let revision = sts.status.as_ref().and_then(|s| s.update_revision.clone());

        let fleet: Vec<&Pod> = state
            .pods
            .values()
            .filter(|pod| matches_selector(pod.metadata.labels.as_ref(), &selector))
            .collect();
        let ready = fleet.iter().filter(|pod| is_ready(pod)).count() as i32;
        let updated = fleet
            .iter()
            .filter(|pod| pod_label(pod, labels::REVISION_HASH) == revision.as_deref())
            .count() as i32;

        if let Some(status) = state
            .statefulsets
            .get_mut(sts_key)
            .and_then(|sts| sts.status.as_mut())
        {
            status.ready_replicas = Some(ready);
            status.updated_replicas = Some(updated);
        }
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<StatefulSet> {
        self.count(|ops| ops.gets += 1);
        let mut state = self.write();
        state.journal.push(Call::GetStatefulSet(name.to_string()));
        state
            .statefulsets
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| KubeError::NotFound {
                kind: "StatefulSet".to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn create_statefulset(&self, sts: &StatefulSet) -> Result<StatefulSet> {
        self.count(|ops| ops.creates += 1);
        let (namespace, name) = object_key(&sts.metadata)?;
        let mut state = self.write();
        state.journal.push(Call::CreateStatefulSet(name.clone()));

        let k = key(&namespace, &name);
        if state.statefulsets.contains_key(&k) {
            return Err(KubeError::WriteConflict {
                kind: "StatefulSet".to_string(),
                namespace,
                name,
            });
        }

        let mut stored = sts.clone();
        stored.metadata.resource_version = Some(state.next_version());
        stored.metadata.uid = Some(format!("uid-{k}"));
        stored.metadata.creation_timestamp = Some(Time(Utc::now()));

        let replicas = stored.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let revision = template_revision(&stored);
        stored.status = Some(StatefulSetStatus {
            replicas,
            ready_replicas: Some(replicas),
            current_replicas: Some(replicas),
            updated_replicas: Some(replicas),
            current_revision: Some(revision.clone()),
            update_revision: Some(revision),
            ..Default::default()
        });

        state.statefulsets.insert(k, stored.clone());
        Ok(stored)
    }

    async fn update_statefulset(&self, sts: &StatefulSet) -> Result<StatefulSet> {
        self.count(|ops| ops.updates += 1);
        let (namespace, name) = object_key(&sts.metadata)?;
        let mut state = self.write();
        state.journal.push(Call::UpdateStatefulSet(name.clone()));

        let k = key(&namespace, &name);
        let Some(current) = state.statefulsets.get(&k) else {
            return Err(KubeError::NotFound {
                kind: "StatefulSet".to_string(),
                namespace,
                name,
            });
        };
        if current.metadata.resource_version != sts.metadata.resource_version {
            return Err(KubeError::WriteConflict {
                kind: "StatefulSet".to_string(),
                namespace,
                name,
            });
        }

        // Status is a subresource, writes to the main resource leave it alone
        let mut stored = sts.clone();
        stored.status = current.status.clone();
        stored.metadata.resource_version = Some(state.next_version());

        let revision = template_revision(&stored);
        let status = stored.status.get_or_insert_with(Default::default);
        let moved = status.update_revision.as_deref() != Some(revision.as_str());
        if moved {
            status.update_revision = Some(revision);
        }

        state.statefulsets.insert(k.clone(), stored);
        if moved {
            Self::refresh_status(&mut state, &k);
        }
        state
            .statefulsets
            .get(&k)
            .cloned()
            .ok_or_else(|| KubeError::InvalidFleet(format!("StatefulSet {k} vanished")))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.count(|ops| ops.gets += 1);
        let mut state = self.write();
        state.journal.push(Call::GetPod(name.to_string()));
        state
            .pods
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| KubeError::NotFound {
                kind: "Pod".to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        self.count(|ops| ops.lists += 1);
        let mut state = self.write();
        state.journal.push(Call::ListPods(namespace.to_string()));
        Ok(state
            .pods
            .values()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .filter(|pod| matches_selector(pod.metadata.labels.as_ref(), selector))
            .cloned()
            .collect())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.count(|ops| ops.deletes += 1);
        let mut state = self.write();
        state.journal.push(Call::DeletePod(name.to_string()));

        let Some(old) = state.pods.remove(&key(namespace, name)) else {
            return Err(KubeError::NotFound {
                kind: "Pod".to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };
        Self::recreate(&mut state, namespace, old);
        Ok(())
    }
}

//! Rolling replacement of a fleet's pods
//!
//! The fleet uses the `OnDelete` update strategy, so a new template only
//! reaches a pod once that pod is deleted. [`RollingUpdate`] deletes pods one
//! at a time, followers first and the leader last, and waits for each
//! replacement to be running, ready and healthy at the update revision before
//! touching the next one. Nothing is deleted unless every pod is healthy.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use tracing::{Instrument, Span, debug, info, info_span};

use quorumdb_core::constants::{containers, labels};

use crate::config::RolloutConfig;
use crate::error::{KubeError, Result};
use crate::poller::Poller;
use crate::store::ObjectStore;

/// Value of a pod label
pub fn pod_label<'a>(pod: &'a Pod, label: &str) -> Option<&'a str> {
    pod.metadata.labels.as_ref()?.get(label).map(String::as_str)
}

fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref()?.phase.as_deref()
}

fn container_ready(pod: &Pod, container: &str) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.iter().find(|c| c.name == container))
        .is_some_and(|c| c.ready)
}

/// Whether a replaced pod is back in service at `revision`
pub fn pod_updated(pod: &Pod, revision: &str) -> bool {
    pod_phase(pod) == Some("Running")
        && container_ready(pod, containers::MYSQL)
        && container_ready(pod, containers::XENON)
        && pod_label(pod, labels::REVISION_HASH) == Some(revision)
        && pod_label(pod, labels::HEALTHY) == Some(labels::HEALTHY_YES)
}

/// Sequential, leader-last pod replacement for one fleet
pub struct RollingUpdate {
    store: Arc<dyn ObjectStore>,
    fleet: StatefulSet,
    config: RolloutConfig,
    span: Span,
}

impl RollingUpdate {
    pub fn new(store: Arc<dyn ObjectStore>, fleet: StatefulSet, config: RolloutConfig) -> Self {
        let span = info_span!(
            "rollout",
            namespace = fleet.metadata.namespace.as_deref().unwrap_or_default(),
            statefulset = fleet.metadata.name.as_deref().unwrap_or_default(),
        );
        Self {
            store,
            fleet,
            config,
            span,
        }
    }

    /// Replace every pod not yet at the fleet's update revision
    ///
    /// The first failure stops the rollout. Pods already replaced stay
    /// replaced.
    pub async fn run(&self) -> Result<()> {
        self.rollout().instrument(self.span.clone()).await
    }

    async fn rollout(&self) -> Result<()> {
        let namespace = self.fleet.metadata.namespace.as_deref().unwrap_or_default();
        let spec = self
            .fleet
            .spec
            .as_ref()
            .ok_or_else(|| KubeError::InvalidFleet("StatefulSet has no spec".to_string()))?;
        let replicas = spec.replicas.unwrap_or(1);
        let status = self.fleet.status.clone().unwrap_or_default();

        let updated = status.updated_replicas.unwrap_or(0);
        if updated >= replicas {
            debug!(updated, replicas, "all replicas at update revision");
            return Ok(());
        }

        let ready = status.ready_replicas.unwrap_or(0);
        if ready < replicas {
            info!(ready, replicas, "fleet not ready, postponing rolling update");
            return Ok(());
        }

        let target = status.update_revision.ok_or_else(|| {
            KubeError::InvalidFleet("StatefulSet status has no update revision".to_string())
        })?;
        let selector = spec.selector.match_labels.clone().unwrap_or_default();
        let pods = self.store.list_pods(namespace, &selector).await?;

        let unhealthy: Vec<String> = pods
            .iter()
            .filter(|pod| pod_label(pod, labels::HEALTHY) != Some(labels::HEALTHY_YES))
            .map(|pod| pod_name(pod).to_string())
            .collect();
        if !unhealthy.is_empty() {
            return Err(KubeError::UnhealthyPrecondition { pods: unhealthy });
        }

        let (leaders, followers): (Vec<&Pod>, Vec<&Pod>) = pods
            .iter()
            .partition(|pod| pod_label(pod, labels::ROLE) == Some(labels::ROLE_LEADER));
        if leaders.len() > 1 {
            return Err(KubeError::MultipleLeaders {
                pods: leaders.iter().map(|pod| pod_name(pod).to_string()).collect(),
            });
        }

        info!(revision = %target, pods = pods.len(), "starting rolling update");
        for pod in followers.into_iter().chain(leaders) {
            self.apply_and_wait(namespace, pod, &target).await?;
        }
        info!(revision = %target, "rolling update complete");
        Ok(())
    }

    /// Delete a pod unless already updated, then wait for its replacement
    async fn apply_and_wait(&self, namespace: &str, pod: &Pod, target: &str) -> Result<()> {
        let name = pod_name(pod);

        if pod_label(pod, labels::REVISION_HASH) == Some(target) {
            debug!(pod = %name, "pod already at update revision");
        } else {
            info!(pod = %name, "deleting pod");
            self.store.delete_pod(namespace, name).await?;
        }

        let poller = Poller::new(self.config.poll_interval, self.config.pod_wait_timeout);
        poller
            .poll(&format!("pod {namespace}/{name}"), || {
                self.probe(namespace, name, target)
            })
            .await?;

        info!(pod = %name, "pod updated and ready");
        Ok(())
    }

    async fn probe(&self, namespace: &str, name: &str, target: &str) -> Result<bool> {
        let pod = match self.store.get_pod(namespace, name).await {
            Ok(pod) => pod,
            // Being recreated
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };

        if pod_phase(&pod) == Some("Failed") {
            return Err(KubeError::PodFailed {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        Ok(pod_updated(&pod, target))
    }
}

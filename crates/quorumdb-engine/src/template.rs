//! Desired pod template and StatefulSet mutation
//!
//! [`build_pod_template`] is a pure function of the cluster view and the two
//! revision fingerprints. [`mutate_statefulset`] writes the desired state into
//! a fresh or fetched StatefulSet; on a fetched object the server-populated
//! defaults of the live template are kept so that an unchanged cluster
//! compares equal to what the API server returned.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use quorumdb_core::constants::{annotations, labels, ports};
use quorumdb_core::{ClusterView, ResourceKind};

use crate::container::{build_container, init_roles, main_roles};
use crate::error::{EngineError, Result};
use crate::merge::{Fill, merge_defaults};

/// Template every pod of the fleet is created from
pub type DesiredPodTemplate = PodTemplateSpec;

/// Fingerprints of the rendered config map and the credentials secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revisions<'a> {
    pub config: &'a str,
    pub secret: &'a str,
}

impl<'a> Revisions<'a> {
    pub fn new(config: &'a str, secret: &'a str) -> Self {
        Self { config, secret }
    }
}

/// Build the pod template for a cluster
pub fn build_pod_template(view: &ClusterView, revs: Revisions<'_>) -> Result<DesiredPodTemplate> {
    Ok(PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(pod_labels(view)),
            annotations: Some(pod_annotations(view, revs)),
            ..Default::default()
        }),
        spec: Some(build_pod_spec(view)?),
    })
}

fn pod_labels(view: &ClusterView) -> BTreeMap<String, String> {
    let mut set = view.labels();
    set.extend(view.spec().pod_spec.labels.clone());
    set.insert(labels::ROLE.to_string(), labels::ROLE_CANDIDATE.to_string());
    set.insert(labels::HEALTHY.to_string(), labels::HEALTHY_NO.to_string());
    set
}

fn pod_annotations(view: &ClusterView, revs: Revisions<'_>) -> BTreeMap<String, String> {
    let mut set = view.spec().pod_spec.annotations.clone();
    set.insert(annotations::CONFIG_REV.to_string(), revs.config.to_string());
    set.insert(annotations::SECRET_REV.to_string(), revs.secret.to_string());
    if view.spec().metrics_opts.enabled {
        set.insert(annotations::PROMETHEUS_SCRAPE.to_string(), "true".to_string());
        set.insert(annotations::PROMETHEUS_PORT.to_string(), ports::METRICS.to_string());
    }
    set
}

/// Generated pod spec with the user's scheduling overlay merged in
pub fn build_pod_spec(view: &ClusterView) -> Result<PodSpec> {
    let generated = PodSpec {
        init_containers: Some(
            init_roles()
                .into_iter()
                .map(|role| build_container(role, view))
                .collect(),
        ),
        containers: main_roles(view)
            .into_iter()
            .map(|role| build_container(role, view))
            .collect(),
        volumes: Some(view.ensure_volumes()),
        service_account_name: Some(view.name_for(ResourceKind::ServiceAccount)),
        ..Default::default()
    };

    merge_defaults("pod spec", &generated, &overlay(view), Fill::Empty)
}

/// Scheduling fields taken from the user's pod settings
fn overlay(view: &ClusterView) -> PodSpec {
    let pod = &view.spec().pod_spec;
    PodSpec {
        affinity: pod.affinity.clone(),
        tolerations: some_if(!pod.tolerations.is_empty(), || pod.tolerations.clone()),
        scheduler_name: some_if(!pod.scheduler_name.is_empty(), || pod.scheduler_name.clone()),
        priority_class_name: some_if(!pod.priority_class_name.is_empty(), || {
            pod.priority_class_name.clone()
        }),
        service_account_name: some_if(!pod.service_account_name.is_empty(), || {
            pod.service_account_name.clone()
        }),
        ..Default::default()
    }
}

fn some_if<T>(cond: bool, value: impl FnOnce() -> T) -> Option<T> {
    if cond { Some(value()) } else { None }
}

/// Write the desired fleet state into `sts`
///
/// `sts` is either a fresh object carrying only name and namespace, or the
/// StatefulSet fetched from the API server.
pub fn mutate_statefulset(sts: &mut StatefulSet, view: &ClusterView, revs: Revisions<'_>) -> Result<()> {
    let mut template = build_pod_template(view, revs)?;
    let persistence = &view.spec().persistence;
    let claims = if persistence.enabled {
        Some(view.ensure_volume_claim_templates()?)
    } else {
        None
    };

    let spec = sts.spec.get_or_insert_with(Default::default);

    if let (Some(desired), Some(live)) = (template.spec.as_mut(), spec.template.spec.as_ref()) {
        let pod = &view.spec().pod_spec;
        let mut merged = merge_defaults("pod spec", &*desired, live, Fill::Absent)?;
        merged.affinity = pod.affinity.clone();
        merged.tolerations = some_if(!pod.tolerations.is_empty(), || pod.tolerations.clone());
        *desired = merged;
    }
    spec.template = template;

    spec.service_name = view.name_for(ResourceKind::HeadlessService).into();
    spec.replicas = Some(view.spec().replicas);
    spec.selector = LabelSelector {
        match_labels: Some(view.selector_labels()),
        ..Default::default()
    };
    spec.update_strategy = Some(StatefulSetUpdateStrategy {
        type_: Some("OnDelete".to_string()),
        rolling_update: None,
    });

    if let Some(claims) = claims {
        spec.volume_claim_templates = Some(match spec.volume_claim_templates.as_ref() {
            Some(live) => merge_defaults("volume claim templates", &claims, live, Fill::Absent)?,
            None => claims,
        });
    }

    sts.metadata.labels = Some(view.labels());
    set_owner(sts, view)
}

/// Attach the cluster as controller of the StatefulSet
fn set_owner(sts: &mut StatefulSet, view: &ClusterView) -> Result<()> {
    let name = sts.metadata.name.clone().unwrap_or_default();

    if view.is_being_deleted() {
        if sts.metadata.creation_timestamp.is_none() {
            return Err(EngineError::OwnerDeleted {
                owner: format!("{}/{}", view.namespace(), view.name()),
                kind: "StatefulSet".to_string(),
                name,
            });
        }
        return Ok(());
    }

    let owner = view.owner_reference()?;
    let refs = sts.metadata.owner_references.get_or_insert_with(Vec::new);

    if let Some(other) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(EngineError::AlreadyOwned {
            kind: "StatefulSet".to_string(),
            name,
            controller: format!("{} {}", other.kind, other.name),
        });
    }

    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) => *existing = owner,
        None => refs.push(owner),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Toleration;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
    use quorumdb_core::constants::containers;
    use quorumdb_core::{MysqlCluster, MysqlClusterSpec};

    const REVS: Revisions<'static> = Revisions {
        config: "cfg-1",
        secret: "sec-1",
    };

    fn view_with(spec: MysqlClusterSpec) -> ClusterView {
        let mut cluster = MysqlCluster::new("sample", spec);
        cluster.metadata.namespace = Some("db".to_string());
        cluster.metadata.uid = Some("uid-1".to_string());
        ClusterView::new(cluster)
    }

    fn fresh() -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some("sample-mysql".to_string()),
                namespace: Some("db".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn container_names(spec: &PodSpec) -> Vec<&str> {
        spec.containers.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_template_is_pure() {
        let view = view_with(MysqlClusterSpec::default());
        let a = build_pod_template(&view, REVS).unwrap();
        let b = build_pod_template(&view, REVS).unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
    }

    #[test]
    fn test_container_order() {
        let mut spec = MysqlClusterSpec::default();
        spec.metrics_opts.enabled = true;
        spec.pod_spec.slow_log_tail = true;
        spec.pod_spec.audit_log_tail = true;
        let template = build_pod_template(&view_with(spec), REVS).unwrap();
        let pod = template.spec.unwrap();

        let init: Vec<_> = pod.init_containers.as_ref().unwrap().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(init, vec![containers::INIT_SIDECAR, containers::INIT_MYSQL]);
        assert_eq!(container_names(&pod), vec![
            containers::MYSQL,
            containers::XENON,
            containers::METRICS,
            containers::SLOW_LOG,
            containers::AUDIT_LOG,
        ]);
    }

    #[test]
    fn test_labels_and_annotations() {
        let mut spec = MysqlClusterSpec::default();
        spec.pod_spec.labels.insert("team".to_string(), "storage".to_string());
        spec.pod_spec.labels.insert(labels::APP_COMPONENT.to_string(), "custom".to_string());
        spec.pod_spec.labels.insert(labels::ROLE.to_string(), labels::ROLE_LEADER.to_string());
        spec.pod_spec.annotations.insert("note".to_string(), "x".to_string());
        let view = view_with(spec);

        let meta = build_pod_template(&view, REVS).unwrap().metadata.unwrap();
        let pod_labels = meta.labels.unwrap();
        assert_eq!(pod_labels["team"], "storage");
        assert_eq!(pod_labels[labels::APP_COMPONENT], "custom");
        assert_eq!(pod_labels[labels::ROLE], labels::ROLE_CANDIDATE);
        assert_eq!(pod_labels[labels::HEALTHY], labels::HEALTHY_NO);

        let pod_annotations = meta.annotations.unwrap();
        assert_eq!(pod_annotations["note"], "x");
        assert_eq!(pod_annotations[annotations::CONFIG_REV], "cfg-1");
        assert_eq!(pod_annotations[annotations::SECRET_REV], "sec-1");
        assert!(!pod_annotations.contains_key(annotations::PROMETHEUS_SCRAPE));

        // The user's map is copied, not changed
        assert_eq!(view.spec().pod_spec.annotations.len(), 1);
    }

    #[test]
    fn test_metrics_annotations() {
        let mut spec = MysqlClusterSpec::default();
        spec.metrics_opts.enabled = true;
        let meta = build_pod_template(&view_with(spec), REVS).unwrap().metadata.unwrap();
        let pod_annotations = meta.annotations.unwrap();
        assert_eq!(pod_annotations[annotations::PROMETHEUS_SCRAPE], "true");
        assert_eq!(pod_annotations[annotations::PROMETHEUS_PORT], "9104");
    }

    #[test]
    fn test_overlay_fills_only_empty_fields() {
        let mut spec = MysqlClusterSpec::default();
        spec.pod_spec.scheduler_name = "stork".to_string();
        spec.pod_spec.service_account_name = "custom-sa".to_string();
        spec.pod_spec.tolerations = vec![Toleration {
            key: Some("dedicated".to_string()),
            operator: Some("Exists".to_string()),
            ..Default::default()
        }];
        let pod = build_pod_spec(&view_with(spec)).unwrap();

        assert_eq!(pod.scheduler_name.as_deref(), Some("stork"));
        assert_eq!(pod.service_account_name.as_deref(), Some("sample-mysql"));
        assert_eq!(pod.tolerations.as_ref().unwrap().len(), 1);
        assert_eq!(container_names(&pod), vec![containers::MYSQL, containers::XENON]);
        assert!(pod.priority_class_name.is_none());
    }

    #[test]
    fn test_mutate_fresh_statefulset() {
        let view = view_with(MysqlClusterSpec::default());
        let mut sts = fresh();
        mutate_statefulset(&mut sts, &view, REVS).unwrap();

        let spec = sts.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.update_strategy.as_ref().unwrap().type_.as_deref(), Some("OnDelete"));
        assert_eq!(spec.selector.match_labels, Some(view.selector_labels()));
        assert_eq!(spec.volume_claim_templates.as_ref().unwrap().len(), 1);
        assert_eq!(spec.template, build_pod_template(&view, REVS).unwrap());

        let owners = sts.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].uid, "uid-1");
    }

    #[test]
    fn test_mutate_without_persistence() {
        let mut spec = MysqlClusterSpec::default();
        spec.persistence.enabled = false;
        let mut sts = fresh();
        mutate_statefulset(&mut sts, &view_with(spec), REVS).unwrap();
        assert!(sts.spec.unwrap().volume_claim_templates.is_none());
    }

    #[test]
    fn test_mutate_is_idempotent_with_server_defaults() {
        let view = view_with(MysqlClusterSpec::default());
        let mut live = fresh();
        mutate_statefulset(&mut live, &view, REVS).unwrap();

        // Fields the API server fills in
        let pod = live.spec.as_mut().unwrap().template.spec.as_mut().unwrap();
        pod.dns_policy = Some("ClusterFirst".to_string());
        pod.restart_policy = Some("Always".to_string());
        pod.containers[0].termination_message_path = Some("/dev/termination-log".to_string());
        live.metadata.creation_timestamp = Some(Time(chrono::Utc::now()));
        live.metadata.resource_version = Some("42".to_string());

        let snapshot = live.clone();
        mutate_statefulset(&mut live, &view, REVS).unwrap();
        assert_eq!(live, snapshot);
    }

    #[test]
    fn test_mutate_detects_changes() {
        let view = view_with(MysqlClusterSpec::default());
        let mut live = fresh();
        mutate_statefulset(&mut live, &view, REVS).unwrap();
        let snapshot = live.clone();

        mutate_statefulset(&mut live, &view, Revisions::new("cfg-2", "sec-1")).unwrap();
        assert_ne!(live, snapshot);
    }

    #[test]
    fn test_removed_tolerations_propagate() {
        let mut spec = MysqlClusterSpec::default();
        spec.pod_spec.tolerations = vec![Toleration {
            key: Some("dedicated".to_string()),
            ..Default::default()
        }];
        let mut live = fresh();
        mutate_statefulset(&mut live, &view_with(spec), REVS).unwrap();

        mutate_statefulset(&mut live, &view_with(MysqlClusterSpec::default()), REVS).unwrap();
        let pod = live.spec.unwrap().template.spec.unwrap();
        assert!(pod.tolerations.is_none());
    }

    #[test]
    fn test_owner_deleted_refuses_create() {
        let mut cluster = MysqlCluster::new("sample", MysqlClusterSpec::default());
        cluster.metadata.uid = Some("uid-1".to_string());
        cluster.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        let view = ClusterView::new(cluster);

        let mut sts = fresh();
        let err = mutate_statefulset(&mut sts, &view, REVS).unwrap_err();
        assert!(matches!(err, EngineError::OwnerDeleted { .. }));

        let mut existing = fresh();
        existing.metadata.creation_timestamp = Some(Time(chrono::Utc::now()));
        assert!(mutate_statefulset(&mut existing, &view, REVS).is_ok());
    }

    #[test]
    fn test_already_owned() {
        let view = view_with(MysqlClusterSpec::default());
        let mut sts = fresh();
        sts.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            name: "other".to_string(),
            uid: "uid-other".to_string(),
            controller: Some(true),
            ..Default::default()
        }]);

        let err = mutate_statefulset(&mut sts, &view, REVS).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyOwned { .. }));
    }
}

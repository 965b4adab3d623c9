//! Read-only projection of a MysqlCluster
//!
//! Everything the builder needs to know about a cluster goes through
//! [`ClusterView`]: resource names, label sets, the resolved MySQL version and
//! the volumes backing the pod. The view wraps the cluster in an `Arc`, so
//! cloning it is cheap and no component can mutate the caller's object.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, EmptyDirVolumeSource, HostPathVolumeSource, ObjectReference,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, Volume, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

use crate::cluster::{MysqlCluster, MysqlClusterSpec};
use crate::constants::{self, labels, volumes};
use crate::error::{CoreError, Result};

/// Kinds of objects owned by a cluster, used for naming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    StatefulSet,
    HeadlessService,
    ConfigMap,
    Secret,
    ServiceAccount,
}

impl ResourceKind {
    fn suffix(self) -> &'static str {
        match self {
            ResourceKind::StatefulSet
            | ResourceKind::HeadlessService
            | ResourceKind::ConfigMap
            | ResourceKind::ServiceAccount => "mysql",
            ResourceKind::Secret => "secret",
        }
    }
}

/// Read-only view over a cluster
#[derive(Debug, Clone)]
pub struct ClusterView {
    cluster: Arc<MysqlCluster>,
}

impl ClusterView {
    pub fn new(cluster: MysqlCluster) -> Self {
        Self {
            cluster: Arc::new(cluster),
        }
    }

    pub fn spec(&self) -> &MysqlClusterSpec {
        &self.cluster.spec
    }

    pub fn name(&self) -> &str {
        self.cluster.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.cluster.metadata.namespace.as_deref().unwrap_or_default()
    }

    /// Name of the object of the given kind that belongs to this cluster
    pub fn name_for(&self, kind: ResourceKind) -> String {
        format!("{}-{}", self.name(), kind.suffix())
    }

    /// Labels used to select the fleet's pods
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (labels::APP_NAME.to_string(), labels::APP_NAME_VALUE.to_string()),
            (labels::APP_INSTANCE.to_string(), self.name().to_string()),
            (labels::APP_MANAGED_BY.to_string(), labels::MANAGED_BY_VALUE.to_string()),
        ])
    }

    /// Full label set stamped on every generated object
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut set = self.selector_labels();
        set.insert(labels::APP_COMPONENT.to_string(), labels::COMPONENT_VALUE.to_string());
        set.insert(labels::APP_PART_OF.to_string(), labels::PART_OF_VALUE.to_string());
        set.insert(labels::APP_VERSION.to_string(), self.mysql_version().to_string());
        set
    }

    /// Supported full MySQL version for this cluster
    pub fn mysql_version(&self) -> &'static str {
        constants::resolve_mysql_version(&self.cluster.spec.mysql_version)
    }

    /// Image running the cluster's MySQL version
    pub fn mysql_image(&self) -> &'static str {
        constants::mysql_image(self.mysql_version()).unwrap_or(constants::MYSQL_IMAGES[0].1)
    }

    /// Volumes every pod of the fleet mounts
    ///
    /// The data volume is an `emptyDir` only when persistence is disabled;
    /// otherwise it comes from the claim template of the same name.
    pub fn ensure_volumes(&self) -> Vec<Volume> {
        let spec = &self.cluster.spec;
        let mut vols = vec![
            empty_dir(volumes::CONF),
            Volume {
                name: volumes::CONFIG_MAP.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: self.name_for(ResourceKind::ConfigMap),
                    ..Default::default()
                }),
                ..Default::default()
            },
            empty_dir(volumes::SCRIPTS),
            empty_dir(volumes::XENON),
            empty_dir(volumes::INIT_FILE),
            empty_dir(volumes::LOGS),
        ];

        if !spec.persistence.enabled {
            vols.push(empty_dir(volumes::DATA));
        }

        if spec.mysql_opts.init_tokudb {
            vols.push(Volume {
                name: volumes::SYS.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: volumes::SYS_HOST_PATH.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        vols
    }

    /// Claim template for the data volume
    pub fn ensure_volume_claim_templates(&self) -> Result<Vec<PersistentVolumeClaim>> {
        let persistence = &self.cluster.spec.persistence;
        if !is_quantity(&persistence.size) {
            return Err(CoreError::InvalidSpec {
                field: "persistence.size".to_string(),
                message: format!("'{}' is not a storage quantity", persistence.size),
            });
        }

        Ok(vec![PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(volumes::DATA.to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(persistence.access_modes.clone()),
                storage_class_name: persistence.storage_class.clone(),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(persistence.size.clone()),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }])
    }

    /// Whether the cluster has a deletion timestamp
    pub fn is_being_deleted(&self) -> bool {
        self.cluster.metadata.deletion_timestamp.is_some()
    }

    /// Controller owner reference pointing at the cluster
    pub fn owner_reference(&self) -> Result<OwnerReference> {
        self.cluster
            .controller_owner_ref(&())
            .ok_or_else(|| CoreError::MissingField {
                field: "metadata.uid".to_string(),
            })
    }

    /// Reference used to attach events to the cluster
    pub fn object_ref(&self) -> ObjectReference {
        self.cluster.object_ref(&())
    }
}

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// Whether `value` parses as a Kubernetes resource quantity (`10Gi`, `.5Gi`, `1e3`)
fn is_quantity(value: &str) -> bool {
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let split = unsigned
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(split);

    let valid_number = number.chars().any(|c| c.is_ascii_digit())
        && number.chars().filter(|&c| c == '.').count() <= 1;
    let valid_suffix = match suffix {
        "" | "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" | "n" | "u" | "m" | "k" | "M" | "G"
        | "T" | "P" | "E" => true,
        exp => exp
            .strip_prefix(['e', 'E'])
            .map(|e| e.strip_prefix(['+', '-']).unwrap_or(e))
            .is_some_and(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_digit())),
    };
    valid_number && valid_suffix
}

//! MysqlCluster custom resource
//!
//! The cluster spec is the user-facing description of a MySQL fleet. Every
//! field is optional: missing fields fall back to the defaults below, so a
//! manifest with an empty `spec: {}` yields a three-node fleet.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Affinity, ResourceRequirements, Toleration};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Specification for a MysqlCluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "mysql.quorumdb.io",
    version = "v1alpha1",
    kind = "MysqlCluster",
    plural = "mysqlclusters",
    shortname = "mysql",
    namespaced,
    schema = "disabled"
)]
#[serde(default, rename_all = "camelCase")]
pub struct MysqlClusterSpec {
    /// Number of pods in the fleet (0, 2, 3 or 5)
    pub replicas: i32,

    /// MySQL version, either short ("5.7") or a full patch version
    pub mysql_version: String,

    /// Options of the mysql container
    pub mysql_opts: MysqlOpts,

    /// Options of the xenon (consensus sidecar) container
    pub xenon_opts: XenonOpts,

    /// Options of the metrics exporter container
    pub metrics_opts: MetricsOpts,

    /// Pod-level overlay applied to the generated pod template
    pub pod_spec: PodOverlay,

    /// Data volume settings
    pub persistence: Persistence,
}

impl Default for MysqlClusterSpec {
    fn default() -> Self {
        Self {
            replicas: 3,
            mysql_version: "5.7".to_string(),
            mysql_opts: MysqlOpts::default(),
            xenon_opts: XenonOpts::default(),
            metrics_opts: MetricsOpts::default(),
            pod_spec: PodOverlay::default(),
            persistence: Persistence::default(),
        }
    }
}

/// Options of the mysql container
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MysqlOpts {
    /// Password for the root user
    pub root_password: String,

    /// Host the root user may connect from ("127.0.0.1" or "%")
    pub root_host: String,

    /// Name of the application user to create
    pub user: String,

    /// Password of the application user
    pub password: String,

    /// Name of the database to create
    pub database: String,

    /// Install the TokuDB engine
    #[serde(rename = "initTokuDB")]
    pub init_tokudb: bool,

    /// Extra entries passed through to my.cnf
    pub mysql_conf: BTreeMap<String, String>,

    /// Compute resources of the mysql container
    pub resources: ResourceRequirements,
}

impl Default for MysqlOpts {
    fn default() -> Self {
        Self {
            root_password: String::new(),
            root_host: "127.0.0.1".to_string(),
            user: "qdb_usr".to_string(),
            password: String::new(),
            database: "quorumdb".to_string(),
            init_tokudb: true,
            mysql_conf: BTreeMap::new(),
            resources: resources(("100m", "256Mi"), ("500m", "1Gi")),
        }
    }
}

/// Options of the xenon container
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct XenonOpts {
    /// Image of the xenon container
    pub image: String,

    /// Heartbeats missed before a follower admits defeat
    pub admit_defeat_hearbeat_count: i32,

    /// Election timeout in milliseconds
    pub election_timeout: i32,

    /// Compute resources of the xenon container
    pub resources: ResourceRequirements,
}

impl Default for XenonOpts {
    fn default() -> Self {
        Self {
            image: "quorumdb/xenon:1.1.5".to_string(),
            admit_defeat_hearbeat_count: 5,
            election_timeout: 10000,
            resources: resources(("50m", "128Mi"), ("100m", "256Mi")),
        }
    }
}

/// Options of the metrics container
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsOpts {
    /// Image of the metrics exporter
    pub image: String,

    /// Compute resources of the metrics container
    pub resources: ResourceRequirements,

    /// Run the metrics exporter
    pub enabled: bool,
}

impl Default for MetricsOpts {
    fn default() -> Self {
        Self {
            image: "prom/mysqld-exporter:v0.12.1".to_string(),
            resources: resources(("10m", "32Mi"), ("100m", "128Mi")),
            enabled: false,
        }
    }
}

/// User-supplied pod settings
///
/// Scheduling fields (affinity, tolerations, scheduler, priority class,
/// service account) are merged onto the generated pod spec. The remaining
/// fields feed the sidecar containers and the template metadata.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PodOverlay {
    /// Pull policy for every generated container
    pub image_pull_policy: String,

    /// Extra pod labels (win over the generated base labels)
    pub labels: BTreeMap<String, String>,

    /// Extra pod annotations
    pub annotations: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    pub priority_class_name: String,

    pub tolerations: Vec<Toleration>,

    pub scheduler_name: String,

    pub service_account_name: String,

    /// Compute resources of the helper containers
    pub resources: ResourceRequirements,

    /// Image of the init sidecar
    pub sidecar_image: String,

    /// Image used by the log tailing containers
    pub busybox_image: String,

    /// Tail the mysql slow log into the pod output
    pub slow_log_tail: bool,

    /// Tail the mysql audit log into the pod output
    pub audit_log_tail: bool,
}

impl Default for PodOverlay {
    fn default() -> Self {
        Self {
            image_pull_policy: "IfNotPresent".to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            affinity: None,
            priority_class_name: String::new(),
            tolerations: Vec::new(),
            scheduler_name: String::new(),
            service_account_name: String::new(),
            resources: ResourceRequirements {
                requests: Some(quantities("10m", "32Mi")),
                ..Default::default()
            },
            sidecar_image: "quorumdb/sidecar:0.1".to_string(),
            busybox_image: "busybox:1.32".to_string(),
            slow_log_tail: false,
            audit_log_tail: false,
        }
    }
}

/// Data volume settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Persistence {
    /// Back the data directory with a persistent volume claim
    pub enabled: bool,

    pub access_modes: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Requested claim size (e.g. "10Gi")
    pub size: String,
}

impl Default for Persistence {
    fn default() -> Self {
        Self {
            enabled: true,
            access_modes: vec!["ReadWriteOnce".to_string()],
            storage_class: None,
            size: "10Gi".to_string(),
        }
    }
}

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ])
}

fn resources(requests: (&str, &str), limits: (&str, &str)) -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(quantities(requests.0, requests.1)),
        limits: Some(quantities(limits.0, limits.1)),
        ..Default::default()
    }
}

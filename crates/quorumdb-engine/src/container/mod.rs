//! Container role registry
//!
//! Every container of a fleet pod is described by a [`ContainerRole`]. Each
//! role module returns a [`ContainerParts`] record and [`build_container`]
//! assembles it into a Kubernetes `Container`, stamping the pull policy from
//! the pod overlay.

mod init;
mod logs;
mod metrics;
mod mysql;
mod xenon;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, ExecAction, HTTPGetAction, Lifecycle,
    ObjectFieldSelector, Probe, ResourceRequirements, SecretKeySelector, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use quorumdb_core::constants::containers;
use quorumdb_core::{ClusterView, ResourceKind};

/// Containers a fleet pod may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerRole {
    InitSidecar,
    InitMysql,
    Mysql,
    Xenon,
    Metrics,
    SlowLog,
    AuditLog,
}

impl ContainerRole {
    pub fn container_name(self) -> &'static str {
        match self {
            ContainerRole::InitSidecar => containers::INIT_SIDECAR,
            ContainerRole::InitMysql => containers::INIT_MYSQL,
            ContainerRole::Mysql => containers::MYSQL,
            ContainerRole::Xenon => containers::XENON,
            ContainerRole::Metrics => containers::METRICS,
            ContainerRole::SlowLog => containers::SLOW_LOG,
            ContainerRole::AuditLog => containers::AUDIT_LOG,
        }
    }
}

/// Init containers, in start order
pub fn init_roles() -> Vec<ContainerRole> {
    vec![ContainerRole::InitSidecar, ContainerRole::InitMysql]
}

/// Main containers for a cluster, in pod order
pub fn main_roles(view: &ClusterView) -> Vec<ContainerRole> {
    let spec = view.spec();
    let mut roles = vec![ContainerRole::Mysql, ContainerRole::Xenon];
    if spec.metrics_opts.enabled {
        roles.push(ContainerRole::Metrics);
    }
    if spec.pod_spec.slow_log_tail {
        roles.push(ContainerRole::SlowLog);
    }
    if spec.pod_spec.audit_log_tail {
        roles.push(ContainerRole::AuditLog);
    }
    roles
}

/// Role-specific part of a container
#[derive(Debug, Clone, Default)]
pub struct ContainerParts {
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<EnvVar>,
    pub lifecycle: Option<Lifecycle>,
    pub resources: Option<ResourceRequirements>,
    pub ports: Vec<ContainerPort>,
    pub liveness_probe: Option<Probe>,
    pub readiness_probe: Option<Probe>,
    pub volume_mounts: Vec<VolumeMount>,
}

fn parts_for(role: ContainerRole, view: &ClusterView) -> ContainerParts {
    match role {
        ContainerRole::InitSidecar => init::sidecar(view),
        ContainerRole::InitMysql => init::mysql(view),
        ContainerRole::Mysql => mysql::parts(view),
        ContainerRole::Xenon => xenon::parts(view),
        ContainerRole::Metrics => metrics::parts(view),
        ContainerRole::SlowLog => logs::slow_log(view),
        ContainerRole::AuditLog => logs::audit_log(view),
    }
}

/// Build the container for a role
pub fn build_container(role: ContainerRole, view: &ClusterView) -> Container {
    let parts = parts_for(role, view);
    Container {
        name: role.container_name().to_string(),
        image: Some(parts.image),
        image_pull_policy: Some(view.spec().pod_spec.image_pull_policy.clone()),
        command: non_empty(parts.command),
        env: non_empty(parts.env),
        lifecycle: parts.lifecycle,
        resources: parts.resources,
        ports: non_empty(parts.ports),
        liveness_probe: parts.liveness_probe,
        readiness_probe: parts.readiness_probe,
        volume_mounts: non_empty(parts.volume_mounts),
        ..Default::default()
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}

// Shared helpers for the role modules

fn command(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        value_from: None,
    }
}

fn env_from_field(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: Some("v1".to_string()),
                field_path: field_path.to_string(),
            }),
            ..Default::default()
        }),
    }
}

/// Env var read from the cluster's credentials secret
fn env_from_secret(view: &ClusterView, name: &str, key: &str, optional: bool) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: view.name_for(ResourceKind::Secret),
                key: key.to_string(),
                optional: Some(optional),
            }),
            ..Default::default()
        }),
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn port(name: &str, number: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: number,
        ..Default::default()
    }
}

/// Probe timings: initial delay, timeout, period, success and failure thresholds
type Timings = (i32, i32, i32, i32, i32);

fn timed(probe: Probe, (initial, timeout, period, success, failure): Timings) -> Probe {
    Probe {
        initial_delay_seconds: Some(initial),
        timeout_seconds: Some(timeout),
        period_seconds: Some(period),
        success_threshold: Some(success),
        failure_threshold: Some(failure),
        ..probe
    }
}

fn exec_probe(args: &[&str], timings: Timings) -> Probe {
    timed(
        Probe {
            exec: Some(ExecAction {
                command: Some(command(args)),
            }),
            ..Default::default()
        },
        timings,
    )
}

fn http_probe(path: &str, port: i32, timings: Timings) -> Probe {
    timed(
        Probe {
            http_get: Some(HTTPGetAction {
                path: Some(path.to_string()),
                port: IntOrString::Int(port),
                ..Default::default()
            }),
            ..Default::default()
        },
        timings,
    )
}

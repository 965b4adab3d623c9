//! The xenon consensus sidecar

use k8s_openapi::api::core::v1::{ExecAction, Lifecycle, LifecycleHandler};

use quorumdb_core::ClusterView;
use quorumdb_core::constants::{ports, volumes};

use super::{ContainerParts, command, exec_probe, mount, port};

pub(super) fn parts(view: &ClusterView) -> ContainerParts {
    let opts = &view.spec().xenon_opts;

    ContainerParts {
        image: opts.image.clone(),
        lifecycle: Some(Lifecycle {
            post_start: Some(script("/scripts/post-start.sh")),
            pre_stop: Some(script("/scripts/pre-stop.sh")),
            ..Default::default()
        }),
        resources: Some(opts.resources.clone()),
        ports: vec![port(ports::XENON_NAME, ports::XENON)],
        liveness_probe: Some(exec_probe(&["pgrep", "xenond"], (30, 5, 10, 1, 3))),
        readiness_probe: Some(exec_probe(
            &["sh", "-c", "xenoncli xenon ping"],
            (10, 5, 10, 1, 3),
        )),
        volume_mounts: vec![
            mount(volumes::SCRIPTS, volumes::SCRIPTS_PATH),
            mount(volumes::XENON, volumes::XENON_PATH),
        ],
        ..Default::default()
    }
}

fn script(path: &str) -> LifecycleHandler {
    LifecycleHandler {
        exec: Some(ExecAction {
            command: Some(command(&["sh", "-c", path])),
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorumdb_core::{MysqlCluster, MysqlClusterSpec};

    #[test]
    fn test_xenon_parts() {
        let parts = parts(&ClusterView::new(MysqlCluster::new("sample", MysqlClusterSpec::default())));
        assert_eq!(parts.image, "quorumdb/xenon:1.1.5");
        assert_eq!(parts.ports[0].container_port, 8801);

        let lifecycle = parts.lifecycle.unwrap();
        let post_start = lifecycle.post_start.unwrap().exec.unwrap().command.unwrap();
        assert_eq!(post_start.last().map(String::as_str), Some("/scripts/post-start.sh"));
        assert!(lifecycle.pre_stop.is_some());
    }
}

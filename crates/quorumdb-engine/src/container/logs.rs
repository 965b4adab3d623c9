//! Log tailing sidecars

use quorumdb_core::ClusterView;
use quorumdb_core::constants::{AUDIT_LOG_PATH, SLOW_LOG_PATH, volumes};

use super::{ContainerParts, command, mount};

pub(super) fn slow_log(view: &ClusterView) -> ContainerParts {
    tail(view, SLOW_LOG_PATH)
}

pub(super) fn audit_log(view: &ClusterView) -> ContainerParts {
    tail(view, AUDIT_LOG_PATH)
}

fn tail(view: &ClusterView, path: &str) -> ContainerParts {
    let pod = &view.spec().pod_spec;
    ContainerParts {
        image: pod.busybox_image.clone(),
        command: command(&["tail", "-F", path]),
        resources: Some(pod.resources.clone()),
        volume_mounts: vec![mount(volumes::LOGS, volumes::LOGS_PATH)],
        ..Default::default()
    }
}

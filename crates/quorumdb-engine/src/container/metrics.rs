//! Prometheus exporter for the mysql server

use quorumdb_core::ClusterView;
use quorumdb_core::constants::ports;

use super::{ContainerParts, env_from_secret, http_probe, port};

pub(super) fn parts(view: &ClusterView) -> ContainerParts {
    let opts = &view.spec().metrics_opts;

    ContainerParts {
        image: opts.image.clone(),
        env: vec![env_from_secret(view, "DATA_SOURCE_NAME", "data-source", false)],
        resources: Some(opts.resources.clone()),
        ports: vec![port(ports::METRICS_NAME, ports::METRICS)],
        liveness_probe: Some(http_probe("/metrics", ports::METRICS, (15, 5, 10, 1, 3))),
        readiness_probe: Some(http_probe("/metrics", ports::METRICS, (5, 1, 10, 1, 3))),
        ..Default::default()
    }
}

//! The mysql server container

use quorumdb_core::constants::{CLIENT_CONF_PATH, ports, volumes};
use quorumdb_core::ClusterView;

use super::{ContainerParts, env, exec_probe, mount, port};

pub(super) fn parts(view: &ClusterView) -> ContainerParts {
    let opts = &view.spec().mysql_opts;

    let ping = format!("mysqladmin --defaults-file={CLIENT_CONF_PATH} ping");
    let select = format!(r#"test $(mysql --defaults-file={CLIENT_CONF_PATH} -NB -e "SELECT 1") -eq 1"#);

    ContainerParts {
        image: view.mysql_image().to_string(),
        env: if opts.init_tokudb {
            vec![env("INIT_TOKUDB", "1")]
        } else {
            Vec::new()
        },
        resources: Some(opts.resources.clone()),
        ports: vec![port(ports::MYSQL_NAME, ports::MYSQL)],
        liveness_probe: Some(exec_probe(&["sh", "-c", &ping], (30, 5, 10, 1, 3))),
        readiness_probe: Some(exec_probe(&["sh", "-c", &select], (10, 1, 10, 1, 3))),
        volume_mounts: vec![
            mount(volumes::CONF, volumes::CONF_PATH),
            mount(volumes::DATA, volumes::DATA_PATH),
            mount(volumes::LOGS, volumes::LOGS_PATH),
        ],
        ..Default::default()
    }
}

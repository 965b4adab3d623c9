//! Init containers: the config-rendering sidecar and the mysql bootstrap

use quorumdb_core::constants::volumes;
use quorumdb_core::{ClusterView, ResourceKind};

use super::{ContainerParts, command, env, env_from_field, env_from_secret, mount};

/// Credentials injected into the init sidecar: (env name, secret key, optional)
const SIDECAR_SECRETS: &[(&str, &str, bool)] = &[
    ("MYSQL_ROOT_PASSWORD", "root-password", false),
    ("MYSQL_DATABASE", "mysql-database", true),
    ("MYSQL_USER", "mysql-user", true),
    ("MYSQL_PASSWORD", "mysql-password", true),
    ("MYSQL_REPL_USER", "replication-user", true),
    ("MYSQL_REPL_PASSWORD", "replication-password", true),
    ("METRICS_USER", "metrics-user", true),
    ("METRICS_PASSWORD", "metrics-password", true),
    ("OPERATOR_USER", "operator-user", true),
    ("OPERATOR_PASSWORD", "operator-password", true),
];

pub(super) fn sidecar(view: &ClusterView) -> ContainerParts {
    let spec = view.spec();

    let mut env_vars = vec![
        env_from_field("POD_HOSTNAME", "metadata.name"),
        env("NAMESPACE", view.namespace()),
        env("SERVICE_NAME", view.name_for(ResourceKind::HeadlessService)),
        env(
            "ADMIT_DEFEAT_HEARBEAT_COUNT",
            spec.xenon_opts.admit_defeat_hearbeat_count.to_string(),
        ),
        env("ELECTION_TIMEOUT", spec.xenon_opts.election_timeout.to_string()),
        env("MY_MYSQL_VERSION", view.mysql_version()),
    ];
    env_vars.extend(
        SIDECAR_SECRETS
            .iter()
            .map(|(name, key, optional)| env_from_secret(view, name, key, *optional)),
    );
    if spec.mysql_opts.init_tokudb {
        env_vars.push(env("INIT_TOKUDB", "1"));
    }

    let mut mounts = vec![
        mount(volumes::CONF, volumes::CONF_PATH),
        mount(volumes::CONFIG_MAP, volumes::CONFIG_MAP_PATH),
        mount(volumes::SCRIPTS, volumes::SCRIPTS_PATH),
        mount(volumes::XENON, volumes::XENON_PATH),
        mount(volumes::INIT_FILE, volumes::INIT_FILE_PATH),
    ];
    if spec.mysql_opts.init_tokudb {
        mounts.push(mount(volumes::SYS, volumes::SYS_PATH));
    }
    if spec.persistence.enabled {
        mounts.push(mount(volumes::DATA, volumes::DATA_PATH));
    }

    ContainerParts {
        image: spec.pod_spec.sidecar_image.clone(),
        command: command(&["sidecar", "init"]),
        env: env_vars,
        resources: Some(spec.pod_spec.resources.clone()),
        volume_mounts: mounts,
        ..Default::default()
    }
}

pub(super) fn mysql(view: &ClusterView) -> ContainerParts {
    let opts = &view.spec().mysql_opts;

    let mut env_vars = vec![
        env("MYSQL_ALLOW_EMPTY_PASSWORD", "yes"),
        env("MYSQL_ROOT_HOST", opts.root_host.clone()),
        env_from_secret(view, "MYSQL_ROOT_PASSWORD", "root-password", false),
    ];
    if opts.init_tokudb {
        env_vars.push(env("INIT_TOKUDB", "1"));
    }

    ContainerParts {
        image: view.mysql_image().to_string(),
        env: env_vars,
        resources: Some(opts.resources.clone()),
        volume_mounts: vec![
            mount(volumes::CONF, volumes::CONF_PATH),
            mount(volumes::DATA, volumes::DATA_PATH),
            mount(volumes::LOGS, volumes::LOGS_PATH),
            mount(volumes::INIT_FILE, volumes::INIT_FILE_PATH),
        ],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorumdb_core::{MysqlCluster, MysqlClusterSpec};

    fn view_with(spec: MysqlClusterSpec) -> ClusterView {
        let mut cluster = MysqlCluster::new("sample", spec);
        cluster.metadata.namespace = Some("db".to_string());
        ClusterView::new(cluster)
    }

    fn env_names(parts: &ContainerParts) -> Vec<&str> {
        parts.env.iter().map(|e| e.name.as_str()).collect()
    }

    fn mount_names(parts: &ContainerParts) -> Vec<&str> {
        parts.volume_mounts.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn test_sidecar_env() {
        let parts = sidecar(&view_with(MysqlClusterSpec::default()));
        let names = env_names(&parts);

        assert_eq!(&names[..6], &[
            "POD_HOSTNAME",
            "NAMESPACE",
            "SERVICE_NAME",
            "ADMIT_DEFEAT_HEARBEAT_COUNT",
            "ELECTION_TIMEOUT",
            "MY_MYSQL_VERSION",
        ]);
        assert_eq!(names.last(), Some(&"INIT_TOKUDB"));
        assert_eq!(parts.env[1].value.as_deref(), Some("db"));
        assert_eq!(parts.env[2].value.as_deref(), Some("sample-mysql"));
        assert_eq!(parts.env[5].value.as_deref(), Some("5.7.34"));

        let root = parts.env.iter().find(|e| e.name == "MYSQL_ROOT_PASSWORD").unwrap();
        let selector = root.value_from.as_ref().unwrap().secret_key_ref.as_ref().unwrap();
        assert_eq!(selector.key, "root-password");
        assert_eq!(selector.optional, Some(false));
    }

    #[test]
    fn test_sidecar_mounts_follow_flags() {
        let parts = sidecar(&view_with(MysqlClusterSpec::default()));
        let names = mount_names(&parts);
        assert!(names.contains(&volumes::SYS));
        assert!(names.contains(&volumes::DATA));

        let mut spec = MysqlClusterSpec::default();
        spec.mysql_opts.init_tokudb = false;
        spec.persistence.enabled = false;
        let parts = sidecar(&view_with(spec));
        let names = mount_names(&parts);
        assert_eq!(names, vec![
            volumes::CONF,
            volumes::CONFIG_MAP,
            volumes::SCRIPTS,
            volumes::XENON,
            volumes::INIT_FILE,
        ]);
        assert!(!env_names(&parts).contains(&"INIT_TOKUDB"));
    }

    #[test]
    fn test_init_mysql() {
        let parts = mysql(&view_with(MysqlClusterSpec::default()));
        assert_eq!(parts.image, "percona/percona-server:5.7.34");
        assert_eq!(env_names(&parts), vec![
            "MYSQL_ALLOW_EMPTY_PASSWORD",
            "MYSQL_ROOT_HOST",
            "MYSQL_ROOT_PASSWORD",
            "INIT_TOKUDB",
        ]);
        assert_eq!(parts.env[1].value.as_deref(), Some("127.0.0.1"));
        assert_eq!(mount_names(&parts), vec![
            volumes::CONF,
            volumes::DATA,
            volumes::LOGS,
            volumes::INIT_FILE,
        ]);
    }
}

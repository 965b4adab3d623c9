//! Well-known names shared by the builder and the rollout logic

/// Container names
pub mod containers {
    pub const INIT_SIDECAR: &str = "init-sidecar";
    pub const INIT_MYSQL: &str = "init-mysql";
    pub const MYSQL: &str = "mysql";
    pub const XENON: &str = "xenon";
    pub const METRICS: &str = "metrics";
    pub const SLOW_LOG: &str = "slowlog";
    pub const AUDIT_LOG: &str = "auditlog";
}

/// Pod labels maintained by the consensus sidecar and the fleet controller
pub mod labels {
    /// Consensus role of a pod
    pub const ROLE: &str = "role";
    pub const ROLE_LEADER: &str = "leader";
    pub const ROLE_CANDIDATE: &str = "candidate";

    /// Health as reported by the consensus sidecar
    pub const HEALTHY: &str = "healthy";
    pub const HEALTHY_YES: &str = "yes";
    pub const HEALTHY_NO: &str = "no";

    /// Template generation a pod was created from
    pub const REVISION_HASH: &str = "controller-revision-hash";

    pub const APP_NAME: &str = "app.kubernetes.io/name";
    pub const APP_INSTANCE: &str = "app.kubernetes.io/instance";
    pub const APP_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const APP_COMPONENT: &str = "app.kubernetes.io/component";
    pub const APP_PART_OF: &str = "app.kubernetes.io/part-of";
    pub const APP_VERSION: &str = "app.kubernetes.io/version";

    pub const APP_NAME_VALUE: &str = "mysql";
    pub const MANAGED_BY_VALUE: &str = "mysql.quorumdb.io";
    pub const COMPONENT_VALUE: &str = "database";
    pub const PART_OF_VALUE: &str = "quorumdb";
}

/// Pod template annotations
pub mod annotations {
    /// Fingerprint of the rendered config map
    pub const CONFIG_REV: &str = "config_rev";
    /// Fingerprint of the credentials secret
    pub const SECRET_REV: &str = "secret_rev";

    pub const PROMETHEUS_SCRAPE: &str = "prometheus.io/scrape";
    pub const PROMETHEUS_PORT: &str = "prometheus.io/port";
}

/// Container ports
pub mod ports {
    pub const MYSQL: i32 = 3306;
    pub const MYSQL_NAME: &str = "mysql";
    pub const XENON: i32 = 8801;
    pub const XENON_NAME: &str = "xenon";
    pub const XENON_PEER: i32 = 6601;
    pub const METRICS: i32 = 9104;
    pub const METRICS_NAME: &str = "metrics";
}

/// Volume names and mount paths
pub mod volumes {
    pub const CONF: &str = "conf";
    pub const CONF_PATH: &str = "/etc/mysql";

    pub const CONFIG_MAP: &str = "config-map";
    pub const CONFIG_MAP_PATH: &str = "/mnt/config-map";

    pub const SCRIPTS: &str = "scripts";
    pub const SCRIPTS_PATH: &str = "/scripts";

    pub const XENON: &str = "xenon";
    pub const XENON_PATH: &str = "/etc/xenon";

    pub const INIT_FILE: &str = "init-mysql";
    pub const INIT_FILE_PATH: &str = "/docker-entrypoint-initdb.d";

    pub const LOGS: &str = "logs";
    pub const LOGS_PATH: &str = "/var/log/mysql";

    pub const DATA: &str = "data";
    pub const DATA_PATH: &str = "/var/lib/mysql";

    pub const SYS: &str = "host-sys";
    pub const SYS_PATH: &str = "/host-sys";
    pub const SYS_HOST_PATH: &str = "/sys/kernel/mm/transparent_hugepage";
}

/// Client config written by the init sidecar; used by the mysql probes
pub const CLIENT_CONF_PATH: &str = "/etc/mysql/client.conf";

pub const SLOW_LOG_PATH: &str = "/var/log/mysql/mysql-slow.log";
pub const AUDIT_LOG_PATH: &str = "/var/log/mysql/mysql-audit.log";

/// Full MySQL version used when the requested one is unknown
pub const MYSQL_DEFAULT_VERSION: &str = "5.7.34";

/// Supported MySQL versions and their images
pub const MYSQL_IMAGES: &[(&str, &str)] = &[
    ("5.7.34", "percona/percona-server:5.7.34"),
    ("8.0.25", "percona/percona-server:8.0.25"),
];

/// Short version aliases
const MYSQL_VERSION_ALIASES: &[(&str, &str)] = &[("5.7", "5.7.34"), ("8.0", "8.0.25")];

/// Resolve a requested version to a supported full version
pub fn resolve_mysql_version(requested: &str) -> &'static str {
    if let Some((_, full)) = MYSQL_VERSION_ALIASES.iter().find(|(alias, _)| *alias == requested) {
        return full;
    }
    MYSQL_IMAGES
        .iter()
        .find(|(version, _)| *version == requested)
        .map(|(version, _)| *version)
        .unwrap_or(MYSQL_DEFAULT_VERSION)
}

/// Image for a full MySQL version
pub fn mysql_image(version: &str) -> Option<&'static str> {
    MYSQL_IMAGES
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, image)| *image)
}

//! Syncer and rollout settings

use kube::runtime::events::Reporter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Controller name reported on events
pub const DEFAULT_CONTROLLER_NAME: &str = "quorumdb-controller";

/// Rolling update settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutConfig {
    /// Delay between two readiness probes of a replaced pod (default: 10s)
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How long a replaced pod may take to become ready (default: 2h)
    #[serde(default = "default_pod_wait_timeout", with = "humantime_serde")]
    pub pod_wait_timeout: Duration,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            pod_wait_timeout: default_pod_wait_timeout(),
        }
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_pod_wait_timeout() -> Duration {
    Duration::from_secs(2 * 60 * 60)
}

/// StatefulSet syncer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncerConfig {
    #[serde(default)]
    pub rollout: RolloutConfig,

    /// Name reported as the source of events and writes
    #[serde(default = "default_controller_name")]
    pub controller_name: String,
}

impl SyncerConfig {
    /// Reporter stamped on every published event
    pub fn reporter(&self) -> Reporter {
        Reporter {
            controller: self.controller_name.clone(),
            instance: None,
        }
    }

    /// Field manager used for StatefulSet writes
    pub fn field_manager(&self) -> &str {
        &self.controller_name
    }
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            rollout: RolloutConfig::default(),
            controller_name: default_controller_name(),
        }
    }
}

fn default_controller_name() -> String {
    DEFAULT_CONTROLLER_NAME.to_string()
}

//! Error types for quorumdb-kube

use thiserror::Error;

use quorumdb_engine::EngineError;

/// Result type for quorumdb-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while reconciling a fleet
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Object does not exist
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Write rejected because the object changed since it was read
    #[error("{kind} '{namespace}/{name}' was modified concurrently, retry with a fresh copy")]
    WriteConflict {
        kind: String,
        namespace: String,
        name: String,
    },

    /// The owning cluster is being deleted
    #[error("owner deleted: {0}")]
    OwnerDeleted(String),

    /// Nothing to do for this object
    #[error("ignored: {0}")]
    Ignore(String),

    /// Some pods are not healthy, a rollout would lose quorum
    #[error("cannot update fleet, unhealthy pods: {}", pods.join(", "))]
    UnhealthyPrecondition { pods: Vec<String> },

    /// More than one pod is labeled leader
    #[error("cannot update fleet, multiple leaders: {}", pods.join(", "))]
    MultipleLeaders { pods: Vec<String> },

    /// Pod entered the Failed phase while being replaced
    #[error("pod '{namespace}/{name}' is in failed phase")]
    PodFailed { namespace: String, name: String },

    /// Polling gave up
    #[error("timed out after {timeout} waiting for {what}")]
    WaitTimeout { what: String, timeout: String },

    /// Desired state could not be built
    #[error("failed to build desired state: {0}")]
    Engine(#[source] EngineError),

    /// Fleet object is missing a required field
    #[error("invalid StatefulSet: {0}")]
    InvalidFleet(String),
}

impl From<EngineError> for KubeError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::OwnerDeleted { .. } => KubeError::OwnerDeleted(e.to_string()),
            other => KubeError::Engine(other),
        }
    }
}

impl KubeError {
    /// Check if this is a Not Found error (404)
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::NotFound { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        match self {
            KubeError::WriteConflict { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    /// Errors that end a sync successfully instead of failing it
    pub fn is_soft(&self) -> bool {
        matches!(self, KubeError::OwnerDeleted(_) | KubeError::Ignore(_))
    }
}

//! Builder error types

use thiserror::Error;

use quorumdb_core::CoreError;

/// Errors raised while computing the desired fleet
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Cluster spec error: {0}")]
    Core(#[from] CoreError),

    #[error("Failed to merge {what}: {source}")]
    Merge {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Owner {owner} is being deleted, refusing to recreate {kind} {name}")]
    OwnerDeleted {
        owner: String,
        kind: String,
        name: String,
    },

    #[error("{kind} {name} is already controlled by {controller}")]
    AlreadyOwned {
        kind: String,
        name: String,
        controller: String,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;

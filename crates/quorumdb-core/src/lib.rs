//! QuorumDB Core - Cluster types shared by the operator crates
//!
//! This crate provides:
//! - `MysqlCluster`: the custom resource describing a MySQL fleet
//! - `ClusterView`: read-only projection used to build the desired state
//! - `constants`: container, label, annotation, port and volume names

pub mod cluster;
pub mod constants;
pub mod error;
pub mod view;

pub use cluster::{
    MetricsOpts, MysqlCluster, MysqlClusterSpec, MysqlOpts, Persistence, PodOverlay, XenonOpts,
};
pub use error::{CoreError, Result};
pub use view::{ClusterView, ResourceKind};

//! QuorumDB Engine - Desired state of a MySQL fleet
//!
//! This crate provides:
//! - `container`: the closed set of container roles and their builders
//! - `template`: the pod template and StatefulSet mutation
//! - `merge`: defaults merge used for the user overlay and live objects

pub mod container;
pub mod error;
pub mod merge;
pub mod template;

pub use container::{ContainerRole, build_container};
pub use error::{EngineError, Result};
pub use template::{
    DesiredPodTemplate, Revisions, build_pod_spec, build_pod_template, mutate_statefulset,
};

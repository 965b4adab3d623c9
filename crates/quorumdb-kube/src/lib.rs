//! QuorumDB Kube - Kubernetes integration for QuorumDB
//!
//! This crate provides:
//! - **Syncer**: converges the fleet StatefulSet of a cluster, one event per sync
//! - **Rolling Update**: leader-last pod replacement with health gating
//! - **Poller**: interval polling with a hard deadline
//! - **Object Store**: kube-rs backed and in-memory object access
//! - **Events**: Kubernetes Event publishing, fire-and-forget

pub mod config;
pub mod error;
pub mod events;
pub mod poller;
pub mod rollout;
pub mod store;
pub mod syncer;

pub use config::{RolloutConfig, SyncerConfig};
pub use error::{KubeError, Result};
pub use events::{
    EventPublisher, KubeEventPublisher, MemoryEventPublisher, NoopEventPublisher, RecordedEvent,
    Severity,
};
pub use poller::{PollState, Poller};
pub use rollout::{RollingUpdate, pod_updated};
pub use store::{Call, KubeStore, MockStore, ObjectStore, OperationCounts, RestartBehavior};
pub use syncer::{OperationResult, StatefulSetSyncer, SyncEvent, SyncOutcome};

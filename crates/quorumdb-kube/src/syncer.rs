//! StatefulSet reconciliation
//!
//! A [`StatefulSetSyncer`] converges the fleet StatefulSet of one cluster onto
//! its desired state: create it when missing, rewrite it when the desired
//! state differs, then let [`RollingUpdate`] bring the pods to the new
//! template. Every call to [`StatefulSetSyncer::sync`] publishes exactly one
//! event on the cluster.

use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{Instrument, Span, debug, error, info, info_span};

use quorumdb_core::{ClusterView, ResourceKind};
use quorumdb_engine::{Revisions, mutate_statefulset};

use crate::config::SyncerConfig;
use crate::error::{KubeError, Result};
use crate::events::{EventPublisher, Severity, actions, reasons};
use crate::rollout::RollingUpdate;
use crate::store::ObjectStore;

/// What a sync did to the StatefulSet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    None,
    Created,
    Updated,
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationResult::None => write!(f, "unchanged"),
            OperationResult::Created => write!(f, "created"),
            OperationResult::Updated => write!(f, "updated"),
        }
    }
}

/// Event published for a sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub severity: Severity,
    pub reason: String,
    pub message: String,
}

/// Successful result of a sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub operation: OperationResult,
    pub event: SyncEvent,
}

/// Reconciler for the fleet StatefulSet of one cluster
pub struct StatefulSetSyncer {
    store: Arc<dyn ObjectStore>,
    events: Arc<dyn EventPublisher>,
    view: ClusterView,
    config_rev: String,
    secret_rev: String,
    config: SyncerConfig,
    /// Last StatefulSet seen or written
    sts: StatefulSet,
    span: Span,
}

impl StatefulSetSyncer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        events: Arc<dyn EventPublisher>,
        view: ClusterView,
        config_rev: impl Into<String>,
        secret_rev: impl Into<String>,
        config: SyncerConfig,
    ) -> Self {
        let sts = StatefulSet {
            metadata: ObjectMeta {
                name: Some(view.name_for(ResourceKind::StatefulSet)),
                namespace: Some(view.namespace().to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let span = info_span!(
            "sync",
            kind = "StatefulSet",
            namespace = view.namespace(),
            name = %view.name_for(ResourceKind::StatefulSet),
        );

        Self {
            store,
            events,
            view,
            config_rev: config_rev.into(),
            secret_rev: secret_rev.into(),
            config,
            sts,
            span,
        }
    }

    /// The StatefulSet as last read from or written to the store
    pub fn object(&self) -> &StatefulSet {
        &self.sts
    }

    /// `namespace/name` of the StatefulSet
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.view.namespace(),
            self.view.name_for(ResourceKind::StatefulSet)
        )
    }

    /// Converge the StatefulSet and its pods, publishing one event
    ///
    /// Soft errors (owner deleted, ignored) end the sync successfully with
    /// `OperationResult::None`. Any other error is published as a warning
    /// and returned.
    ///
    /// The rolling update runs after an update and also when the StatefulSet
    /// is unchanged. The status returned by a replace predates the new
    /// revision, and a rollout postponed by an unready or unhealthy fleet is
    /// resumed by a later sync this way. Converged fleets stop at the
    /// `updatedReplicas >= replicas` check without touching pods.
    pub async fn sync(&mut self) -> Result<SyncOutcome> {
        let span = self.span.clone();
        self.sync_and_report().instrument(span).await
    }

    async fn sync_and_report(&mut self) -> Result<SyncOutcome> {
        let key = self.key();

        let (outcome, failure) = match self.create_or_update().await {
            Ok(operation) => {
                info!(%operation, "sync done");
                (self.succeeded(&key, operation), None)
            }
            Err(e @ KubeError::OwnerDeleted(_)) => {
                info!(error = %e, "owner deleted, skipping");
                (self.succeeded(&key, OperationResult::None), None)
            }
            Err(e) if e.is_soft() => {
                debug!(error = %e, "syncer skipped");
                (self.succeeded(&key, OperationResult::None), None)
            }
            Err(e) => {
                error!(error = %e, "sync failed");
                let outcome = SyncOutcome {
                    operation: OperationResult::None,
                    event: SyncEvent {
                        severity: Severity::Warning,
                        reason: reasons::STATEFULSET_FAILED.to_string(),
                        message: format!("StatefulSet {key} failed syncing: {e}"),
                    },
                };
                (outcome, Some(e))
            }
        };

        self.events
            .publish(
                &self.view.object_ref(),
                outcome.event.severity,
                &outcome.event.reason,
                actions::SYNC,
                Some(outcome.event.message.clone()),
            )
            .await;

        match failure {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    fn succeeded(&self, key: &str, operation: OperationResult) -> SyncOutcome {
        SyncOutcome {
            operation,
            event: SyncEvent {
                severity: Severity::Normal,
                reason: reasons::STATEFULSET_SUCCEEDED.to_string(),
                message: format!("StatefulSet {key} {operation} successfully"),
            },
        }
    }

    async fn create_or_update(&mut self) -> Result<OperationResult> {
        let namespace = self.view.namespace().to_string();
        let name = self.view.name_for(ResourceKind::StatefulSet);
        let revs = Revisions::new(&self.config_rev, &self.secret_rev);

        let live = match self.store.get_statefulset(&namespace, &name).await {
            Ok(live) => live,
            Err(e) if e.is_not_found() => {
                let mut fresh = StatefulSet {
                    metadata: ObjectMeta {
                        name: Some(name),
                        namespace: Some(namespace),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                mutate_statefulset(&mut fresh, &self.view, revs)?;
                self.sts = self.store.create_statefulset(&fresh).await?;
                return Ok(OperationResult::Created);
            }
            Err(e) => return Err(e),
        };

        if live.metadata.deletion_timestamp.is_some() {
            self.sts = live;
            return Err(KubeError::Ignore(format!(
                "StatefulSet {namespace}/{name} is being deleted"
            )));
        }

        let mut desired = live.clone();
        mutate_statefulset(&mut desired, &self.view, revs)?;

        let operation = if desired == live {
            debug!("StatefulSet up to date");
            self.sts = live;
            OperationResult::None
        } else {
            self.sts = self.store.update_statefulset(&desired).await?;
            OperationResult::Updated
        };

        // Also runs when unchanged: status may only now show the new revision
        RollingUpdate::new(
            self.store.clone(),
            self.sts.clone(),
            self.config.rollout.clone(),
        )
        .run()
        .await?;

        Ok(operation)
    }
}

//! Access to the objects a fleet is made of
//!
//! The syncer and the rolling update never talk to the API server directly:
//! they go through an [`ObjectStore`], backed either by kube-rs
//! ([`KubeStore`]) or by an in-memory cluster simulation ([`MockStore`]).

mod api;
mod mock;

pub use api::KubeStore;
pub use mock::{Call, MockStore, OperationCounts, RestartBehavior, fleet_pod};

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;

use crate::error::Result;

/// Object access used by the fleet reconciliation
///
/// Implementations must be Send + Sync for use across async tasks. Missing
/// objects are reported as `KubeError::NotFound` and stale writes as
/// `KubeError::WriteConflict`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<StatefulSet>;

    async fn create_statefulset(&self, sts: &StatefulSet) -> Result<StatefulSet>;

    /// Replace a StatefulSet, carrying its `resourceVersion`
    async fn update_statefulset(&self, sts: &StatefulSet) -> Result<StatefulSet>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// List the pods matching every label of `selector`, ordered by name
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Render a label selector as `k1=v1,k2=v2`
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether `labels` carry every pair of `selector`
pub fn matches_selector(
    labels: Option<&BTreeMap<String, String>>,
    selector: &BTreeMap<String, String>,
) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_string() {
        let selector = BTreeMap::from([
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        assert_eq!(selector_string(&selector), "a=1,b=2");
        assert_eq!(selector_string(&BTreeMap::new()), "");
    }

    #[test]
    fn test_matches_selector() {
        let selector = BTreeMap::from([("app".to_string(), "mysql".to_string())]);
        let mut labels = BTreeMap::from([("app".to_string(), "mysql".to_string())]);
        labels.insert("role".to_string(), "leader".to_string());

        assert!(matches_selector(Some(&labels), &selector));
        assert!(!matches_selector(None, &selector));
        assert!(matches_selector(None, &BTreeMap::new()));
    }
}

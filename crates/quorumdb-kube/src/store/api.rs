//! ObjectStore backed by the Kubernetes API

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;

use super::{ObjectStore, selector_string};
use crate::config::SyncerConfig;
use crate::error::{KubeError, Result};

/// Kubernetes API store
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    /// Create with the default client configuration
    pub async fn try_default(config: &SyncerConfig) -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::from_config(client, config))
    }

    /// Create with an existing client, writing as the syncer's controller
    pub fn from_config(client: Client, config: &SyncerConfig) -> Self {
        Self::with_client(client, config.field_manager())
    }

    /// Create with an existing client
    pub fn with_client(client: Client, field_manager: &str) -> Self {
        Self {
            client,
            field_manager: field_manager.to_string(),
        }
    }

    fn statefulsets(&self, namespace: &str) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

/// Map 404 and 409 onto the store's error taxonomy
fn map_api_error(err: kube::Error, kind: &str, namespace: &str, name: &str) -> KubeError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => KubeError::NotFound {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 409 => KubeError::WriteConflict {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        other => KubeError::Api(other),
    }
}

fn object_key(sts: &StatefulSet) -> Result<(&str, &str)> {
    match (sts.metadata.namespace.as_deref(), sts.metadata.name.as_deref()) {
        (Some(namespace), Some(name)) => Ok((namespace, name)),
        _ => Err(KubeError::InvalidFleet(
            "StatefulSet has no namespace or name".to_string(),
        )),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<StatefulSet> {
        self.statefulsets(namespace)
            .get(name)
            .await
            .map_err(|e| map_api_error(e, "StatefulSet", namespace, name))
    }

    async fn create_statefulset(&self, sts: &StatefulSet) -> Result<StatefulSet> {
        let (namespace, name) = object_key(sts)?;
        self.statefulsets(namespace)
            .create(&self.post_params(), sts)
            .await
            .map_err(|e| map_api_error(e, "StatefulSet", namespace, name))
    }

    async fn update_statefulset(&self, sts: &StatefulSet) -> Result<StatefulSet> {
        let (namespace, name) = object_key(sts)?;
        self.statefulsets(namespace)
            .replace(name, &self.post_params(), sts)
            .await
            .map_err(|e| map_api_error(e, "StatefulSet", namespace, name))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.pods(namespace)
            .get(name)
            .await
            .map_err(|e| map_api_error(e, "Pod", namespace, name))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        let params = ListParams::default().labels(&selector_string(selector));
        let mut pods = self.pods(namespace).list(&params).await?.items;
        pods.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(pods)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_api_error(e, "Pod", namespace, name))
    }
}

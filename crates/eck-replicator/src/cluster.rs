//! Kubernetes access used by the plugin.
//!
//! Consumers depend on the [`ClusterApi`] trait; [`KubeCluster`] implements
//! it with the [`kube`] client using the ambient configuration (in-cluster
//! or a kubeconfig context). Tests substitute in-memory implementations.

use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use thiserror::Error;
use tracing::debug;

use crate::constants::{elasticsearch, move_engine};

/// Result type alias for Kubernetes calls.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors emitted by the Kubernetes integration.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The requested object does not exist.
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Object kind.
        kind: String,
        /// Object namespace.
        namespace: String,
        /// Object name.
        name: String,
    },

    /// The API server rejected or failed a call.
    #[error("Failed to {operation} {kind} in namespace {namespace}: {source}")]
    Api {
        /// The verb that failed (e.g., "get", "list", "replace").
        operation: &'static str,
        /// Object kind.
        kind: String,
        /// Namespace of the call.
        namespace: String,
        /// The underlying kube error.
        #[source]
        source: kube::Error,
    },

    /// An object lacks a field required to address it.
    #[error("{kind} object has no {field}")]
    MissingField {
        /// Object kind.
        kind: String,
        /// Missing metadata field.
        field: &'static str,
    },

    /// Client configuration could not be loaded.
    #[error("Failed to load Kubernetes configuration: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// In-cluster or default configuration could not be inferred.
    #[error("Failed to infer Kubernetes configuration: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    /// Client could not be created from the configuration.
    #[error("Failed to create Kubernetes client: {0}")]
    Client(#[source] kube::Error),
}

impl ClusterError {
    /// Creates a not found error.
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Maps a kube error, turning HTTP 404 into [`ClusterError::NotFound`].
    pub fn from_kube(
        operation: &'static str,
        kind: &str,
        namespace: &str,
        name: &str,
        source: kube::Error,
    ) -> Self {
        match &source {
            kube::Error::Api(response) if response.code == 404 => {
                Self::not_found(kind, namespace, name)
            }
            _ => Self::Api {
                operation,
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                source,
            },
        }
    }

    /// Returns true if the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// Kubernetes operations needed by the plugin.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Retrieves the control object.
    async fn get_move_engine(&self, namespace: &str, name: &str) -> ClusterResult<DynamicObject>;

    /// Retrieves an ECK `Elasticsearch` resource.
    async fn get_elasticsearch(&self, namespace: &str, name: &str)
        -> ClusterResult<DynamicObject>;

    /// Replaces an ECK `Elasticsearch` resource with an updated copy.
    async fn replace_elasticsearch(&self, elasticsearch: &DynamicObject)
        -> ClusterResult<DynamicObject>;

    /// Lists every StatefulSet in a namespace.
    async fn list_stateful_sets(&self, namespace: &str) -> ClusterResult<Vec<StatefulSet>>;

    /// Lists the pods in a namespace matching a label selector.
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> ClusterResult<Vec<Pod>>;

    /// Retrieves a Secret.
    async fn get_secret(&self, namespace: &str, name: &str) -> ClusterResult<Secret>;
}

/// Returns the API resource of the control object.
pub fn move_engine_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(move_engine::GROUP, move_engine::VERSION, move_engine::KIND),
        move_engine::PLURAL,
    )
}

/// Returns the API resource of the ECK `Elasticsearch` kind.
pub fn elasticsearch_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(
            elasticsearch::GROUP,
            elasticsearch::VERSION,
            elasticsearch::KIND,
        ),
        elasticsearch::PLURAL,
    )
}

/// [`ClusterApi`] backed by a [`kube::Client`].
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wraps an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects using an optional kubeconfig path and context.
    ///
    /// Without either, the configuration is inferred (in-cluster service
    /// account first, then `$KUBECONFIG` / `~/.kube/config`).
    pub async fn connect(kubeconfig: Option<&Path>, context: Option<&str>) -> ClusterResult<Self> {
        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            ..Default::default()
        };

        let config = match (kubeconfig, context) {
            (Some(path), _) => {
                let kubeconfig = Kubeconfig::read_from(path)?;
                Config::from_custom_kubeconfig(kubeconfig, &options).await?
            }
            (None, Some(_)) => Config::from_kubeconfig(&options).await?,
            (None, None) => Config::infer().await?,
        };

        debug!(cluster_url = %config.cluster_url, "Connecting to Kubernetes");
        let client = Client::try_from(config).map_err(ClusterError::Client)?;
        Ok(Self::new(client))
    }

    fn dynamic_api(&self, namespace: &str, resource: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_move_engine(&self, namespace: &str, name: &str) -> ClusterResult<DynamicObject> {
        self.dynamic_api(namespace, &move_engine_resource())
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube("get", move_engine::KIND, namespace, name, e))
    }

    async fn get_elasticsearch(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<DynamicObject> {
        self.dynamic_api(namespace, &elasticsearch_resource())
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube("get", elasticsearch::KIND, namespace, name, e))
    }

    async fn replace_elasticsearch(
        &self,
        elasticsearch: &DynamicObject,
    ) -> ClusterResult<DynamicObject> {
        let missing = |field| ClusterError::MissingField {
            kind: elasticsearch::KIND.to_string(),
            field,
        };
        let name = elasticsearch
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| missing("metadata.name"))?;
        let namespace = elasticsearch
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| missing("metadata.namespace"))?;

        self.dynamic_api(namespace, &elasticsearch_resource())
            .replace(name, &PostParams::default(), elasticsearch)
            .await
            .map_err(|e| {
                ClusterError::from_kube("replace", elasticsearch::KIND, namespace, name, e)
            })
    }

    async fn list_stateful_sets(&self, namespace: &str) -> ClusterResult<Vec<StatefulSet>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| ClusterError::from_kube("list", "StatefulSet", namespace, "", e))?;
        Ok(list.items)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> ClusterResult<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| ClusterError::from_kube("list", "Pod", namespace, "", e))?;
        Ok(list.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> ClusterResult<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| ClusterError::from_kube("get", "Secret", namespace, name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Testing".to_string(),
            code,
        })
    }

    #[test]
    fn test_from_kube_not_found() {
        let err = ClusterError::from_kube("get", "Elasticsearch", "default", "es", api_error(404));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Elasticsearch default/es not found");
    }

    #[test]
    fn test_from_kube_other_error() {
        let err = ClusterError::from_kube("get", "Secret", "default", "auth", api_error(403));
        assert!(!err.is_not_found());
        assert!(err
            .to_string()
            .starts_with("Failed to get Secret in namespace default"));
    }

    #[test]
    fn test_resources() {
        let me = move_engine_resource();
        assert_eq!(me.group, "kubemove.io");
        assert_eq!(me.plural, "moveengines");
        assert_eq!(me.api_version, "kubemove.io/v1alpha1");

        let es = elasticsearch_resource();
        assert_eq!(es.kind, "Elasticsearch");
        assert_eq!(es.plural, "elasticsearches");
    }
}

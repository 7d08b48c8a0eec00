//! The Elasticsearch data-sync plugin.
//!
//! Every call resolves its parameters from the control object, builds a
//! fresh Elasticsearch client, and runs one of:
//!
//! - **Init**: add the repository plugin installer to the Elasticsearch
//!   resource, wait for the rollout, then register the snapshot repository
//!   (read-only on standby clusters).
//! - **Sync**: start a snapshot (active) or close every index and start a
//!   restore (standby).
//! - **Status**: report the snapshot state (active) or the shard recovery
//!   state (standby).

use std::sync::Arc;

use async_trait::async_trait;
use ddm_plugin_common::{
    Clock, DataSyncPlugin, OperationStatus, PluginParams, PluginParamsExt, StatusError, TokioClock,
};
use tracing::{info, instrument};

use crate::bootstrap::inject_bootstrap;
use crate::client::{SecretClientFactory, ServiceClientFactory};
use crate::cluster::ClusterApi;
use crate::config::PluginConfig;
use crate::driver::ReplicationDriver;
use crate::error::{PluginError, PluginResult};
use crate::params::{ParameterResolver, PluginParameters};
use crate::readiness::ReadinessCoordinator;
use crate::registrar::RepositoryRegistrar;
use crate::status::StatusReporter;

/// Plugin name reported to the orchestrator.
pub const PLUGIN_NAME: &str = "elasticsearch";

/// Data-sync plugin for Elasticsearch clusters managed by ECK.
pub struct ElasticsearchPlugin {
    name: String,
    cluster: Arc<dyn ClusterApi>,
    clients: Arc<dyn ServiceClientFactory>,
    clock: Arc<dyn Clock>,
    config: Arc<PluginConfig>,
    resolver: ParameterResolver,
}

impl ElasticsearchPlugin {
    /// Creates a plugin from its collaborators.
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        clients: Arc<dyn ServiceClientFactory>,
        clock: Arc<dyn Clock>,
        config: Arc<PluginConfig>,
    ) -> Self {
        Self {
            name: PLUGIN_NAME.to_string(),
            resolver: ParameterResolver::new(cluster.clone()),
            cluster,
            clients,
            clock,
            config,
        }
    }

    /// Creates a plugin reading credentials from Kubernetes secrets and
    /// sleeping on the Tokio timer.
    pub fn with_default_clients(cluster: Arc<dyn ClusterApi>, config: Arc<PluginConfig>) -> Self {
        let clients = Arc::new(SecretClientFactory::new(
            cluster.clone(),
            config.elastic_user.clone(),
            config.request_timeout(),
        ));
        Self::new(cluster, clients, Arc::new(TokioClock), config)
    }

    /// Returns the plugin configuration.
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    fn readiness(&self) -> ReadinessCoordinator {
        ReadinessCoordinator::new(
            self.cluster.clone(),
            self.clock.clone(),
            self.config.readiness.policy(),
            self.config.bootstrap.container_name.clone(),
        )
    }

    /// Installs the repository plugin on every node and waits for the
    /// rollout to finish.
    async fn prepare_elasticsearch(&self, parameters: &PluginParameters) -> PluginResult<()> {
        let es = &parameters.elasticsearch;
        let mut resource = self.cluster.get_elasticsearch(&es.namespace, &es.name).await?;

        let changed = inject_bootstrap(
            &mut resource,
            &self.config.bootstrap,
            &parameters.repository.credentials,
        )?;
        if changed {
            self.cluster.replace_elasticsearch(&resource).await?;
            info!(
                namespace = %es.namespace,
                name = %es.name,
                "Injected repository plugin installer"
            );
        }

        self.readiness()
            .wait_until_ready(&es.namespace, &es.name, true)
            .await
    }
}

#[async_trait]
impl DataSyncPlugin for ElasticsearchPlugin {
    type Error = PluginError;

    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(plugin = %self.name))]
    async fn init(&self, params: &PluginParams) -> PluginResult<()> {
        let resolved = self.resolver.resolve(params).await?;
        let parameters = &resolved.parameters;

        self.prepare_elasticsearch(parameters).await?;

        let client = self.clients.connect(parameters).await?;
        RepositoryRegistrar::new(&client)
            .register(&parameters.repository, resolved.mode)
            .await?;

        info!(mode = %resolved.mode, "Init complete");
        Ok(())
    }

    #[instrument(skip_all, fields(plugin = %self.name))]
    async fn sync(&self, params: &PluginParams, _volumes: &[String]) -> PluginResult<String> {
        let snapshot = params.snapshot_name()?;
        let resolved = self.resolver.resolve(params).await?;

        let client = self.clients.connect(&resolved.parameters).await?;
        ReplicationDriver::new(&client)
            .trigger(resolved.mode, &resolved.parameters.repository.name, snapshot)
            .await
    }

    #[instrument(skip_all, fields(plugin = %self.name))]
    async fn status(
        &self,
        params: &PluginParams,
    ) -> Result<OperationStatus, StatusError<PluginError>> {
        let snapshot = params
            .snapshot_name()
            .map_err(|e| StatusError::errored(e.into()))?;
        let resolved = self
            .resolver
            .resolve(params)
            .await
            .map_err(StatusError::errored)?;

        let client = self
            .clients
            .connect(&resolved.parameters)
            .await
            .map_err(StatusError::errored)?;
        StatusReporter::new(&client)
            .report(resolved.mode, &resolved.parameters.repository.name, snapshot)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ElasticClient, MockServiceClientFactory};
    use crate::cluster::{elasticsearch_resource, move_engine_resource, MockClusterApi};
    use ddm_plugin_common::{keys, plugin_params, ManualClock, ParamError};
    use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
    use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
    use kube::api::DynamicObject;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UID: &str = "5d2a8f0c-1f47-4c1e-9d0b-7a2b6c3e9f10";

    fn move_engine(mode: &str) -> DynamicObject {
        let mut object =
            DynamicObject::new("sample-es-move", &move_engine_resource()).within("default");
        object.data = json!({
            "spec": {
                "mode": mode,
                "pluginParameters": {
                    "repository": {
                        "name": "minio_repo",
                        "bucket": "e2e-bucket",
                        "scheme": "http",
                        "credentials": "minio-credentials"
                    },
                    "elasticsearch": {
                        "name": "sample-es",
                        "namespace": "default",
                        "serviceName": "sample-es-es-http",
                        "scheme": "http",
                        "authSecret": "sample-es-es-elastic-user"
                    }
                }
            }
        });
        object
    }

    fn elasticsearch() -> DynamicObject {
        let mut es = DynamicObject::new("sample-es", &elasticsearch_resource()).within("default");
        es.metadata.uid = Some(UID.to_string());
        es.data = json!({
            "spec": { "version": "7.5.0", "nodeSets": [{ "name": "default", "count": 1 }] },
            "status": { "phase": "Ready" }
        });
        es
    }

    fn stateful_set() -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some("sample-es-es-default".to_string()),
                owner_references: Some(vec![OwnerReference {
                    api_version: "elasticsearch.k8s.elastic.co/v1".to_string(),
                    kind: "Elasticsearch".to_string(),
                    name: "sample-es".to_string(),
                    uid: UID.to_string(),
                    controller: Some(true),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([(
                        "elasticsearch.k8s.elastic.co/statefulset-name".to_string(),
                        "sample-es-es-default".to_string(),
                    )])),
                    ..Default::default()
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    fn bootstrapped_pod() -> Pod {
        Pod {
            spec: Some(PodSpec {
                init_containers: Some(vec![Container {
                    name: "plugin-installer".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn params() -> PluginParams {
        plugin_params! {
            keys::ENGINE_NAME => "sample-es-move",
            keys::ENGINE_NAMESPACE => "default",
            keys::SNAPSHOT_NAME => "snap-1",
        }
    }

    fn plugin(cluster: MockClusterApi, clients: MockServiceClientFactory) -> ElasticsearchPlugin {
        ElasticsearchPlugin::new(
            Arc::new(cluster),
            Arc::new(clients),
            Arc::new(ManualClock::new()),
            Arc::new(PluginConfig::default()),
        )
    }

    fn clients_for(server: &MockServer) -> MockServiceClientFactory {
        let uri = server.uri();
        let mut clients = MockServiceClientFactory::new();
        clients
            .expect_connect()
            .returning(move |_| ElasticClient::new(&uri, reqwest::Client::new(), None));
        clients
    }

    #[tokio::test]
    async fn test_init_injects_waits_and_registers() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/_snapshot/minio_repo"))
            .and(body_json(json!({
                "type": "s3",
                "settings": { "bucket": "e2e-bucket", "protocol": "http" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;

        let mut cluster = MockClusterApi::new();
        cluster
            .expect_get_move_engine()
            .returning(|_, _| Ok(move_engine("active")));
        cluster
            .expect_get_elasticsearch()
            .returning(|_, _| Ok(elasticsearch()));
        cluster
            .expect_replace_elasticsearch()
            .withf(|es| {
                es.data["spec"]["nodeSets"][0]["podTemplate"]["spec"]["initContainers"][0]["name"]
                    == "plugin-installer"
                    && es.data["spec"]["secureSettings"][0]["secretName"] == "minio-credentials"
            })
            .times(1)
            .returning(|es| Ok(es.clone()));
        cluster
            .expect_list_stateful_sets()
            .returning(|_| Ok(vec![stateful_set()]));
        cluster
            .expect_list_pods()
            .returning(|_, _| Ok(vec![bootstrapped_pod()]));

        plugin(cluster, clients_for(&server))
            .init(&params())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_requires_snapshot_name() {
        let mut cluster = MockClusterApi::new();
        cluster.expect_get_move_engine().never();
        let mut clients = MockServiceClientFactory::new();
        clients.expect_connect().never();

        let params = plugin_params! {
            keys::ENGINE_NAME => "sample-es-move",
            keys::ENGINE_NAMESPACE => "default",
        };
        let err = plugin(cluster, clients)
            .sync(&params, &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::Param(ParamError::MissingKey { ref key }) if key == keys::SNAPSHOT_NAME
        ));
    }

    #[tokio::test]
    async fn test_sync_standby_restores() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_all/_close"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_snapshot/minio_repo/snap-1/_restore"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut cluster = MockClusterApi::new();
        cluster
            .expect_get_move_engine()
            .returning(|_, _| Ok(move_engine("standby")));

        let result = plugin(cluster, clients_for(&server))
            .sync(&params(), &[])
            .await
            .unwrap();
        assert_eq!(result, "");
    }

    #[tokio::test]
    async fn test_status_resolution_failure_is_errored() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_get_move_engine()
            .returning(|_, _| Ok(DynamicObject::new("sample-es-move", &move_engine_resource())));
        let mut clients = MockServiceClientFactory::new();
        clients.expect_connect().never();

        let err = plugin(cluster, clients).status(&params()).await.unwrap_err();
        assert_eq!(err.status, OperationStatus::Errored);
        assert!(matches!(err.source, PluginError::ConfigNotFound { .. }));
    }

    #[tokio::test]
    async fn test_status_active_reports_snapshot_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_snapshot/minio_repo/snap-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "snapshots": [{ "snapshot": "snap-1", "state": "SUCCESS" }]
            })))
            .mount(&server)
            .await;

        let mut cluster = MockClusterApi::new();
        cluster
            .expect_get_move_engine()
            .returning(|_, _| Ok(move_engine("active")));

        let status = plugin(cluster, clients_for(&server))
            .status(&params())
            .await
            .unwrap();
        assert_eq!(status, OperationStatus::Completed);
    }

    #[test]
    fn test_name() {
        let plugin = plugin(MockClusterApi::new(), MockServiceClientFactory::new());
        assert_eq!(plugin.name(), "elasticsearch");
        assert_eq!(plugin.config().elastic_user, "elastic");
    }
}

//! Plugin parameters carried by the control object.
//!
//! The plugin keeps no state between calls, so every Init, Sync and Status
//! call starts by fetching the control object named in the parameter map
//! and decoding its `spec.pluginParameters` blob and `spec.mode` field.

use std::sync::Arc;

use ddm_plugin_common::{EngineMode, EngineRef, PluginParams, PluginParamsExt};
use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::cluster::ClusterApi;
use crate::constants::{move_engine, vendor};
use crate::error::{PluginError, PluginResult};

/// Default Elasticsearch HTTP port.
const DEFAULT_ES_PORT: u16 = 9200;

/// Snapshot repository settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepositoryOptions {
    /// Repository name registered in Elasticsearch.
    pub name: String,
    /// Repository type (e.g., "s3").
    #[serde(rename = "type")]
    pub kind: String,
    /// Bucket holding the snapshots.
    pub bucket: String,
    /// Path prefix inside the bucket.
    pub prefix: String,
    /// Object storage endpoint.
    pub endpoint: String,
    /// Protocol used to reach the object storage ("http" or "https").
    pub scheme: String,
    /// Secret holding the object storage credentials (ECK secure settings).
    pub credentials: String,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: vendor::REPOSITORY_TYPE_S3.to_string(),
            bucket: String::new(),
            prefix: String::new(),
            endpoint: String::new(),
            scheme: String::new(),
            credentials: String::new(),
        }
    }
}

/// Connection settings of the managed Elasticsearch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElasticsearchOptions {
    /// Name of the ECK `Elasticsearch` resource.
    pub name: String,
    /// Namespace of the resource, its secrets and its pods.
    pub namespace: String,
    /// Host name of the HTTP service.
    pub service_name: String,
    /// "http" or "https".
    pub scheme: String,
    /// HTTP port.
    pub port: u16,
    /// Secret holding the `elastic` user's password.
    pub auth_secret: String,
    /// Secret holding the CA certificate (`tls.crt`), used with https.
    pub tls_secret: String,
    /// Skip server certificate verification.
    pub insecure_skip_verify: bool,
}

impl Default for ElasticsearchOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            namespace: String::new(),
            service_name: String::new(),
            scheme: "https".to_string(),
            port: DEFAULT_ES_PORT,
            auth_secret: String::new(),
            tls_secret: String::new(),
            insecure_skip_verify: false,
        }
    }
}

impl ElasticsearchOptions {
    /// Returns the base URL of the Elasticsearch REST API.
    pub fn endpoint(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.service_name, self.port)
    }

    /// Returns true when the client must use TLS.
    pub fn uses_tls(&self) -> bool {
        self.scheme == "https"
    }
}

/// Configuration decoded from the control object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginParameters {
    /// Snapshot repository.
    pub repository: RepositoryOptions,
    /// Managed Elasticsearch.
    pub elasticsearch: ElasticsearchOptions,
}

impl PluginParameters {
    /// Checks the fields every operation needs.
    pub fn validate(&self) -> PluginResult<()> {
        let required = [
            ("repository.name", &self.repository.name),
            ("repository.bucket", &self.repository.bucket),
            ("elasticsearch.name", &self.elasticsearch.name),
            ("elasticsearch.namespace", &self.elasticsearch.namespace),
            ("elasticsearch.serviceName", &self.elasticsearch.service_name),
            ("elasticsearch.authSecret", &self.elasticsearch.auth_secret),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(PluginError::invalid_config(field, "must not be empty"));
            }
        }
        if !matches!(self.elasticsearch.scheme.as_str(), "http" | "https") {
            return Err(PluginError::invalid_config(
                "elasticsearch.scheme",
                format!("unsupported scheme '{}'", self.elasticsearch.scheme),
            ));
        }
        Ok(())
    }
}

/// Parameters and role resolved for one plugin call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParameters {
    /// Decoded plugin parameters.
    pub parameters: PluginParameters,
    /// Replication role of this cluster.
    pub mode: EngineMode,
}

/// Decodes the plugin parameters and mode of a control object.
///
/// The parameter blob may be an embedded JSON object or a JSON document
/// stored as a string.
pub fn decode_move_engine(
    object: &DynamicObject,
    engine: EngineRef<'_>,
) -> PluginResult<ResolvedParameters> {
    let spec = object.data.get("spec");
    let not_found = || PluginError::ConfigNotFound {
        kind: move_engine::KIND.to_string(),
        namespace: engine.namespace.to_string(),
        name: engine.name.to_string(),
    };

    let raw = spec
        .and_then(|s| s.get(move_engine::FIELD_PLUGIN_PARAMETERS))
        .filter(|v| !v.is_null())
        .ok_or_else(not_found)?;

    let parameters: PluginParameters = match raw {
        Value::String(document) => serde_json::from_str(document),
        other => serde_json::from_value(other.clone()),
    }
    .map_err(|source| PluginError::Decode { source })?;
    parameters.validate()?;

    let mode = spec
        .and_then(|s| s.get(move_engine::FIELD_MODE))
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(ResolvedParameters {
        parameters,
        mode: EngineMode::from_mode(mode),
    })
}

/// Resolves plugin parameters from the control object named in a call.
#[derive(Clone)]
pub struct ParameterResolver {
    cluster: Arc<dyn ClusterApi>,
}

impl ParameterResolver {
    /// Creates a resolver reading through the given cluster API.
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// Fetches and decodes the control object named in `params`.
    #[instrument(skip_all)]
    pub async fn resolve(&self, params: &PluginParams) -> PluginResult<ResolvedParameters> {
        let engine = params.engine_ref()?;
        let object = self
            .cluster
            .get_move_engine(engine.namespace, engine.name)
            .await?;

        let resolved = decode_move_engine(&object, engine)?;
        debug!(
            engine = %engine,
            mode = %resolved.mode,
            repository = %resolved.parameters.repository.name,
            "Resolved plugin parameters"
        );
        Ok(resolved)
    }
}

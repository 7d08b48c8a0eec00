//! Snapshot repository registration.

use ddm_plugin_common::EngineMode;
use serde::Serialize;
use tracing::{info, instrument};

use crate::client::{operations, ElasticClient};
use crate::error::PluginResult;
use crate::params::RepositoryOptions;

/// Settings of an object-storage snapshot repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositorySettings {
    /// Bucket holding the snapshots.
    pub bucket: String,
    /// Path prefix inside the bucket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_path: Option<String>,
    /// Object storage endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Object storage protocol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// `"true"` on standby clusters so they never write to the repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<String>,
}

/// Body of `PUT /_snapshot/{repository}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoCreateRequestBody {
    /// Repository type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Repository settings.
    pub settings: RepositorySettings,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl RepoCreateRequestBody {
    /// Builds the request body for a repository and role.
    pub fn for_repository(repository: &RepositoryOptions, mode: EngineMode) -> Self {
        Self {
            kind: repository.kind.clone(),
            settings: RepositorySettings {
                bucket: repository.bucket.clone(),
                base_path: non_empty(&repository.prefix),
                endpoint: non_empty(&repository.endpoint),
                protocol: non_empty(&repository.scheme),
                read_only: (!mode.is_active()).then(|| "true".to_string()),
            },
        }
    }
}

/// Registers the snapshot repository with Elasticsearch.
pub struct RepositoryRegistrar<'a> {
    client: &'a ElasticClient,
}

impl<'a> RepositoryRegistrar<'a> {
    /// Creates a registrar using `client`.
    pub fn new(client: &'a ElasticClient) -> Self {
        Self { client }
    }

    /// Creates or overwrites the repository.
    #[instrument(skip_all, fields(repository = %repository.name, mode = %mode))]
    pub async fn register(
        &self,
        repository: &RepositoryOptions,
        mode: EngineMode,
    ) -> PluginResult<()> {
        let body = RepoCreateRequestBody::for_repository(repository, mode);
        self.client
            .create_repository(&repository.name, &body)
            .await?
            .check(operations::CREATE_REPOSITORY)?;

        info!(
            repository = %repository.name,
            bucket = %repository.bucket,
            read_only = !mode.is_active(),
            "Registered snapshot repository"
        );
        Ok(())
    }
}

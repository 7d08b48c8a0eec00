//! Replication trigger.
//!
//! The active cluster starts a snapshot; the standby cluster closes every
//! index and starts a restore of the same snapshot. Both calls return as
//! soon as Elasticsearch accepts the request; progress is observed through
//! the status reporter.
//!
//! Nothing here guards against concurrent Syncs for different snapshot
//! names on one repository; Elasticsearch serializes or rejects them.

use ddm_plugin_common::EngineMode;
use tracing::{info, instrument, warn};

use crate::client::{operations, ElasticClient};
use crate::constants::vendor;
use crate::error::PluginResult;

/// Starts the snapshot or restore for one cluster.
pub struct ReplicationDriver<'a> {
    client: &'a ElasticClient,
}

impl<'a> ReplicationDriver<'a> {
    /// Creates a driver using `client`.
    pub fn new(client: &'a ElasticClient) -> Self {
        Self { client }
    }

    /// Triggers the operation for `mode` and returns an empty result.
    #[instrument(skip(self))]
    pub async fn trigger(
        &self,
        mode: EngineMode,
        repository: &str,
        snapshot: &str,
    ) -> PluginResult<String> {
        match mode {
            EngineMode::Active => self.snapshot(repository, snapshot).await?,
            EngineMode::Standby => self.restore(repository, snapshot).await?,
        }
        Ok(String::new())
    }

    async fn snapshot(&self, repository: &str, snapshot: &str) -> PluginResult<()> {
        self.client
            .create_snapshot(repository, snapshot)
            .await?
            .check(operations::CREATE_SNAPSHOT)?;
        info!(repository, snapshot, "Snapshot started");
        Ok(())
    }

    /// Closes every index, then starts the restore.
    ///
    /// Indices stay closed if the restore request fails.
    async fn restore(&self, repository: &str, snapshot: &str) -> PluginResult<()> {
        let closed = self.client.close_indices(vendor::ALL_INDICES).await?;
        if !closed.is_success() {
            warn!(
                status = closed.status,
                error = %closed.clone().into_error(operations::CLOSE_INDICES),
                "Closing indices failed, restoring anyway"
            );
        }

        self.client
            .restore_snapshot(repository, snapshot)
            .await?
            .check(operations::RESTORE_SNAPSHOT)?;
        info!(repository, snapshot, "Restore started");
        Ok(())
    }
}

//! Progress reporting of the last triggered snapshot or restore.
//!
//! Active clusters read the snapshot entry matching the snapshot name;
//! standby clusters read shard recovery activity. Every unmapped vendor
//! value is reported as such, never folded into success or failure.

use std::collections::BTreeMap;

use ddm_plugin_common::{EngineMode, OperationStatus, StatusError};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::client::{operations, ElasticClient, EsResponse};
use crate::constants::vendor;
use crate::error::{PluginError, PluginResult};

/// Result of a status lookup.
pub type StatusResult = Result<OperationStatus, StatusError<PluginError>>;

#[derive(Debug, Deserialize)]
struct SnapshotGetResponse {
    #[serde(default)]
    snapshots: Vec<SnapshotInfo>,
}

#[derive(Debug, Deserialize)]
struct SnapshotInfo {
    snapshot: String,
    state: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexRecovery {
    #[serde(default)]
    shards: Vec<ShardRecovery>,
}

#[derive(Debug, Deserialize)]
struct ShardRecovery {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    stage: String,
    #[serde(default)]
    source: RecoverySource,
}

#[derive(Debug, Default, Deserialize)]
struct RecoverySource {
    #[serde(default)]
    snapshot: Option<String>,
}

fn decode<T: serde::de::DeserializeOwned>(
    body: &[u8],
    operation: &'static str,
) -> Result<T, StatusError<PluginError>> {
    serde_json::from_slice(body)
        .map_err(|source| StatusError::errored(PluginError::ResponseDecode { operation, source }))
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

/// Maps a snapshot-get response body onto a status.
///
/// A blank body means the cluster held nothing to snapshot.
pub fn snapshot_status(body: &[u8], snapshot: &str) -> StatusResult {
    if is_blank(body) {
        return Ok(OperationStatus::Completed);
    }
    let response: SnapshotGetResponse = decode(body, operations::GET_SNAPSHOT)?;

    let Some(info) = response.snapshots.iter().find(|s| s.snapshot == snapshot) else {
        return Err(StatusError::new(
            OperationStatus::Invalid,
            PluginError::SnapshotNotFound {
                snapshot: snapshot.to_string(),
            },
        ));
    };

    match info.state.as_str() {
        vendor::SNAPSHOT_SUCCESS => Ok(OperationStatus::Completed),
        vendor::SNAPSHOT_IN_PROGRESS => Ok(OperationStatus::InProgress),
        vendor::SNAPSHOT_FAILED => {
            warn!(
                snapshot,
                reason = info.reason.as_deref().unwrap_or_default(),
                "Snapshot failed"
            );
            Ok(OperationStatus::Failed)
        }
        other => Err(StatusError::new(
            OperationStatus::Unknown,
            PluginError::UnknownSnapshotState {
                snapshot: snapshot.to_string(),
                state: other.to_string(),
            },
        )),
    }
}

/// Maps an indices-recovery response body onto a status.
///
/// Snapshot recoveries of other snapshots are ignored. Any other shard not
/// yet `DONE` keeps the restore in progress, and so does a response with no
/// index at all: the restore has not started recovering shards yet.
pub fn recovery_status(body: &[u8], snapshot: &str) -> StatusResult {
    if is_blank(body) {
        return Ok(OperationStatus::Completed);
    }
    let indices: BTreeMap<String, IndexRecovery> = decode(body, operations::INDICES_RECOVERY)?;
    if indices.is_empty() {
        debug!(snapshot, "No recovery activity yet");
        return Ok(OperationStatus::InProgress);
    }

    for (index, recovery) in &indices {
        for shard in &recovery.shards {
            if shard.kind == vendor::RECOVERY_TYPE_SNAPSHOT
                && shard.source.snapshot.as_deref() != Some(snapshot)
            {
                continue;
            }
            if shard.stage != vendor::RECOVERY_STAGE_DONE {
                debug!(index = %index, stage = %shard.stage, "Shard still recovering");
                return Ok(OperationStatus::InProgress);
            }
        }
    }
    Ok(OperationStatus::Completed)
}

/// Reports progress of the operation started by the last Sync.
pub struct StatusReporter<'a> {
    client: &'a ElasticClient,
}

fn checked(
    response: PluginResult<EsResponse>,
    operation: &'static str,
) -> Result<EsResponse, StatusError<PluginError>> {
    response
        .and_then(|r| r.check(operation))
        .map_err(StatusError::errored)
}

impl<'a> StatusReporter<'a> {
    /// Creates a reporter using `client`.
    pub fn new(client: &'a ElasticClient) -> Self {
        Self { client }
    }

    /// Looks up the status of `snapshot` for `mode`.
    #[instrument(skip(self))]
    pub async fn report(&self, mode: EngineMode, repository: &str, snapshot: &str) -> StatusResult {
        let status = match mode {
            EngineMode::Active => {
                let response = checked(
                    self.client.get_snapshot(repository, snapshot).await,
                    operations::GET_SNAPSHOT,
                )?;
                snapshot_status(&response.body, snapshot)?
            }
            EngineMode::Standby => {
                let response = checked(
                    self.client.indices_recovery().await,
                    operations::INDICES_RECOVERY,
                )?;
                recovery_status(&response.body, snapshot)?
            }
        };
        debug!(%status, "Reported status");
        Ok(status)
    }
}

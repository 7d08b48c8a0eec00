//! Plugin protocol and common abstractions.
//!
//! An orchestrator drives a data-sync plugin through three calls keyed by
//! a string parameter map: `Init` once per cluster, `Sync` to start a
//! transfer, and `Status` repeatedly until a terminal status is observed.
//! Plugins are stateless between calls; everything they need is re-derived
//! from the parameter map on every call.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ParamError, ParamResult};

/// Parameter map keys understood by data-sync plugins.
pub mod keys {
    /// Name of the control object describing the transfer.
    pub const ENGINE_NAME: &str = "engineName";

    /// Namespace of the control object.
    pub const ENGINE_NAMESPACE: &str = "engineNamespace";

    /// Correlation key between a Sync call and the Status calls after it.
    pub const SNAPSHOT_NAME: &str = "snapshotName";
}

/// Parameter map passed with every plugin call.
pub type PluginParams = BTreeMap<String, String>;

/// Status reported by a plugin's `Status` call.
///
/// Only [`OperationStatus::InProgress`] asks the caller to poll again;
/// every other value is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// The operation finished successfully.
    Completed,
    /// The operation is still running.
    InProgress,
    /// The operation the caller asked about does not exist.
    Invalid,
    /// The operation was canceled.
    Canceled,
    /// The status could not be determined because a call failed.
    Errored,
    /// The operation finished unsuccessfully.
    Failed,
    /// The managed service reported a state with no known meaning.
    Unknown,
}

impl OperationStatus {
    /// Returns the status name in lowercase.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Completed => "completed",
            OperationStatus::InProgress => "in_progress",
            OperationStatus::Invalid => "invalid",
            OperationStatus::Canceled => "canceled",
            OperationStatus::Errored => "errored",
            OperationStatus::Failed => "failed",
            OperationStatus::Unknown => "unknown",
        }
    }

    /// Returns true for every status except `InProgress`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::InProgress)
    }

    /// Returns true only for `Completed`.
    pub fn is_success(&self) -> bool {
        matches!(self, OperationStatus::Completed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replication role of the cluster a plugin instance runs next to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// Source of the replication (takes snapshots).
    Active,
    /// Destination of the replication (restores snapshots).
    Standby,
}

impl EngineMode {
    /// Mode string that selects [`EngineMode::Active`].
    pub const ACTIVE: &'static str = "active";

    /// Mode string conventionally used for [`EngineMode::Standby`].
    pub const STANDBY: &'static str = "standby";

    /// Maps the control object's mode field onto a role.
    ///
    /// Only `"active"` selects the active role; anything else is standby.
    pub fn from_mode(mode: &str) -> Self {
        if mode == Self::ACTIVE {
            EngineMode::Active
        } else {
            EngineMode::Standby
        }
    }

    /// Returns the mode string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineMode::Active => Self::ACTIVE,
            EngineMode::Standby => Self::STANDBY,
        }
    }

    /// Returns true for the active role.
    pub fn is_active(&self) -> bool {
        matches!(self, EngineMode::Active)
    }
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a `Status` call, carrying the status to report with it.
#[derive(Debug, Error)]
#[error("status {status}: {source}")]
pub struct StatusError<E>
where
    E: std::error::Error + 'static,
{
    /// Status the orchestrator should record.
    pub status: OperationStatus,
    /// Cause of the failure.
    #[source]
    pub source: E,
}

impl<E> StatusError<E>
where
    E: std::error::Error + 'static,
{
    /// Creates a status error.
    pub fn new(status: OperationStatus, source: E) -> Self {
        Self { status, source }
    }

    /// Creates an `Errored` status error.
    pub fn errored(source: E) -> Self {
        Self::new(OperationStatus::Errored, source)
    }

    /// Consumes the error and returns the cause.
    pub fn into_source(self) -> E {
        self.source
    }
}

/// Data-sync plugin driven by an external orchestrator.
///
/// # Example
///
/// ```ignore
/// use ddm_plugin_common::{DataSyncPlugin, OperationStatus, PluginParams, StatusError};
///
/// struct MyPlugin;
///
/// #[async_trait]
/// impl DataSyncPlugin for MyPlugin {
///     type Error = MyError;
///
///     fn name(&self) -> &str { "my-plugin" }
///
///     async fn init(&self, params: &PluginParams) -> Result<(), MyError> { Ok(()) }
///
///     async fn sync(&self, params: &PluginParams, _volumes: &[String]) -> Result<String, MyError> {
///         Ok(String::new())
///     }
///
///     async fn status(&self, params: &PluginParams)
///         -> Result<OperationStatus, StatusError<MyError>> {
///         Ok(OperationStatus::Completed)
///     }
/// }
/// ```
#[async_trait]
pub trait DataSyncPlugin: Send + Sync {
    /// Error returned by the plugin's calls.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the plugin name (used for logging).
    fn name(&self) -> &str;

    /// Prepares the cluster for replication.
    ///
    /// Called once per cluster; must be safe to call again after a failure.
    async fn init(&self, params: &PluginParams) -> Result<(), Self::Error>;

    /// Starts a transfer and returns an opaque result.
    ///
    /// Progress is observed through [`DataSyncPlugin::status`], never
    /// through this call's return value.
    async fn sync(&self, params: &PluginParams, volumes: &[String]) -> Result<String, Self::Error>;

    /// Reports the progress of the transfer started by the last `sync`.
    async fn status(
        &self,
        params: &PluginParams,
    ) -> Result<OperationStatus, StatusError<Self::Error>>;
}

/// Reference to the control object named by a parameter map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineRef<'a> {
    /// Control object name.
    pub name: &'a str,
    /// Control object namespace.
    pub namespace: &'a str,
}

impl fmt::Display for EngineRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Helper trait for reading plugin parameter maps.
pub trait PluginParamsExt {
    /// Gets the value for a key, if present.
    fn get_param(&self, key: &str) -> Option<&str>;

    /// Gets the value for a key, failing when it is absent or empty.
    fn require(&self, key: &str) -> ParamResult<&str>;

    /// Returns the control object reference (name and namespace).
    fn engine_ref(&self) -> ParamResult<EngineRef<'_>> {
        Ok(EngineRef {
            name: self.require(keys::ENGINE_NAME)?,
            namespace: self.require(keys::ENGINE_NAMESPACE)?,
        })
    }

    /// Returns the snapshot name correlating Sync and Status.
    fn snapshot_name(&self) -> ParamResult<&str> {
        self.require(keys::SNAPSHOT_NAME)
    }
}

impl PluginParamsExt for PluginParams {
    fn get_param(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> ParamResult<&str> {
        self.get_param(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ParamError::missing_key(key))
    }
}

/// Builds a [`PluginParams`] map from key-value pairs.
#[macro_export]
macro_rules! plugin_params {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut params = $crate::PluginParams::new();
        $(params.insert($key.to_string(), $value.to_string());)*
        params
    }};
}

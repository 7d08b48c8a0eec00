//! Error types for plugin operations.
//!
//! Every error keeps the operation it belongs to, and vendor errors keep the
//! root-cause type and reason reported by Elasticsearch verbatim, since that
//! pair is the operator's main diagnostic.

use std::time::Duration;

use ddm_plugin_common::{ParamError, PollError};
use thiserror::Error;

use crate::cluster::ClusterError;

/// Result type alias for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Broad classes of plugin failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or malformed configuration. Not worth retrying as-is.
    Config,
    /// The managed service or the Kubernetes API could not be reached.
    Transport,
    /// The managed service rejected a call with a parseable root cause.
    VendorApi,
    /// The managed service rejected a call and its error could not be parsed.
    UnparseableVendor,
    /// A readiness deadline expired.
    Timeout,
    /// The managed service reported a state the plugin cannot map.
    Status,
}

/// Errors that can occur during plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Required parameter map key is absent.
    #[error(transparent)]
    Param(#[from] ParamError),

    /// Control object carries no plugin parameters.
    #[error("Plugin parameters not found in {kind} {namespace}/{name}")]
    ConfigNotFound {
        /// Control object kind.
        kind: String,
        /// Control object namespace.
        namespace: String,
        /// Control object name.
        name: String,
    },

    /// Plugin parameters do not decode.
    #[error("Failed to decode plugin parameters: {source}")]
    Decode {
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Secret lacks a required key.
    #[error("Key '{key}' not found in secret {namespace}/{name}")]
    SecretKeyMissing {
        /// Secret namespace.
        namespace: String,
        /// Secret name.
        name: String,
        /// Missing key.
        key: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Building the HTTP client failed (bad CA certificate, TLS backend).
    #[error("Failed to build Elasticsearch client: {source}")]
    ClientBuild {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Request body could not be encoded.
    #[error("Failed to encode {operation} request: {source}")]
    RequestEncode {
        /// The operation whose request failed to encode.
        operation: &'static str,
        /// The underlying encode error.
        #[source]
        source: serde_json::Error,
    },

    /// Request could not be sent or no response arrived.
    #[error("Failed to send {operation} request: {source}")]
    Transport {
        /// The operation that failed.
        operation: &'static str,
        /// The underlying transport error.
        #[source]
        source: reqwest_middleware::Error,
    },

    /// Response body could not be read.
    #[error("Failed to read {operation} response: {source}")]
    ResponseBody {
        /// The operation that failed.
        operation: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Kubernetes API call failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Non-2xx response with a parseable root cause.
    #[error("Failed to {operation} (HTTP {status}). Error Type: {error_type}, Reason: {reason}")]
    VendorApi {
        /// The operation that failed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Root-cause type reported by Elasticsearch.
        error_type: String,
        /// Root-cause reason reported by Elasticsearch.
        reason: String,
    },

    /// Non-2xx response whose body is not a recognised error envelope.
    #[error("Failed to {operation} (HTTP {status}). Also, failed to parse the error info: {detail}")]
    UnparseableVendor {
        /// The operation that failed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Why the body could not be parsed.
        detail: String,
    },

    /// Successful response whose body does not decode.
    #[error("Failed to decode {operation} response: {source}")]
    ResponseDecode {
        /// The operation whose response failed to decode.
        operation: &'static str,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// A readiness deadline expired.
    #[error("Timed out after {elapsed:?} waiting for {operation}")]
    Timeout {
        /// What was awaited.
        operation: String,
        /// Time spent waiting.
        elapsed: Duration,
    },

    /// Snapshot reported a state with no known mapping.
    #[error("Snapshot '{snapshot}' is in unknown state '{state}'")]
    UnknownSnapshotState {
        /// Snapshot name.
        snapshot: String,
        /// State reported by Elasticsearch.
        state: String,
    },

    /// Snapshot listing has no entry for the requested snapshot.
    #[error("No snapshot found named '{snapshot}'")]
    SnapshotNotFound {
        /// Snapshot name.
        snapshot: String,
    },
}

impl PluginError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a secret key missing error.
    pub fn secret_key_missing(
        namespace: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::SecretKeyMissing {
            namespace: namespace.into(),
            name: name.into(),
            key: key.into(),
        }
    }

    /// Returns the class of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PluginError::Param(_)
            | PluginError::ConfigNotFound { .. }
            | PluginError::Decode { .. }
            | PluginError::SecretKeyMissing { .. }
            | PluginError::InvalidConfig { .. }
            | PluginError::ClientBuild { .. }
            | PluginError::RequestEncode { .. } => ErrorCategory::Config,
            PluginError::Transport { .. }
            | PluginError::ResponseBody { .. }
            | PluginError::Cluster(_) => ErrorCategory::Transport,
            PluginError::VendorApi { .. } => ErrorCategory::VendorApi,
            PluginError::UnparseableVendor { .. } | PluginError::ResponseDecode { .. } => {
                ErrorCategory::UnparseableVendor
            }
            PluginError::Timeout { .. } => ErrorCategory::Timeout,
            PluginError::UnknownSnapshotState { .. } | PluginError::SnapshotNotFound { .. } => {
                ErrorCategory::Status
            }
        }
    }

    /// Returns true if a readiness deadline expired.
    ///
    /// The caller may extend the deadline and retry the whole Init.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PluginError::Timeout { .. })
    }

    /// Returns the Elasticsearch root cause `(type, reason)`, if any.
    pub fn root_cause(&self) -> Option<(&str, &str)> {
        match self {
            PluginError::VendorApi {
                error_type, reason, ..
            } => Some((error_type.as_str(), reason.as_str())),
            _ => None,
        }
    }
}

impl From<PollError<PluginError>> for PluginError {
    fn from(err: PollError<PluginError>) -> Self {
        match err {
            PollError::Timeout { what, elapsed } => PluginError::Timeout {
                operation: what,
                elapsed,
            },
            PollError::Check(e) => e,
        }
    }
}

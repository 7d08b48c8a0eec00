//! Plugin configuration.
//!
//! The configuration is built once per process (defaults, optionally
//! overridden by a YAML file) and passed to the plugin explicitly.
//!
//! ```yaml
//! readiness:
//!   interval_secs: 5
//!   timeout_secs: 1200
//! status_poll:
//!   interval_secs: 2
//!   timeout_secs: 300
//! elastic_user: elastic
//! bootstrap:
//!   container_name: plugin-installer
//!   command: ["sh", "-c", "bin/elasticsearch-plugin install --batch repository-s3"]
//! request_timeout_secs: 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ddm_plugin_common::poll::defaults;
use ddm_plugin_common::PollPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{bootstrap, secrets};

/// Default timeout of a single Elasticsearch request.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range.
    #[error("Invalid configuration for {field}: {message}")]
    Invalid {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Interval and deadline of a polling loop, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollSettings {
    /// Seconds between checks.
    pub interval_secs: u64,
    /// Seconds before giving up.
    pub timeout_secs: u64,
}

impl PollSettings {
    fn from_policy(policy: PollPolicy) -> Self {
        Self {
            interval_secs: policy.interval.as_secs(),
            timeout_secs: policy.timeout.as_secs(),
        }
    }

    /// Returns the settings as a polling policy.
    pub fn policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.interval_secs),
            Duration::from_secs(self.timeout_secs),
        )
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::invalid(
                format!("{field}.interval_secs"),
                "must be greater than zero",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid(
                format!("{field}.timeout_secs"),
                "must be greater than zero",
            ));
        }
        if self.interval_secs > self.timeout_secs {
            return Err(ConfigError::invalid(
                format!("{field}.interval_secs"),
                "must not exceed timeout_secs",
            ));
        }
        Ok(())
    }
}

/// Bootstrap step injected into the Elasticsearch pods during Init.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapSettings {
    /// Init container name; also the readiness marker.
    pub container_name: String,
    /// Command run by the init container.
    pub command: Vec<String>,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            container_name: bootstrap::CONTAINER_NAME.to_string(),
            command: vec![
                bootstrap::SHELL.to_string(),
                "-c".to_string(),
                bootstrap::INSTALL_COMMAND.to_string(),
            ],
        }
    }
}

/// Plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    /// Readiness polling after the bootstrap mutation.
    pub readiness: PollSettings,
    /// Orchestrator-side Status polling.
    pub status_poll: PollSettings,
    /// User whose password is read from the auth secret.
    pub elastic_user: String,
    /// Bootstrap step injected during Init.
    pub bootstrap: BootstrapSettings,
    /// Timeout of a single Elasticsearch request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            readiness: PollSettings::from_policy(PollPolicy::new(
                defaults::READINESS_INTERVAL,
                defaults::READINESS_TIMEOUT,
            )),
            status_poll: PollSettings::from_policy(PollPolicy::new(
                defaults::STATUS_INTERVAL,
                defaults::STATUS_TIMEOUT,
            )),
            elastic_user: secrets::ELASTIC_USER.to_string(),
            bootstrap: BootstrapSettings::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl PluginConfig {
    /// Loads and validates a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parses and validates a YAML configuration document.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: PluginConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.readiness.validate("readiness")?;
        self.status_poll.validate("status_poll")?;
        if self.elastic_user.is_empty() {
            return Err(ConfigError::invalid("elastic_user", "must not be empty"));
        }
        if self.bootstrap.container_name.is_empty() {
            return Err(ConfigError::invalid(
                "bootstrap.container_name",
                "must not be empty",
            ));
        }
        if self.bootstrap.command.is_empty() {
            return Err(ConfigError::invalid("bootstrap.command", "must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "request_timeout_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Returns the timeout of a single Elasticsearch request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

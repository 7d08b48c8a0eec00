//! Error types shared by data-sync plugins.
//!
//! Plugin crates define their own error enums and wrap [`ParamError`] for
//! failures reading the orchestrator's parameter map.

use thiserror::Error;

/// Result type alias for parameter map lookups.
pub type ParamResult<T> = Result<T, ParamError>;

/// Errors raised while reading the orchestrator's parameter map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    /// A required key is absent (or empty) in the parameter map.
    #[error("Parameter '{key}' not found in the plugin parameters")]
    MissingKey {
        /// The missing key.
        key: String,
    },
}

impl ParamError {
    /// Creates a missing key error.
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::MissingKey { key: key.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_display() {
        let err = ParamError::missing_key("engineName");
        assert_eq!(
            err.to_string(),
            "Parameter 'engineName' not found in the plugin parameters"
        );
    }
}

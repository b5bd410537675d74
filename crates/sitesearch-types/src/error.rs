//! Error types shared across the sitesearch workspace.

use thiserror::Error;

/// Errors raised while building, validating or decoding tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task type requires a property that is absent
    #[error("Task {task} is missing required property '{key}'")]
    MissingProperty { task: String, key: String },

    /// JSON encoding/decoding failed (including unknown type tags)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config source could not be read or deserialized
    #[error("Configuration error: {0}")]
    Load(String),

    /// Values loaded but violate a constraint
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

//! Error types for vs-secrets-core

use thiserror::Error;

/// Result type alias using vs-secrets-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for vs-secrets
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration format
    #[error("Invalid configuration format: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Local state store could not be read or written
    #[error("State store error ({path}): {message}")]
    Store { path: String, message: String },

    /// Unknown repository type
    #[error("Unknown repository type: {name}. Valid repositories: github, azurekv")]
    InvalidRepository { name: String },

    /// Home directory could not be determined
    #[error("Could not determine home directory")]
    NoHomeDir,
}

impl Error {
    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid repository error
    pub fn invalid_repository(name: impl Into<String>) -> Self {
        Self::InvalidRepository { name: name.into() }
    }
}

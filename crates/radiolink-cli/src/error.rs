//! Error handling for the radiolink CLI

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Radio core error: {0}")]
    Core(#[from] radiolink_core::RadioError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] radiolink_runtime::RuntimeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scenario failed: {0}")]
    Scenario(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML writing error: {0}")]
    TomlWriting(#[from] toml::ser::Error),
}

impl CliError {
    pub fn scenario(message: impl Into<String>) -> Self {
        Self::Scenario(message.into())
    }
}

impl From<radiolink_core::ConfigError> for CliError {
    fn from(err: radiolink_core::ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Config(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

//! Monitor-specific error types

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("A monitored run is already in progress")]
    AlreadyRunning,

    #[error("Failed to spawn test runner '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Test runner process error: {message}")]
    ProcessError { message: String },

    #[error("Failed to signal process {pid}: {message}")]
    Signal { pid: u32, message: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl MonitorError {
    pub fn config(field: impl Into<String>) -> Self {
        Self::ConfigurationError { field: field.into() }
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::ProcessError { message: message.into() }
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;

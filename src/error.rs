//! Error types for graphbot
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in graphbot
#[derive(Debug, Error)]
pub enum GraphbotError {
    /// Invalid scheduling configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Scheduler is in the wrong state for the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// State file persistence error
    #[error("State store error: {0}")]
    StateStore(String),

    /// Channel client error that aborts a pipeline run
    #[error("Channel error: {0}")]
    Channel(String),

    /// Graph generator error
    #[error("Generator error: {0}")]
    Generator(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for graphbot operations
pub type Result<T> = std::result::Result<T, GraphbotError>;

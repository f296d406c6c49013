//! Error types for meshforge

use thiserror::Error;

/// The main error type for meshforge operations
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unsupported job type: {0}")]
    UnsupportedKind(String),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Job type is required to look up or stream a job (e.g. 'text-to-3d', 'image-to-3d')")]
    MissingKind,

    #[error("Stream error: {0}")]
    StreamPayload(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for meshforge operations
pub type Result<T> = std::result::Result<T, ForgeError>;

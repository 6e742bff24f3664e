//! Error types for volnas

use thiserror::Error;

/// Result type alias for volnas operations
pub type Result<T> = std::result::Result<T, VolnasError>;

/// Main error type for the operation catalog
#[derive(Error, Debug)]
pub enum VolnasError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unimplemented operation: {0}")]
    Unimplemented(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl VolnasError {
    /// Whether this error stems from a bad operation configuration
    pub fn is_config(&self) -> bool {
        matches!(self, VolnasError::ConfigError(_))
    }
}

impl From<serde_json::Error> for VolnasError {
    fn from(err: serde_json::Error) -> Self {
        VolnasError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for VolnasError {
    fn from(err: ndarray::ShapeError) -> Self {
        VolnasError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

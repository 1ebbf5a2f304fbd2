//! Error types shared by the flood exposure crates.

use thiserror::Error;

/// Result type alias using ExposureError.
pub type ExposureResult<T> = Result<T, ExposureError>;

/// Primary error type for storage and domain operations.
#[derive(Debug, Error)]
pub enum ExposureError {
    // === Input Errors ===
    #[error("Invalid ISO3 code: {0}")]
    InvalidIso3(String),

    #[error("Invalid admin level: {0}")]
    InvalidAdmLevel(String),

    #[error("Invalid date in '{input}': {message}")]
    InvalidDate { input: String, message: String },

    // === Data Errors ===
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Failed to read data: {0}")]
    DataReadError(String),

    // === Storage Errors ===
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // === Infrastructure Errors ===
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for ExposureError {
    fn from(err: std::io::Error) -> Self {
        ExposureError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for ExposureError {
    fn from(err: serde_json::Error) -> Self {
        ExposureError::DataReadError(format!("JSON error: {}", err))
    }
}

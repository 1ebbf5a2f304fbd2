//! Error types for the exposure crate.

use exposure_common::ExposureError;
use raster::RasterError;
use thiserror::Error;

/// Errors that abort a pipeline stage for a country or for the whole run.
///
/// Per-raster problems never surface here; they are recorded in the
/// [`BatchReport`](crate::BatchReport) instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Exposure(#[from] ExposureError),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error("Failed to parse boundaries {key}: {message}")]
    Boundaries { key: String, message: String },

    #[error("Invalid region {0}")]
    InvalidRegion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing input for {iso3}: {key}")]
    MissingInput { iso3: String, key: String },
}

impl PipelineError {
    /// Database failures abort the whole run rather than one country.
    pub fn is_database(&self) -> bool {
        matches!(self, PipelineError::Exposure(ExposureError::DatabaseError(_)))
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

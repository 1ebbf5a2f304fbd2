//! Error types for raster decoding and processing.

use exposure_common::GridSpec;
use thiserror::Error;

/// Errors that can occur while reading, writing or combining rasters.
#[derive(Error, Debug)]
pub enum RasterError {
    /// The TIFF container could not be decoded or encoded.
    #[error("tiff error: {0}")]
    Tiff(String),

    /// Pixel scale or tiepoint tags are missing or malformed.
    #[error("missing georeference: {0}")]
    MissingGeoreference(String),

    /// Sample type or layout that cannot be converted to f32.
    #[error("unsupported sample layout: {0}")]
    UnsupportedLayout(String),

    /// Decoded sample count does not match the image dimensions.
    #[error("expected {expected} samples, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// A raster does not share the grid of the stack it is added to.
    #[error("grid mismatch: expected {expected:?}, found {found:?}")]
    GridMismatch {
        expected: Box<GridSpec>,
        found: Box<GridSpec>,
    },

    /// GDAL metadata XML could not be parsed.
    #[error("invalid metadata: {0}")]
    Metadata(String),

    /// Requested band is not present.
    #[error("band {0} not present")]
    MissingBand(usize),
}

impl RasterError {
    pub fn grid_mismatch(expected: &GridSpec, found: &GridSpec) -> Self {
        Self::GridMismatch {
            expected: Box::new(*expected),
            found: Box::new(*found),
        }
    }
}

impl From<tiff::TiffError> for RasterError {
    fn from(err: tiff::TiffError) -> Self {
        Self::Tiff(err.to_string())
    }
}

impl From<quick_xml::Error> for RasterError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Metadata(err.to_string())
    }
}

impl From<std::io::Error> for RasterError {
    fn from(err: std::io::Error) -> Self {
        Self::Tiff(err.to_string())
    }
}

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;

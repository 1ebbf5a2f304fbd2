//! Pipeline configuration passed to every stage.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Default project prefix inside the project container.
pub const DEFAULT_PROJECT_PREFIX: &str = "ds-floodexposure-monitoring";

/// Default prefix of the raw daily flood extent rasters.
pub const DEFAULT_FLOODSCAN_PREFIX: &str = "floodscan/daily/v5/processed/";

/// Tunables shared by the exposure, statistics and climatology stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Prefix of every key written to the project container
    pub project_prefix: String,
    /// Prefix of raw flood extent rasters in the raster container
    pub floodscan_prefix: String,
    /// Flood fractions below this are treated as no data
    pub extent_threshold: f32,
    /// Rasters stacked per chunk
    pub batch_size: usize,
    /// Rows per upsert statement
    pub write_chunk_size: usize,
    /// Days in the climatology rolling window
    pub roll_window_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_prefix: DEFAULT_PROJECT_PREFIX.to_string(),
            floodscan_prefix: DEFAULT_FLOODSCAN_PREFIX.to_string(),
            extent_threshold: 0.05,
            batch_size: 100,
            write_chunk_size: 10_000,
            roll_window_days: 7,
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch_size must be > 0".to_string(),
            ));
        }
        if self.write_chunk_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "write_chunk_size must be > 0".to_string(),
            ));
        }
        if self.roll_window_days == 0 {
            return Err(PipelineError::InvalidConfig(
                "roll_window_days must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.extent_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "extent_threshold {} outside [0, 1]",
                self.extent_threshold
            )));
        }
        Ok(())
    }

    /// Override the batch size, keeping the rest.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

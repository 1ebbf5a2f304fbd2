//! In-memory raster types.

use exposure_common::GridSpec;

use crate::error::{RasterError, Result};

/// One band of samples in row-major order, NaN where there is no data.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    /// Band description from GDAL metadata, if any
    pub label: Option<String>,
    pub data: Vec<f32>,
}

/// A georeferenced raster with one or more bands on a single grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub grid: GridSpec,
    pub bands: Vec<Band>,
}

impl Raster {
    /// Build a single-band raster, checking the sample count against the grid.
    pub fn single(grid: GridSpec, data: Vec<f32>) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(RasterError::ShapeMismatch {
                expected: grid.len(),
                found: data.len(),
            });
        }
        Ok(Self {
            grid,
            bands: vec![Band { label: None, data }],
        })
    }

    /// Build a raster from labelled bands.
    pub fn with_bands(grid: GridSpec, bands: Vec<Band>) -> Result<Self> {
        if let Some(bad) = bands.iter().find(|b| b.data.len() != grid.len()) {
            return Err(RasterError::ShapeMismatch {
                expected: grid.len(),
                found: bad.data.len(),
            });
        }
        Ok(Self { grid, bands })
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Band labels in band order.
    pub fn labels(&self) -> Vec<Option<&str>> {
        self.bands.iter().map(|b| b.label.as_deref()).collect()
    }

    pub fn band(&self, index: usize) -> Result<&[f32]> {
        self.bands
            .get(index)
            .map(|b| b.data.as_slice())
            .ok_or(RasterError::MissingBand(index))
    }

    /// Consume the raster, keeping only one band.
    pub fn into_band(mut self, index: usize) -> Result<Vec<f32>> {
        if index >= self.bands.len() {
            return Err(RasterError::MissingBand(index));
        }
        Ok(self.bands.swap_remove(index).data)
    }

    /// Value at (col, row) of the first band.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.grid.width || row >= self.grid.height {
            return None;
        }
        self.bands
            .first()
            .map(|b| b.data[self.grid.flat_index(col, row)])
    }
}

//! Static per-country population grids.

use tracing::{info, instrument};

use exposure_common::{ExposureError, GridSpec, Iso3};
use raster::decode_geotiff;
use storage::{ObjectStorage, StoragePath};

use crate::error::{PipelineError, Result};

/// Population count per cell, NaN where the source had its fill value.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationGrid {
    pub grid: GridSpec,
    pub data: Vec<f32>,
}

impl PopulationGrid {
    /// Decode a population GeoTIFF, keeping its first band.
    pub fn from_geotiff(bytes: &[u8]) -> Result<Self> {
        let raster = decode_geotiff(bytes)?;
        let grid = raster.grid;
        let data = raster.into_band(0)?;
        Ok(Self { grid, data })
    }

    /// Load the population grid for a country. A missing grid is fatal for
    /// the country.
    #[instrument(skip(storage, paths), fields(iso3 = %iso3))]
    pub async fn load(storage: &ObjectStorage, paths: &StoragePath, iso3: &Iso3) -> Result<Self> {
        let key = paths.population(iso3);
        let bytes = storage.get(&key).await.map_err(|e| match e {
            ExposureError::NotFound(key) => PipelineError::MissingInput {
                iso3: iso3.to_string(),
                key,
            },
            other => other.into(),
        })?;

        let population = Self::from_geotiff(&bytes)?;
        info!(
            width = population.grid.width,
            height = population.grid.height,
            total = population.total(),
            "Loaded population grid"
        );
        Ok(population)
    }

    /// Total population, ignoring no-data cells.
    pub fn total(&self) -> f64 {
        self.data
            .iter()
            .filter(|v| !v.is_nan())
            .map(|&v| f64::from(v))
            .sum()
    }
}

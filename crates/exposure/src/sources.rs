//! Raw flood extent rasters in the raster container.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, instrument};

use exposure_common::GridSpec;
use raster::{decode_geotiff, select_flood_band};
use storage::ObjectStorage;

use crate::error::Result;
use crate::naming::{is_recent, is_tif, raw_date};

/// A raw flood extent blob and the date parsed from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlob {
    pub key: String,
    pub date: Option<NaiveDate>,
}

/// What was found when opening a raw raster.
#[derive(Debug)]
pub enum ExtentRead {
    /// The flood extent band on its grid
    Extent { grid: GridSpec, data: Vec<f32> },
    /// Labels that matched no known band layout
    UnrecognizedBands(Vec<Option<String>>),
}

/// Lists and opens daily flood extent rasters.
pub struct RasterSource {
    storage: Arc<ObjectStorage>,
    prefix: String,
}

impl RasterSource {
    pub fn new(storage: Arc<ObjectStorage>, prefix: &str) -> Self {
        Self {
            storage,
            prefix: prefix.to_string(),
        }
    }

    /// `.tif` blobs under the prefix, restricted to `recent_year` when set.
    #[instrument(skip(self), fields(prefix = %self.prefix))]
    pub async fn list(&self, recent_year: Option<i32>) -> Result<Vec<RawBlob>> {
        let keys = self.storage.list(&self.prefix).await?;
        let blobs: Vec<RawBlob> = keys
            .into_iter()
            .filter(|key| is_tif(key))
            .filter(|key| recent_year.map_or(true, |year| is_recent(key, year)))
            .map(|key| RawBlob {
                date: raw_date(&key),
                key,
            })
            .collect();

        debug!(count = blobs.len(), "Listed raw flood extent blobs");
        Ok(blobs)
    }

    /// Read a blob and pick its flood extent band.
    pub async fn open(&self, key: &str) -> Result<ExtentRead> {
        let bytes = self.storage.get(key).await?;
        let raster = decode_geotiff(&bytes)?;

        let labels = raster.labels();
        let Some(index) = select_flood_band(&labels) else {
            let labels = labels.iter().map(|l| l.map(str::to_string)).collect();
            return Ok(ExtentRead::UnrecognizedBands(labels));
        };

        let grid = raster.grid;
        let data = raster.into_band(index)?;
        Ok(ExtentRead::Extent { grid, data })
    }
}

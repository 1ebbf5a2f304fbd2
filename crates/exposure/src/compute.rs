//! Population-weighted flood exposure rasters.
//!
//! Per date: flood fractions below the threshold become no-data, the result
//! is resampled (nearest neighbour) onto the population grid, then
//! multiplied by population. No-data in either input stays no-data.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use ndarray::ArrayView2;
use tracing::{debug, info, instrument};

use exposure_common::{GridSpec, Iso3};
use raster::{encode_geotiff, layer_to_vec, RasterError, RasterStack, RasterStackBuilder, ResamplePlan};
use storage::{ObjectStorage, StoragePath};

use crate::batch::{BatchPlan, READ_CONCURRENCY};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::naming::exposure_date;
use crate::population::PopulationGrid;
use crate::report::{BatchReport, SkipReason};
use crate::sources::{ExtentRead, RasterSource};

/// Replace values below `threshold` with NaN.
pub fn mask_below(values: &[f32], threshold: f32) -> Vec<f32> {
    values
        .iter()
        .map(|&v| if v >= threshold { v } else { f32::NAN })
        .collect()
}

/// Exposure stack on the population grid for a stack of flood fractions.
///
/// `plan` must map the extent grid onto the population grid.
pub fn compute_exposure(
    extent: &RasterStack,
    population: &PopulationGrid,
    plan: &ResamplePlan,
    threshold: f32,
) -> Result<RasterStack> {
    if !plan.matches(extent.grid(), &population.grid) {
        return Err(RasterError::grid_mismatch(plan.source(), extent.grid()).into());
    }

    let stack = extent.map_layers(population.grid, |layer| {
        let masked = mask_below(&layer_to_vec(layer), threshold);
        plan.apply(&masked)
            .into_iter()
            .zip(&population.data)
            .map(|(fraction, people)| fraction * people)
            .collect()
    })?;
    Ok(stack)
}

/// Options for one exposure run.
#[derive(Debug, Clone, Default)]
pub struct ExposureOptions {
    /// Recompute dates that already have an exposure raster
    pub clobber: bool,
    /// Only consider raw rasters from this year
    pub recent_year: Option<i32>,
}

/// Produces one exposure raster per raw flood extent date.
pub struct ExposureEngine {
    source: RasterSource,
    project: Arc<ObjectStorage>,
    paths: StoragePath,
    config: PipelineConfig,
}

impl ExposureEngine {
    pub fn new(raw: Arc<ObjectStorage>, project: Arc<ObjectStorage>, config: PipelineConfig) -> Self {
        Self {
            source: RasterSource::new(raw, &config.floodscan_prefix),
            paths: StoragePath::new(&config.project_prefix),
            project,
            config,
        }
    }

    /// Dates that already have an exposure raster for the country.
    pub async fn existing_dates(&self, iso3: &Iso3) -> Result<BTreeSet<NaiveDate>> {
        let keys = self.project.list(&self.paths.exposure_dir(iso3)).await?;
        Ok(keys.iter().filter_map(|key| exposure_date(iso3, key)).collect())
    }

    /// Compute and store exposure rasters for every candidate date.
    ///
    /// A missing population grid aborts the country. Unreadable rasters are
    /// recorded in the report and left for the next run.
    #[instrument(skip(self, options), fields(iso3 = %iso3, clobber = options.clobber))]
    pub async fn run(&self, iso3: &Iso3, options: &ExposureOptions) -> Result<BatchReport> {
        let mut report = BatchReport::new("exposure", iso3.as_str());
        let population = PopulationGrid::load(&self.project, &self.paths, iso3).await?;

        let existing = if options.clobber {
            BTreeSet::new()
        } else {
            self.existing_dates(iso3).await?
        };

        let mut candidates = Vec::new();
        for blob in self.source.list(options.recent_year).await? {
            match blob.date {
                None => report.skipped(blob.key, None, SkipReason::UnparseableName),
                Some(date) if existing.contains(&date) => {
                    report.skipped(blob.key, Some(date), SkipReason::AlreadyProcessed)
                }
                Some(date) => candidates.push((blob.key, date)),
            }
        }
        info!(
            candidates = candidates.len(),
            existing = existing.len(),
            "Computing exposure rasters"
        );

        let plan = BatchPlan::new(candidates, self.config.batch_size);
        let mut resample: Option<ResamplePlan> = None;

        for batch in plan.batches() {
            debug!(
                batch = batch.index + 1,
                total = batch.total,
                size = batch.items.len(),
                "Processing batch"
            );

            let reads: Vec<_> = stream::iter(batch.items)
                .map(|(key, _)| self.source.open(key))
                .buffered(READ_CONCURRENCY)
                .collect()
                .await;

            let mut builder = RasterStackBuilder::new();
            let mut stacked = Vec::new();
            for ((key, date), read) in batch.items.iter().zip(reads) {
                match read {
                    Err(e) => report.failed(key.as_str(), Some(*date), e),
                    Ok(ExtentRead::UnrecognizedBands(labels)) => {
                        debug!(blob = %key, ?labels, "Band labels");
                        report.skipped(key.as_str(), Some(*date), SkipReason::UnrecognizedBands)
                    }
                    Ok(ExtentRead::Extent { grid, data }) => match builder.push(*date, grid, data) {
                        Ok(()) => stacked.push(key.as_str()),
                        Err(e) => report.failed(key.as_str(), Some(*date), e),
                    },
                }
            }
            if builder.is_empty() {
                continue;
            }

            let extent = builder.build();
            let plan = match resample.take() {
                Some(plan) if plan.matches(extent.grid(), &population.grid) => plan,
                _ => ResamplePlan::nearest(extent.grid(), &population.grid),
            };
            let exposure = compute_exposure(&extent, &population, &plan, self.config.extent_threshold)?;
            resample = Some(plan);

            for (key, (date, layer)) in stacked.into_iter().zip(exposure.layers()) {
                match self.write(iso3, date, exposure.grid(), layer).await {
                    Ok(()) => report.processed(key, date),
                    Err(e) => report.failed(key, Some(date), e),
                }
            }
        }

        report.log_summary();
        Ok(report)
    }

    async fn write(
        &self,
        iso3: &Iso3,
        date: NaiveDate,
        grid: &GridSpec,
        layer: ArrayView2<'_, f32>,
    ) -> Result<()> {
        let bytes = encode_geotiff(grid, &layer_to_vec(layer), None)?;
        let key = self.paths.exposure_raster(iso3, date);
        self.project.put(&key, Bytes::from(bytes)).await?;
        Ok(())
    }
}

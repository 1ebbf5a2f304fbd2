//! Zonal sums of exposure rasters over administrative boundaries.
//!
//! Level-2 sums come from the rasters; level-1 and level-0 sums are the
//! integer sums of their level-2 children, so the hierarchy adds up exactly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument};

use exposure_common::{AdmLevel, ExposureStat, GridSpec, Iso3, StatsTable};
use raster::{decode_geotiff, CellMask, Raster, RasterError, RasterStack, RasterStackBuilder};
use storage::{ObjectStorage, StatsStore, StoragePath};

use crate::batch::{BatchPlan, READ_CONCURRENCY};
use crate::boundaries::{load_boundaries, AdminBoundary, MAX_ADMIN_LEVEL};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::naming::{exposure_date, is_tif};
use crate::report::{BatchReport, SkipReason};

/// A level-2 unit, its parents and the cells it covers.
#[derive(Debug, Clone)]
pub struct Zone {
    pub adm0: String,
    pub adm1: String,
    pub adm2: String,
    pub mask: CellMask,
}

/// Cell masks for every level-2 boundary of a country on one grid.
///
/// Built once per grid and reused for every chunk.
#[derive(Debug, Clone)]
pub struct ZonalIndex {
    grid: GridSpec,
    zones: Vec<Zone>,
}

impl ZonalIndex {
    pub fn build(grid: &GridSpec, boundaries: &[AdminBoundary]) -> Result<Self> {
        let mut zones = Vec::with_capacity(boundaries.len());
        for boundary in boundaries {
            let (Some(adm0), Some(adm1), Some(adm2)) = (
                boundary.pcode_at(0),
                boundary.pcode_at(1),
                boundary.pcode_at(MAX_ADMIN_LEVEL),
            ) else {
                return Err(PipelineError::Boundaries {
                    key: boundary.pcode().to_string(),
                    message: format!("expected a level-2 boundary, found level {}", boundary.level),
                });
            };

            let mask = CellMask::for_polygon(grid, &boundary.geometry);
            if mask.is_empty() {
                debug!(pcode = adm2, "Boundary covers no cell centres");
            }
            zones.push(Zone {
                adm0: adm0.to_string(),
                adm1: adm1.to_string(),
                adm2: adm2.to_string(),
                mask,
            });
        }

        Ok(Self { grid: *grid, zones })
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn matches(&self, grid: &GridSpec) -> bool {
        self.grid.is_aligned_with(grid)
    }
}

fn stat(iso3: &str, pcode: &str, adm_level: AdmLevel, valid_date: NaiveDate, sum: i64) -> ExposureStat {
    ExposureStat {
        iso3: iso3.to_string(),
        pcode: pcode.to_string(),
        adm_level,
        valid_date,
        sum,
    }
}

/// Rows for levels 0, 1 and 2 for every date of the stack.
///
/// A zone's sum skips no-data cells and is truncated toward zero; a zone
/// with no cells sums to 0.
pub fn aggregate_stack(iso3: &Iso3, stack: &RasterStack, index: &ZonalIndex) -> Result<Vec<ExposureStat>> {
    if stack.is_empty() {
        return Ok(Vec::new());
    }
    if !index.matches(stack.grid()) {
        return Err(RasterError::grid_mismatch(index.grid(), stack.grid()).into());
    }

    let iso3 = iso3.upper();
    let mut rows = Vec::new();

    for (date, layer) in stack.layers() {
        let mut adm2: BTreeMap<&str, i64> = BTreeMap::new();
        let mut adm1: BTreeMap<&str, i64> = BTreeMap::new();
        let mut adm0: BTreeMap<&str, i64> = BTreeMap::new();

        for zone in index.zones() {
            let sum = zone.mask.sum(layer).trunc() as i64;
            *adm2.entry(&zone.adm2).or_default() += sum;
            *adm1.entry(&zone.adm1).or_default() += sum;
            *adm0.entry(&zone.adm0).or_default() += sum;
        }

        for (level, sums) in [
            (AdmLevel::Country, adm0),
            (AdmLevel::Province, adm1),
            (AdmLevel::District, adm2),
        ] {
            rows.extend(
                sums.into_iter()
                    .map(|(pcode, sum)| stat(&iso3, pcode, level, date, sum)),
            );
        }
    }

    Ok(rows)
}

/// Writes admin-level exposure statistics for dates with exposure rasters.
pub struct BoundaryAggregator {
    project: Arc<ObjectStorage>,
    store: Arc<dyn StatsStore>,
    paths: StoragePath,
    config: PipelineConfig,
}

impl BoundaryAggregator {
    pub fn new(project: Arc<ObjectStorage>, store: Arc<dyn StatsStore>, config: PipelineConfig) -> Self {
        Self {
            project,
            store,
            paths: StoragePath::new(&config.project_prefix),
            config,
        }
    }

    async fn read(&self, key: &str) -> Result<Raster> {
        let bytes = self.project.get(key).await?;
        Ok(decode_geotiff(&bytes)?)
    }

    /// Aggregate exposure rasters not yet in the statistics table.
    ///
    /// Each chunk is upserted before the next is read. Database errors abort
    /// the run; unreadable rasters are recorded and produce no rows.
    #[instrument(skip(self), fields(iso3 = %iso3))]
    pub async fn run(&self, iso3: &Iso3, clobber: bool) -> Result<BatchReport> {
        let mut report = BatchReport::new("raster-stats", iso3.as_str());
        let boundaries = load_boundaries(&self.project, &self.paths, iso3, MAX_ADMIN_LEVEL).await?;

        let existing = if clobber {
            BTreeSet::new()
        } else {
            self.store.existing_dates(iso3).await?
        };

        let mut candidates = Vec::new();
        for key in self.project.list(&self.paths.exposure_dir(iso3)).await? {
            if !is_tif(&key) {
                continue;
            }
            match exposure_date(iso3, &key) {
                None => report.skipped(key, None, SkipReason::UnparseableName),
                Some(date) if existing.contains(&date) => {
                    report.skipped(key, Some(date), SkipReason::AlreadyProcessed)
                }
                Some(date) => candidates.push((key, date)),
            }
        }
        info!(
            candidates = candidates.len(),
            existing = existing.len(),
            boundaries = boundaries.len(),
            "Aggregating exposure rasters"
        );

        let plan = BatchPlan::new(candidates, self.config.batch_size);
        let mut zonal: Option<ZonalIndex> = None;

        for batch in plan.batches() {
            debug!(
                batch = batch.index + 1,
                total = batch.total,
                size = batch.items.len(),
                "Processing batch"
            );

            let reads: Vec<_> = stream::iter(batch.items)
                .map(|(key, _)| self.read(key))
                .buffered(READ_CONCURRENCY)
                .collect()
                .await;

            let mut builder = RasterStackBuilder::new();
            let mut stacked = Vec::new();
            for ((key, date), read) in batch.items.iter().zip(reads) {
                let pushed = read.and_then(|raster| {
                    let grid = raster.grid;
                    let data = raster.into_band(0)?;
                    Ok(builder.push(*date, grid, data)?)
                });
                match pushed {
                    Ok(()) => stacked.push((key.as_str(), *date)),
                    Err(e) => report.failed(key.as_str(), Some(*date), e),
                }
            }
            if builder.is_empty() {
                continue;
            }

            let stack = builder.build();
            if !zonal.as_ref().is_some_and(|z| z.matches(stack.grid())) {
                zonal = Some(ZonalIndex::build(stack.grid(), &boundaries)?);
            }
            let Some(index) = zonal.as_ref() else {
                continue;
            };

            let rows = aggregate_stack(iso3, &stack, index)?;
            let written = self.store.upsert_stats(StatsTable::Admin, &rows).await?;
            report.add_rows_written(written);
            for (key, date) in stacked {
                report.processed(key, date);
            }
        }

        report.log_summary();
        Ok(report)
    }
}

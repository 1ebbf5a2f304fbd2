//! Population-weighted flood exposure.
//!
//! # Stages
//!
//! - [`ExposureEngine`]: daily flood extent × population rasters
//! - [`BoundaryAggregator`]: zonal sums for admin levels 0-2
//! - [`RegionAggregator`]: sums of level-1 rows for named regions
//! - [`ClimatologyRunner`]: quantile and tercile snapshots
//! - [`refresh_admin_lookup`] and [`export_geojson`]: name lookup and
//!   boundary exports
//!
//! Every stage takes its collaborators and a [`PipelineConfig`] at
//! construction and processes one country at a time in fixed-size date
//! batches. Per-date problems are collected in a [`BatchReport`].

pub mod aggregate;
pub mod batch;
pub mod boundaries;
pub mod climatology;
pub mod compute;
pub mod config;
pub mod error;
pub mod init;
pub mod lookup;
pub mod naming;
pub mod population;
pub mod regions;
pub mod report;
pub mod sources;

pub use aggregate::{aggregate_stack, BoundaryAggregator, ZonalIndex};
pub use batch::{Batch, BatchPlan};
pub use boundaries::{load_boundaries, parse_boundaries, AdminBoundary};
pub use climatology::{
    assign_quantile, assign_tercile, compute_snapshot, default_target_date, percentile,
    ClimatologyRunner, SnapshotOutcome,
};
pub use compute::{compute_exposure, mask_below, ExposureEngine, ExposureOptions};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use init::verify_inputs;
pub use lookup::{admin_lookup_rows, export_geojson, refresh_admin_lookup};
pub use population::PopulationGrid;
pub use regions::{aggregate_region, default_regions, RegionAggregator, RegionDefinition};
pub use report::{BatchReport, ItemOutcome, ItemReport, SkipReason};
pub use sources::{ExtentRead, RasterSource, RawBlob};

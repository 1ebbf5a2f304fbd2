//! Common types and utilities shared across the flood exposure crates.

pub mod admin;
pub mod error;
pub mod grid;
pub mod stats;
pub mod time;

pub use admin::{AdmLevel, Iso3};
pub use error::{ExposureError, ExposureResult};
pub use grid::GridSpec;
pub use stats::{
    AdminLookupRow, ClimatologyRow, ExposureStat, RollingAverage, SnapshotKind, StatsTable,
};
pub use time::{parse_iso_date, DateWindow};

//! Row types persisted to the statistics tables.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::AdmLevel;

/// Total population-weighted flood exposure for one boundary on one date.
///
/// Unique per (`pcode`, `valid_date`) within a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureStat {
    /// Upper-case ISO3 code
    pub iso3: String,
    pub pcode: String,
    pub adm_level: AdmLevel,
    pub valid_date: NaiveDate,
    pub sum: i64,
}

impl ExposureStat {
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.pcode, self.valid_date)
    }
}

/// Target table for exposure statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsTable {
    /// `floodscan_exposure`, admin levels 0-2
    Admin,
    /// `floodscan_exposure_regions`
    Regions,
}

impl StatsTable {
    pub fn name(&self) -> &'static str {
        match self {
            StatsTable::Admin => "floodscan_exposure",
            StatsTable::Regions => "floodscan_exposure_regions",
        }
    }
}

/// Trailing-window mean of daily sums anchored on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingAverage {
    pub pcode: String,
    /// Text form of the admin level ("0".."2" or "region")
    pub adm_level: String,
    pub valid_date: NaiveDate,
    pub rolling_avg: f64,
}

/// Kind of climatology snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Quantile,
    Tercile,
}

impl SnapshotKind {
    /// Column holding the category code.
    pub fn column(&self) -> &'static str {
        match self {
            SnapshotKind::Quantile => "quantile",
            SnapshotKind::Tercile => "tercile",
        }
    }

    /// Snapshot table for a source statistics table.
    pub fn table(&self, source: StatsTable) -> &'static str {
        match (self, source) {
            (SnapshotKind::Quantile, StatsTable::Admin) => "current_quantile",
            (SnapshotKind::Quantile, StatsTable::Regions) => "current_quantile_regions",
            (SnapshotKind::Tercile, StatsTable::Admin) => "current_tercile",
            (SnapshotKind::Tercile, StatsTable::Regions) => "current_tercile_regions",
        }
    }
}

/// One categorised rolling average written to a snapshot table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimatologyRow {
    pub pcode: String,
    pub adm_level: String,
    pub valid_date: NaiveDate,
    pub rolling_avg: f64,
    pub category: i16,
}

/// Human-readable names for one level-2 unit and its parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminLookupRow {
    pub iso3: String,
    pub adm0_pcode: String,
    pub adm0_name: String,
    pub adm1_pcode: String,
    pub adm1_name: String,
    pub adm2_pcode: String,
    pub adm2_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tables() {
        assert_eq!(SnapshotKind::Quantile.table(StatsTable::Admin), "current_quantile");
        assert_eq!(
            SnapshotKind::Tercile.table(StatsTable::Regions),
            "current_tercile_regions"
        );
        assert_eq!(SnapshotKind::Tercile.column(), "tercile");
    }
}

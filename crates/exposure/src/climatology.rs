//! Rolling-window climatology snapshots.
//!
//! Every stored series row on the target's month/day gets a trailing
//! rolling average. Each pcode's averages across all years set its
//! percentile breaks, and the target-date average is categorised against
//! them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use tracing::{info, instrument};

use exposure_common::{ClimatologyRow, RollingAverage, SnapshotKind, StatsTable};
use storage::StatsStore;

use crate::error::Result;

/// Quintile breaks.
pub const QUANTILE_PERCENTILES: [f64; 4] = [20.0, 40.0, 60.0, 80.0];

/// Tercile breaks.
pub const TERCILE_PERCENTILES: [f64; 2] = [33.33, 66.67];

/// Percentile of sorted values with linear interpolation between the
/// closest ranks.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p / 100.0).clamp(0.0, 1.0) * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// `-2` .. `2`. The middle class includes its upper break.
pub fn assign_quantile(value: f64, breaks: &[f64; 4]) -> i16 {
    if value < breaks[0] {
        -2
    } else if value < breaks[1] {
        -1
    } else if value <= breaks[2] {
        0
    } else if value < breaks[3] {
        1
    } else {
        2
    }
}

/// `-1` .. `1`. The middle class includes its upper break.
pub fn assign_tercile(value: f64, breaks: &[f64; 2]) -> i16 {
    if value < breaks[0] {
        -1
    } else if value <= breaks[1] {
        0
    } else {
        1
    }
}

fn categorize(kind: SnapshotKind, value: f64, sorted: &[f64]) -> Option<i16> {
    match kind {
        SnapshotKind::Quantile => {
            let mut breaks = [0.0; 4];
            for (b, p) in breaks.iter_mut().zip(QUANTILE_PERCENTILES) {
                *b = percentile(sorted, p)?;
            }
            Some(assign_quantile(value, &breaks))
        }
        SnapshotKind::Tercile => {
            let mut breaks = [0.0; 2];
            for (b, p) in breaks.iter_mut().zip(TERCILE_PERCENTILES) {
                *b = percentile(sorted, p)?;
            }
            Some(assign_tercile(value, &breaks))
        }
    }
}

/// Categorised rows for `target`, one per pcode that has an average on it.
pub fn compute_snapshot(
    kind: SnapshotKind,
    averages: &[RollingAverage],
    target: NaiveDate,
) -> Vec<ClimatologyRow> {
    let mut series: HashMap<&str, Vec<f64>> = HashMap::new();
    for avg in averages {
        series.entry(&avg.pcode).or_default().push(avg.rolling_avg);
    }
    for values in series.values_mut() {
        values.sort_by(f64::total_cmp);
    }

    averages
        .iter()
        .filter(|avg| avg.valid_date == target)
        .filter_map(|avg| {
            let sorted = series.get(avg.pcode.as_str())?;
            Some(ClimatologyRow {
                pcode: avg.pcode.clone(),
                adm_level: avg.adm_level.clone(),
                valid_date: avg.valid_date,
                rolling_avg: avg.rolling_avg,
                category: categorize(kind, avg.rolling_avg, sorted)?,
            })
        })
        .collect()
}

/// Default target: yesterday for quantiles, two days ago for terciles.
pub fn default_target_date(kind: SnapshotKind, today: NaiveDate) -> NaiveDate {
    match kind {
        SnapshotKind::Quantile => today - Duration::days(1),
        SnapshotKind::Tercile => today - Duration::days(2),
    }
}

/// Result of a snapshot run.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOutcome {
    /// Every snapshot table was replaced
    Written(Vec<(&'static str, u64)>),
    /// A source had nothing for the target date; later sources were not
    /// processed and earlier tables stay written
    NoData {
        source: &'static str,
        written: Vec<(&'static str, u64)>,
    },
}

/// Replaces the quantile or tercile snapshot tables.
pub struct ClimatologyRunner {
    store: Arc<dyn StatsStore>,
    window_days: u32,
}

impl ClimatologyRunner {
    pub fn new(store: Arc<dyn StatsStore>, window_days: u32) -> Self {
        Self { store, window_days }
    }

    /// Admin table first, then regions. Stops at the first source with no
    /// rows for the target date.
    #[instrument(skip(self), fields(window_days = self.window_days))]
    pub async fn run(&self, kind: SnapshotKind, target: NaiveDate) -> Result<SnapshotOutcome> {
        let mut written = Vec::new();

        for source in [StatsTable::Admin, StatsTable::Regions] {
            let averages = self
                .store
                .rolling_averages(source, target.month(), target.day(), self.window_days)
                .await?;
            let rows = compute_snapshot(kind, &averages, target);

            if rows.is_empty() {
                info!(
                    source = source.name(),
                    date = %target,
                    averages = averages.len(),
                    "No data for target date"
                );
                return Ok(SnapshotOutcome::NoData {
                    source: source.name(),
                    written,
                });
            }

            let table = kind.table(source);
            let count = self.store.replace_snapshot(kind, source, &rows).await?;
            info!(table, rows = count, column = kind.column(), "Snapshot replaced");
            written.push((table, count));
        }

        Ok(SnapshotOutcome::Written(written))
    }
}

//! In-process statistics store.
//!
//! Mirrors the table semantics of [`PgStatsStore`](crate::PgStatsStore) for
//! dry runs and tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};

use exposure_common::{
    AdminLookupRow, ClimatologyRow, DateWindow, ExposureError, ExposureResult, ExposureStat, Iso3,
    RollingAverage, SnapshotKind, StatsTable,
};

use crate::stats_db::{dedupe_last_wins, StatsStore};

type TableRows = BTreeMap<(String, NaiveDate), ExposureStat>;

#[derive(Default)]
struct Tables {
    stats: HashMap<StatsTable, TableRows>,
    snapshots: HashMap<&'static str, Vec<ClimatologyRow>>,
    admin_lookup: Vec<AdminLookupRow>,
    upsert_calls: usize,
}

/// [`StatsStore`] kept in memory behind a mutex.
#[derive(Default)]
pub struct MemoryStatsStore {
    tables: Mutex<Tables>,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> ExposureResult<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| ExposureError::InternalError("stats store lock poisoned".to_string()))
    }

    /// Every row of a table ordered by (pcode, valid_date).
    pub fn rows(&self, table: StatsTable) -> ExposureResult<Vec<ExposureStat>> {
        Ok(self
            .lock()?
            .stats
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Current contents of a snapshot table.
    pub fn snapshot(&self, kind: SnapshotKind, source: StatsTable) -> ExposureResult<Vec<ClimatologyRow>> {
        Ok(self
            .lock()?
            .snapshots
            .get(kind.table(source))
            .cloned()
            .unwrap_or_default())
    }

    pub fn admin_lookup(&self) -> ExposureResult<Vec<AdminLookupRow>> {
        Ok(self.lock()?.admin_lookup.clone())
    }

    /// Number of `upsert_stats` calls that carried at least one row.
    pub fn upsert_calls(&self) -> usize {
        self.lock().map(|t| t.upsert_calls).unwrap_or(0)
    }
}

#[async_trait]
impl StatsStore for MemoryStatsStore {
    async fn existing_dates(&self, iso3: &Iso3) -> ExposureResult<BTreeSet<NaiveDate>> {
        let upper = iso3.upper();
        let tables = self.lock()?;

        Ok(tables
            .stats
            .get(&StatsTable::Admin)
            .map(|rows| {
                rows.values()
                    .filter(|row| row.iso3 == upper)
                    .map(|row| row.valid_date)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_stats(&self, table: StatsTable, rows: &[ExposureStat]) -> ExposureResult<u64> {
        let rows = dedupe_last_wins(rows);
        let mut tables = self.lock()?;
        if !rows.is_empty() {
            tables.upsert_calls += 1;
        }

        let target = tables.stats.entry(table).or_default();
        for row in &rows {
            target.insert((row.pcode.clone(), row.valid_date), row.clone());
        }

        Ok(rows.len() as u64)
    }

    async fn stats_for_pcodes(
        &self,
        table: StatsTable,
        pcodes: &[String],
    ) -> ExposureResult<Vec<ExposureStat>> {
        let wanted: BTreeSet<&str> = pcodes.iter().map(String::as_str).collect();
        let tables = self.lock()?;

        Ok(tables
            .stats
            .get(&table)
            .map(|rows| {
                rows.values()
                    .filter(|row| wanted.contains(row.pcode.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn rolling_averages(
        &self,
        table: StatsTable,
        month: u32,
        day: u32,
        window_days: u32,
    ) -> ExposureResult<Vec<RollingAverage>> {
        let tables = self.lock()?;
        let Some(rows) = tables.stats.get(&table) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for target in rows
            .values()
            .filter(|row| row.valid_date.month() == month && row.valid_date.day() == day)
        {
            let window = DateWindow::new(target.valid_date, window_days);
            let sums: Vec<f64> = rows
                .range((target.pcode.clone(), window.start())..=(target.pcode.clone(), window.end))
                .map(|(_, row)| row.sum as f64)
                .collect();

            out.push(RollingAverage {
                pcode: target.pcode.clone(),
                adm_level: target.adm_level.to_string(),
                valid_date: target.valid_date,
                rolling_avg: sums.iter().sum::<f64>() / sums.len() as f64,
            });
        }

        Ok(out)
    }

    async fn replace_snapshot(
        &self,
        kind: SnapshotKind,
        source: StatsTable,
        rows: &[ClimatologyRow],
    ) -> ExposureResult<u64> {
        self.lock()?
            .snapshots
            .insert(kind.table(source), rows.to_vec());
        Ok(rows.len() as u64)
    }

    async fn replace_admin_lookup(&self, rows: &[AdminLookupRow]) -> ExposureResult<u64> {
        self.lock()?.admin_lookup = rows.to_vec();
        Ok(rows.len() as u64)
    }
}

//! Exposure statistics tables in PostgreSQL.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

use exposure_common::{
    AdminLookupRow, ClimatologyRow, ExposureError, ExposureResult, ExposureStat, Iso3,
    RollingAverage, SnapshotKind, StatsTable,
};

/// Schema holding every table this crate touches.
pub const SCHEMA: &str = "app";

/// Postgres caps bind parameters per statement at u16::MAX.
const MAX_BIND_PARAMS: usize = 65_535;

/// Persistence for exposure rows, climatology snapshots and the admin lookup.
///
/// Writes are upserts keyed by (`pcode`, `valid_date`); replaying a write
/// never duplicates a row.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Distinct dates already stored in the admin table for a country.
    async fn existing_dates(&self, iso3: &Iso3) -> ExposureResult<BTreeSet<NaiveDate>>;

    /// Insert or overwrite rows. Returns the number of rows written.
    async fn upsert_stats(&self, table: StatsTable, rows: &[ExposureStat]) -> ExposureResult<u64>;

    /// All rows whose pcode is in `pcodes`, ordered by pcode then date.
    async fn stats_for_pcodes(
        &self,
        table: StatsTable,
        pcodes: &[String],
    ) -> ExposureResult<Vec<ExposureStat>>;

    /// Trailing `window_days` mean for every row falling on `month`/`day`.
    async fn rolling_averages(
        &self,
        table: StatsTable,
        month: u32,
        day: u32,
        window_days: u32,
    ) -> ExposureResult<Vec<RollingAverage>>;

    /// Replace the contents of a snapshot table.
    async fn replace_snapshot(
        &self,
        kind: SnapshotKind,
        source: StatsTable,
        rows: &[ClimatologyRow],
    ) -> ExposureResult<u64>;

    /// Replace the contents of the `admin_lookup` table.
    async fn replace_admin_lookup(&self, rows: &[AdminLookupRow]) -> ExposureResult<u64>;
}

/// Collapse rows sharing a (pcode, valid_date) key, keeping the last one.
///
/// Postgres rejects an `ON CONFLICT DO UPDATE` statement that touches the
/// same key twice, so every write path goes through this first.
pub fn dedupe_last_wins(rows: &[ExposureStat]) -> Vec<ExposureStat> {
    let mut position: HashMap<(&str, NaiveDate), usize> = HashMap::new();
    let mut out: Vec<ExposureStat> = Vec::with_capacity(rows.len());

    for row in rows {
        match position.get(&row.key()) {
            Some(&idx) => out[idx] = row.clone(),
            None => {
                position.insert(row.key(), out.len());
                out.push(row.clone());
            }
        }
    }

    out
}

fn db_err(context: &str) -> impl Fn(sqlx::Error) -> ExposureError + '_ {
    move |e| ExposureError::DatabaseError(format!("{} failed: {}", context, e))
}

/// Rows per statement, bounded by the bind parameter limit.
fn rows_per_statement(chunk_size: usize, columns: usize) -> usize {
    chunk_size.clamp(1, MAX_BIND_PARAMS / columns)
}

#[derive(Debug, FromRow)]
struct StatRow {
    iso3: String,
    pcode: String,
    adm_level: String,
    valid_date: NaiveDate,
    sum: i64,
}

impl TryFrom<StatRow> for ExposureStat {
    type Error = ExposureError;

    fn try_from(row: StatRow) -> Result<Self, Self::Error> {
        Ok(ExposureStat {
            iso3: row.iso3,
            pcode: row.pcode,
            adm_level: row.adm_level.parse()?,
            valid_date: row.valid_date,
            sum: row.sum,
        })
    }
}

#[derive(Debug, FromRow)]
struct RollingRow {
    pcode: String,
    adm_level: String,
    valid_date: NaiveDate,
    rolling_avg: f64,
}

/// Postgres-backed [`StatsStore`].
pub struct PgStatsStore {
    pool: PgPool,
    write_chunk_size: usize,
}

impl PgStatsStore {
    /// Connect to the database and size upsert statements to `write_chunk_size` rows.
    pub async fn connect(database_url: &str, write_chunk_size: usize) -> ExposureResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| ExposureError::DatabaseError(format!("Connection failed: {}", e)))?;

        Ok(Self {
            pool,
            write_chunk_size,
        })
    }
}

#[async_trait]
impl StatsStore for PgStatsStore {
    async fn existing_dates(&self, iso3: &Iso3) -> ExposureResult<BTreeSet<NaiveDate>> {
        let dates = sqlx::query_scalar::<_, NaiveDate>(&format!(
            "SELECT DISTINCT valid_date FROM {}.{} WHERE iso3 = $1",
            SCHEMA,
            StatsTable::Admin.name()
        ))
        .bind(iso3.upper())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Query"))?;

        Ok(dates.into_iter().collect())
    }

    #[instrument(skip(self, rows), fields(table = table.name(), rows = rows.len()))]
    async fn upsert_stats(&self, table: StatsTable, rows: &[ExposureStat]) -> ExposureResult<u64> {
        let rows = dedupe_last_wins(rows);
        let mut written = 0u64;

        for chunk in rows.chunks(rows_per_statement(self.write_chunk_size, 5)) {
            let mut tx = self.pool.begin().await.map_err(db_err("Begin"))?;

            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {}.{} (iso3, pcode, adm_level, valid_date, sum) ",
                SCHEMA,
                table.name()
            ));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.iso3).push_bind(&row.pcode);
                // The admin table stores the level as an integer, the regions table as text.
                match row.adm_level.index() {
                    Some(level) if table == StatsTable::Admin => b.push_bind(i32::from(level)),
                    _ => b.push_bind(row.adm_level.to_string()),
                };
                b.push_bind(row.valid_date).push_bind(row.sum);
            });
            builder.push(
                " ON CONFLICT (pcode, valid_date) DO UPDATE SET \
                 iso3 = EXCLUDED.iso3, adm_level = EXCLUDED.adm_level, sum = EXCLUDED.sum",
            );

            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(db_err("Upsert"))?;
            tx.commit().await.map_err(db_err("Commit"))?;

            written += result.rows_affected();
            debug!(chunk = chunk.len(), "Upserted chunk");
        }

        Ok(written)
    }

    async fn stats_for_pcodes(
        &self,
        table: StatsTable,
        pcodes: &[String],
    ) -> ExposureResult<Vec<ExposureStat>> {
        let rows = sqlx::query_as::<_, StatRow>(&format!(
            "SELECT iso3, pcode, adm_level::text AS adm_level, valid_date, sum::int8 AS sum \
             FROM {}.{} WHERE pcode = ANY($1) ORDER BY pcode, valid_date",
            SCHEMA,
            table.name()
        ))
        .bind(pcodes)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Query"))?;

        rows.into_iter().map(ExposureStat::try_from).collect()
    }

    async fn rolling_averages(
        &self,
        table: StatsTable,
        month: u32,
        day: u32,
        window_days: u32,
    ) -> ExposureResult<Vec<RollingAverage>> {
        let sql = format!(
            "WITH target_dates AS ( \
                 SELECT pcode, adm_level, valid_date FROM {schema}.{table} \
                 WHERE EXTRACT(MONTH FROM valid_date) = $1 AND EXTRACT(DAY FROM valid_date) = $2 \
             ) \
             SELECT t.pcode, t.adm_level::text AS adm_level, t.valid_date, \
                    AVG(d.sum)::float8 AS rolling_avg \
             FROM target_dates t \
             JOIN {schema}.{table} d \
               ON d.pcode = t.pcode \
              AND d.valid_date BETWEEN t.valid_date - $3::int AND t.valid_date \
             GROUP BY t.pcode, t.adm_level, t.valid_date \
             ORDER BY t.pcode, t.valid_date",
            schema = SCHEMA,
            table = table.name()
        );

        let rows = sqlx::query_as::<_, RollingRow>(&sql)
            .bind(month as i32)
            .bind(day as i32)
            .bind(window_days.saturating_sub(1) as i32)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Rolling query"))?;

        Ok(rows
            .into_iter()
            .map(|r| RollingAverage {
                pcode: r.pcode,
                adm_level: r.adm_level,
                valid_date: r.valid_date,
                rolling_avg: r.rolling_avg,
            })
            .collect())
    }

    #[instrument(skip(self, rows), fields(table = kind.table(source), rows = rows.len()))]
    async fn replace_snapshot(
        &self,
        kind: SnapshotKind,
        source: StatsTable,
        rows: &[ClimatologyRow],
    ) -> ExposureResult<u64> {
        let table = kind.table(source);
        let mut tx = self.pool.begin().await.map_err(db_err("Begin"))?;

        sqlx::query(&format!("DELETE FROM {}.{}", SCHEMA, table))
            .execute(&mut *tx)
            .await
            .map_err(db_err("Delete"))?;

        let mut written = 0u64;
        for chunk in rows.chunks(rows_per_statement(self.write_chunk_size, 5)) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {}.{} (pcode, adm_level, valid_date, rolling_avg, {}) ",
                SCHEMA,
                table,
                kind.column()
            ));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.pcode)
                    .push_bind(&row.adm_level)
                    .push_bind(row.valid_date)
                    .push_bind(row.rolling_avg)
                    .push_bind(row.category);
            });
            written += builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(db_err("Insert"))?
                .rows_affected();
        }

        tx.commit().await.map_err(db_err("Commit"))?;
        info!(table, written, "Replaced snapshot table");
        Ok(written)
    }

    async fn replace_admin_lookup(&self, rows: &[AdminLookupRow]) -> ExposureResult<u64> {
        let mut tx = self.pool.begin().await.map_err(db_err("Begin"))?;

        sqlx::query(&format!("DELETE FROM {}.admin_lookup", SCHEMA))
            .execute(&mut *tx)
            .await
            .map_err(db_err("Delete"))?;

        let mut written = 0u64;
        for chunk in rows.chunks(rows_per_statement(self.write_chunk_size, 7)) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {}.admin_lookup \
                 (iso3, adm0_pcode, adm0_name, adm1_pcode, adm1_name, adm2_pcode, adm2_name) ",
                SCHEMA
            ));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.iso3)
                    .push_bind(&row.adm0_pcode)
                    .push_bind(&row.adm0_name)
                    .push_bind(&row.adm1_pcode)
                    .push_bind(&row.adm1_name)
                    .push_bind(&row.adm2_pcode)
                    .push_bind(&row.adm2_name);
            });
            written += builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(db_err("Insert"))?
                .rows_affected();
        }

        tx.commit().await.map_err(db_err("Commit"))?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_common::AdmLevel;

    fn stat(pcode: &str, day: u32, sum: i64) -> ExposureStat {
        ExposureStat {
            iso3: "NGA".to_string(),
            pcode: pcode.to_string(),
            adm_level: AdmLevel::Province,
            valid_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            sum,
        }
    }

    #[test]
    fn test_dedupe_keeps_last_occurrence_in_first_position() {
        let rows = vec![stat("NG01", 1, 1), stat("NG02", 1, 2), stat("NG01", 1, 3)];
        let deduped = dedupe_last_wins(&rows);
        assert_eq!(deduped, vec![stat("NG01", 1, 3), stat("NG02", 1, 2)]);
    }

    #[test]
    fn test_rows_per_statement_respects_bind_limit() {
        assert_eq!(rows_per_statement(10_000, 5), 10_000);
        assert_eq!(rows_per_statement(10_000, 7), 9_362);
        assert_eq!(rows_per_statement(0, 5), 1);
    }
}

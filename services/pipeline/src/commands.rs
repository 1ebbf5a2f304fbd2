//! Command runners wiring configuration to the exposure stages.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use tracing::{error, info, warn};

use exposure::{
    default_target_date, export_geojson, refresh_admin_lookup, verify_inputs, BatchReport,
    BoundaryAggregator, ClimatologyRunner, ExposureEngine, ExposureOptions, RegionAggregator,
    SnapshotOutcome,
};
use exposure_common::{Iso3, SnapshotKind};
use storage::{ObjectStorage, PgStatsStore, StatsStore, StoragePath};

use crate::config::ServiceConfig;

/// Shared clients for one invocation.
pub struct AppContext {
    pub config: ServiceConfig,
    pub raw: Arc<ObjectStorage>,
    pub project: Arc<ObjectStorage>,
    pub paths: StoragePath,
}

impl AppContext {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        config.pipeline.validate()?;
        let raw = ObjectStorage::new(&config.raster_storage).context("Raster storage")?;
        let project = ObjectStorage::new(&config.project_storage).context("Project storage")?;
        Ok(Self {
            paths: StoragePath::new(&config.pipeline.project_prefix),
            raw: Arc::new(raw),
            project: Arc::new(project),
            config,
        })
    }

    async fn stats_store(&self) -> Result<Arc<dyn StatsStore>> {
        let store =
            PgStatsStore::connect(&self.config.database_url, self.config.pipeline.write_chunk_size)
                .await?;
        info!(stage = %self.config.stage, "Connected to database");
        Ok(Arc::new(store))
    }
}

/// Run `stage` for every country. A country's failure is logged and the
/// rest still run; database errors abort immediately.
async fn for_each_country<F, Fut>(countries: &[Iso3], mut stage: F) -> Result<()>
where
    F: FnMut(Iso3) -> Fut,
    Fut: Future<Output = exposure::Result<BatchReport>>,
{
    let mut failed = Vec::new();
    for iso3 in countries {
        match stage(iso3.clone()).await {
            Ok(report) => {
                if report.has_failures() {
                    warn!(
                        iso3 = %iso3,
                        failed = report.counts().failed,
                        "Some items failed and will be retried on the next run"
                    );
                }
            }
            Err(e) if e.is_database() => return Err(e.into()),
            Err(e) => {
                error!(iso3 = %iso3, error = %e, "Country failed");
                failed.push(iso3.to_string());
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Failed countries: {}", failed.join(", "));
    }
    Ok(())
}

fn current_year() -> i32 {
    Utc::now().year()
}

pub async fn init(ctx: &AppContext, countries: &[Iso3]) -> Result<()> {
    let engine = ExposureEngine::new(ctx.raw.clone(), ctx.project.clone(), ctx.config.pipeline.clone());
    let options = ExposureOptions {
        clobber: false,
        recent_year: Some(current_year()),
    };
    let (engine, options) = (&engine, &options);
    for_each_country(countries, move |iso3| async move {
        verify_inputs(&ctx.project, &ctx.paths, &iso3).await?;
        engine.run(&iso3, options).await
    })
    .await
}

pub async fn exposure(ctx: &AppContext, countries: &[Iso3], all_years: bool, clobber: bool) -> Result<()> {
    let engine = ExposureEngine::new(ctx.raw.clone(), ctx.project.clone(), ctx.config.pipeline.clone());
    let options = ExposureOptions {
        clobber,
        recent_year: (!all_years).then(current_year),
    };
    let (engine, options) = (&engine, &options);
    for_each_country(countries, move |iso3| async move { engine.run(&iso3, options).await }).await
}

pub async fn raster_stats(ctx: &AppContext, countries: &[Iso3], clobber: bool) -> Result<()> {
    let store = ctx.stats_store().await?;
    let aggregator = BoundaryAggregator::new(ctx.project.clone(), store, ctx.config.pipeline.clone());
    let aggregator = &aggregator;
    for_each_country(countries, move |iso3| async move { aggregator.run(&iso3, clobber).await }).await
}

pub async fn regions(ctx: &AppContext) -> Result<()> {
    let store = ctx.stats_store().await?;
    let aggregator = RegionAggregator::new(store);

    let mut failed = Vec::new();
    for region in &ctx.config.regions {
        match aggregator.run(region).await {
            Ok(_) => {}
            Err(e) if e.is_database() => return Err(e.into()),
            Err(e) => {
                error!(region = %region.pcode(), error = %e, "Region failed");
                failed.push(region.pcode());
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Failed regions: {}", failed.join(", "));
    }
    Ok(())
}

pub async fn snapshot(ctx: &AppContext, kind: SnapshotKind, date: Option<NaiveDate>) -> Result<()> {
    let target = date.unwrap_or_else(|| default_target_date(kind, Utc::now().date_naive()));
    info!(
        column = kind.column(),
        date = %target,
        window_days = ctx.config.pipeline.roll_window_days,
        "Computing climatology snapshot"
    );

    let store = ctx.stats_store().await?;
    let runner = ClimatologyRunner::new(store, ctx.config.pipeline.roll_window_days);
    match runner.run(kind, target).await? {
        SnapshotOutcome::Written(tables) => {
            info!(tables = ?tables, "Snapshots written");
        }
        SnapshotOutcome::NoData { source, written } => {
            info!(source, written = ?written, date = %target, "No data available, stopping");
        }
    }
    Ok(())
}

pub async fn admin_lookup(ctx: &AppContext) -> Result<()> {
    let store = ctx.stats_store().await?;
    let rows =
        refresh_admin_lookup(&ctx.project, store.as_ref(), &ctx.paths, &ctx.config.iso3s).await?;
    info!(rows, "Admin lookup refreshed");
    Ok(())
}

pub async fn geojson(ctx: &AppContext) -> Result<()> {
    let keys = export_geojson(&ctx.project, &ctx.paths, &ctx.config.iso3s).await?;
    info!(keys = ?keys, "GeoJSON exported");
    Ok(())
}

//! floodexposure: population-weighted flood exposure pipeline.
//!
//! Computes daily exposure rasters per country, aggregates them to admin
//! boundaries and regions, and maintains climatology snapshots.

mod commands;
mod config;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

use commands::AppContext;
use config::ServiceConfig;
use exposure_common::SnapshotKind;

#[derive(Parser, Debug)]
#[command(name = "floodexposure")]
#[command(about = "Population-weighted flood exposure pipeline")]
struct Args {
    /// YAML file overriding countries, regions and pipeline settings
    #[arg(short, long)]
    config: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check inputs, then compute this year's exposure rasters
    Init {
        /// Comma-separated ISO3 codes (default: all configured)
        #[arg(long)]
        iso3: Option<String>,
    },
    /// Compute exposure rasters
    Exposure {
        #[arg(long)]
        iso3: Option<String>,
        /// Consider every year, not just the current one
        #[arg(long)]
        all_years: bool,
        /// Recompute dates that already have a raster
        #[arg(long)]
        clobber: bool,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Aggregate exposure rasters to admin boundaries
    RasterStats {
        #[arg(long)]
        iso3: Option<String>,
        #[arg(long)]
        clobber: bool,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Aggregate level-1 statistics to configured regions
    Regions,
    /// Replace the quantile snapshot tables
    Quantile {
        /// Target date (default: yesterday)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Replace the tercile snapshot tables
    Tercile {
        /// Target date (default: two days ago)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Rebuild the admin name lookup table
    AdminLookup,
    /// Export merged boundaries per admin level
    Geojson,
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG takes precedence over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from(level).into()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    let mut config = ServiceConfig::from_env()?;
    if let Some(path) = &args.config {
        config.apply_yaml(path)?;
    }
    if let Command::Exposure { batch_size: Some(size), .. }
    | Command::RasterStats { batch_size: Some(size), .. } = &args.command
    {
        config.pipeline.batch_size = *size;
    }
    info!(
        stage = %config.stage,
        countries = config.iso3s.len(),
        batch_size = config.pipeline.batch_size,
        "Loaded configuration"
    );

    let ctx = AppContext::new(config)?;
    match args.command {
        Command::Init { iso3 } => {
            let countries = ctx.config.countries(iso3.as_deref())?;
            commands::init(&ctx, &countries).await
        }
        Command::Exposure {
            iso3,
            all_years,
            clobber,
            ..
        } => {
            let countries = ctx.config.countries(iso3.as_deref())?;
            commands::exposure(&ctx, &countries, all_years, clobber).await
        }
        Command::RasterStats { iso3, clobber, .. } => {
            let countries = ctx.config.countries(iso3.as_deref())?;
            commands::raster_stats(&ctx, &countries, clobber).await
        }
        Command::Regions => commands::regions(&ctx).await,
        Command::Quantile { date } => commands::snapshot(&ctx, SnapshotKind::Quantile, date).await,
        Command::Tercile { date } => commands::snapshot(&ctx, SnapshotKind::Tercile, date).await,
        Command::AdminLookup => commands::admin_lookup(&ctx).await,
        Command::Geojson => commands::geojson(&ctx).await,
    }
}

//! End-to-end exposure and boundary statistics on the fixture country.

use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDate;
use exposure::{
    compute_exposure, BoundaryAggregator, ExposureEngine, ExposureOptions, ItemOutcome,
    PipelineConfig, PipelineError, PopulationGrid, SkipReason,
};
use exposure_common::{AdmLevel, ExposureStat, GridSpec, Iso3, StatsTable};
use raster::{
    decode_geotiff, encode_geotiff, encode_geotiff_bands, layer_to_vec, Band, RasterStackBuilder,
    ResamplePlan,
};
use storage::{MemoryStatsStore, ObjectStorage, StoragePath};
use test_utils::{
    create_constant_grid, create_flood_fraction_grid, create_grid_with_nans, create_population_grid,
    raw_flood_name,
    test_adm2_geojson, TEST_GRID, TEST_ISO3,
};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

fn fixture_grid() -> GridSpec {
    let (width, height, origin_x, origin_y, res) = TEST_GRID;
    GridSpec::new(width, height, origin_x, origin_y, res, res)
}

/// Raw flood extent grid at twice the population resolution.
fn raw_grid() -> GridSpec {
    GridSpec::new(10, 4, 0.0, 2.0, 0.5, 0.5)
}

struct Harness {
    iso3: Iso3,
    config: PipelineConfig,
    paths: StoragePath,
    raw: Arc<ObjectStorage>,
    project: Arc<ObjectStorage>,
    store: Arc<MemoryStatsStore>,
}

impl Harness {
    fn new() -> Self {
        let config = PipelineConfig::default().with_batch_size(2);
        Self {
            iso3: Iso3::new(TEST_ISO3).unwrap(),
            paths: StoragePath::new(&config.project_prefix),
            config,
            raw: Arc::new(ObjectStorage::in_memory("raster")),
            project: Arc::new(ObjectStorage::in_memory("projects")),
            store: Arc::new(MemoryStatsStore::new()),
        }
    }

    fn engine(&self) -> ExposureEngine {
        ExposureEngine::new(self.raw.clone(), self.project.clone(), self.config.clone())
    }

    fn aggregator(&self) -> BoundaryAggregator {
        BoundaryAggregator::new(self.project.clone(), self.store.clone(), self.config.clone())
    }

    async fn put_population(&self) {
        let grid = fixture_grid();
        let data = create_population_grid(grid.width, grid.height);
        let bytes = encode_geotiff(&grid, &data, None).unwrap();
        self.project
            .put(&self.paths.population(&self.iso3), Bytes::from(bytes))
            .await
            .unwrap();
    }

    async fn put_boundaries(&self) {
        self.project
            .put(
                &self.paths.boundaries(&self.iso3, 2),
                Bytes::from(test_adm2_geojson()),
            )
            .await
            .unwrap();
    }

    async fn put_raw(&self, date: &str, label: Option<&str>) {
        let grid = raw_grid();
        let data = create_flood_fraction_grid(grid.width, grid.height);
        let bytes = encode_geotiff(&grid, &data, label).unwrap();
        let key = format!("{}{}", self.config.floodscan_prefix, raw_flood_name(date));
        self.raw.put(&key, Bytes::from(bytes)).await.unwrap();
    }

    /// Two-band raw raster: `SFED` holds the flood fractions, `MFED` a constant 0.9.
    async fn put_raw_two_band(&self, date: &str, labels: [&str; 2]) {
        let grid = raw_grid();
        let bands: Vec<Band> = labels
            .iter()
            .map(|label| Band {
                label: Some(label.to_string()),
                data: if *label == "SFED" {
                    create_flood_fraction_grid(grid.width, grid.height)
                } else {
                    create_constant_grid(grid.width, grid.height, 0.9)
                },
            })
            .collect();
        let bytes = encode_geotiff_bands(&grid, &bands).unwrap();
        let key = format!("{}{}", self.config.floodscan_prefix, raw_flood_name(date));
        self.raw.put(&key, Bytes::from(bytes)).await.unwrap();
    }

    async fn stored_exposure(&self, date: NaiveDate) -> Vec<f32> {
        let bytes = self
            .project
            .get(&self.paths.exposure_raster(&self.iso3, date))
            .await
            .unwrap();
        decode_geotiff(&bytes).unwrap().into_band(0).unwrap()
    }

    async fn put_exposure(&self, date: NaiveDate, data: &[f32]) {
        let bytes = encode_geotiff(&fixture_grid(), data, None).unwrap();
        self.project
            .put(&self.paths.exposure_raster(&self.iso3, date), Bytes::from(bytes))
            .await
            .unwrap();
    }

    fn admin_rows(&self) -> Vec<ExposureStat> {
        self.store.rows(StatsTable::Admin).unwrap()
    }
}

/// 10 over the northern row, no data over the southern row.
fn north_only(value: f32) -> Vec<f32> {
    let (width, height, ..) = TEST_GRID;
    let south: Vec<_> = (0..width).map(|col| (col, 1)).collect();
    create_grid_with_nans(width, height, value, &south)
}

fn sum_of(rows: &[ExposureStat], pcode: &str, day: u32) -> Option<i64> {
    rows.iter()
        .find(|r| r.pcode == pcode && r.valid_date == date(day))
        .map(|r| r.sum)
}

#[tokio::test]
async fn test_exposure_matches_direct_computation() {
    let h = Harness::new();
    h.put_population().await;
    for day in ["2024-01-01", "2024-01-02", "2024-01-03"] {
        h.put_raw(day, Some("SFED")).await;
    }

    let report = h.engine().run(&h.iso3, &ExposureOptions::default()).await.unwrap();
    assert_eq!(report.counts().processed, 3);
    assert!(!report.has_failures());

    let population = PopulationGrid {
        grid: fixture_grid(),
        data: create_population_grid(5, 2),
    };
    let mut builder = RasterStackBuilder::new();
    builder
        .push(date(1), raw_grid(), create_flood_fraction_grid(10, 4))
        .unwrap();
    let plan = ResamplePlan::nearest(&raw_grid(), &population.grid);
    let expected = compute_exposure(&builder.build(), &population, &plan, 0.05).unwrap();
    let expected = layer_to_vec(expected.layer(0));

    let bytes = h
        .project
        .get(&h.paths.exposure_raster(&h.iso3, date(1)))
        .await
        .unwrap();
    let stored = decode_geotiff(&bytes).unwrap();
    assert!(stored.grid.is_aligned_with(&population.grid));

    let stored = stored.band(0).unwrap();
    assert_eq!(stored.len(), expected.len());
    for (got, want) in stored.iter().zip(&expected) {
        assert_eq!(got.is_nan(), want.is_nan());
        if !want.is_nan() {
            assert_eq!(got.to_bits(), want.to_bits());
        }
    }
    assert!(expected.iter().any(|v| v.is_nan()));
    assert!(expected.iter().any(|v| !v.is_nan()));
}

#[tokio::test]
async fn test_two_band_rasters_use_the_extent_band() {
    let h = Harness::new();
    h.put_population().await;
    h.put_raw("2024-01-01", Some("SFED")).await;
    h.put_raw_two_band("2024-01-02", ["MFED", "SFED"]).await;
    h.put_raw_two_band("2024-01-03", ["SFED", "MFED"]).await;

    let report = h.engine().run(&h.iso3, &ExposureOptions::default()).await.unwrap();
    assert_eq!(report.counts().processed, 3);
    assert!(!report.has_failures());

    let single = h.stored_exposure(date(1)).await;
    assert!(single.iter().any(|v| !v.is_nan()));
    for day in [2, 3] {
        let stored = h.stored_exposure(date(day)).await;
        assert_eq!(stored.len(), single.len());
        for (got, want) in stored.iter().zip(&single) {
            assert_eq!(got.to_bits(), want.to_bits());
        }
    }
}

#[tokio::test]
async fn test_exposure_report_and_rerun() {
    let h = Harness::new();
    h.put_population().await;
    h.put_raw("2024-01-01", Some("SFED")).await;
    h.put_raw("2024-01-02", Some("SFED")).await;
    h.put_raw("2024-01-03", None).await;

    let garbage = format!("{}{}", h.config.floodscan_prefix, raw_flood_name("2024-01-04"));
    h.raw.put(&garbage, Bytes::from_static(b"not a tiff")).await.unwrap();
    let unparseable = format!("{}aer_area_300s_vlatest.tif", h.config.floodscan_prefix);
    h.raw.put(&unparseable, Bytes::from_static(b"x")).await.unwrap();
    let readme = format!("{}README.txt", h.config.floodscan_prefix);
    h.raw.put(&readme, Bytes::from_static(b"x")).await.unwrap();

    let engine = h.engine();
    let report = engine.run(&h.iso3, &ExposureOptions::default()).await.unwrap();
    let counts = report.counts();
    assert_eq!((counts.processed, counts.skipped, counts.failed), (2, 2, 1));
    assert!(report
        .items()
        .iter()
        .any(|i| i.outcome == ItemOutcome::Skipped(SkipReason::UnrecognizedBands)));
    assert!(report
        .items()
        .iter()
        .any(|i| i.outcome == ItemOutcome::Skipped(SkipReason::UnparseableName)));

    let existing = engine.existing_dates(&h.iso3).await.unwrap();
    assert_eq!(existing.into_iter().collect::<Vec<_>>(), vec![date(1), date(2)]);

    let rerun = engine.run(&h.iso3, &ExposureOptions::default()).await.unwrap();
    assert_eq!(rerun.counts().processed, 0);
    assert_eq!(
        rerun
            .items()
            .iter()
            .filter(|i| i.outcome == ItemOutcome::Skipped(SkipReason::AlreadyProcessed))
            .count(),
        2
    );
    assert_eq!(rerun.counts().failed, 1);

    let clobber = ExposureOptions {
        clobber: true,
        recent_year: None,
    };
    assert_eq!(engine.run(&h.iso3, &clobber).await.unwrap().counts().processed, 2);
}

#[tokio::test]
async fn test_recent_year_filter() {
    let h = Harness::new();
    h.put_population().await;
    h.put_raw("2023-12-31", Some("SFED")).await;
    h.put_raw("2024-01-01", Some("SFED")).await;

    let options = ExposureOptions {
        clobber: false,
        recent_year: Some(2024),
    };
    let report = h.engine().run(&h.iso3, &options).await.unwrap();
    assert_eq!(report.processed_dates(), vec![date(1)]);
}

#[tokio::test]
async fn test_missing_population_is_fatal() {
    let h = Harness::new();
    h.put_raw("2024-01-01", Some("SFED")).await;

    let err = h
        .engine()
        .run(&h.iso3, &ExposureOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::MissingInput { .. }));
}

#[tokio::test]
async fn test_constant_exposure_sums_at_every_level() {
    let h = Harness::new();
    h.put_boundaries().await;
    for day in 1..=3 {
        h.put_exposure(date(day), &north_only(10.0)).await;
    }

    let report = h.aggregator().run(&h.iso3, false).await.unwrap();
    assert_eq!(report.counts().processed, 3);

    // TS, TS01, TS02 and three level-2 units per date
    let rows = h.admin_rows();
    assert_eq!(rows.len(), 18);
    for day in 1..=3 {
        assert_eq!(sum_of(&rows, "TS0101", day), Some(50));
        assert_eq!(sum_of(&rows, "TS01", day), Some(50));
        assert_eq!(sum_of(&rows, "TS", day), Some(50));
        assert_eq!(sum_of(&rows, "TS0201", day), Some(0));
        assert_eq!(sum_of(&rows, "TS02", day), Some(0));
    }

    let row = rows.iter().find(|r| r.pcode == "TS01").unwrap();
    assert_eq!(row.adm_level, AdmLevel::Province);
    assert_eq!(row.iso3, "TST");
}

#[tokio::test]
async fn test_hierarchy_is_consistent() {
    let h = Harness::new();
    h.put_boundaries().await;
    let data: Vec<f32> = create_population_grid(5, 2).iter().map(|v| v * 0.37).collect();
    h.put_exposure(date(1), &data).await;

    h.aggregator().run(&h.iso3, false).await.unwrap();
    let rows = h.admin_rows();

    let level = |level: AdmLevel| -> i64 {
        rows.iter().filter(|r| r.adm_level == level).map(|r| r.sum).sum()
    };
    assert_eq!(level(AdmLevel::District), level(AdmLevel::Province));
    assert_eq!(level(AdmLevel::Province), level(AdmLevel::Country));

    let south = sum_of(&rows, "TS0201", 1).unwrap() + sum_of(&rows, "TS0202", 1).unwrap();
    assert_eq!(sum_of(&rows, "TS02", 1), Some(south));
}

#[tokio::test]
async fn test_skip_and_clobber() {
    let h = Harness::new();
    h.put_boundaries().await;
    h.put_exposure(date(1), &north_only(10.0)).await;

    let aggregator = h.aggregator();
    aggregator.run(&h.iso3, false).await.unwrap();
    assert_eq!(h.store.upsert_calls(), 1);

    let skipped = aggregator.run(&h.iso3, false).await.unwrap();
    assert_eq!(skipped.counts().processed, 0);
    assert_eq!(skipped.counts().skipped, 1);
    assert_eq!(h.store.upsert_calls(), 1);

    h.put_exposure(date(1), &north_only(20.0)).await;
    aggregator.run(&h.iso3, true).await.unwrap();

    let rows = h.admin_rows();
    assert_eq!(rows.len(), 6);
    assert_eq!(rows.iter().filter(|r| r.pcode == "TS0101").count(), 1);
    assert_eq!(sum_of(&rows, "TS0101", 1), Some(100));
}

#[tokio::test]
async fn test_failed_raster_produces_no_rows() {
    let h = Harness::new();
    h.put_boundaries().await;
    h.put_exposure(date(1), &north_only(10.0)).await;
    // Shares a batch with date 1 but sits on a shifted grid.
    let misaligned = encode_geotiff(&GridSpec::new(5, 2, 1.0, 2.0, 1.0, 1.0), &[1.0; 10], None).unwrap();
    h.project
        .put(&h.paths.exposure_raster(&h.iso3, date(2)), Bytes::from(misaligned))
        .await
        .unwrap();
    h.project
        .put(
            &h.paths.exposure_raster(&h.iso3, date(3)),
            Bytes::from_static(b"corrupt"),
        )
        .await
        .unwrap();

    let report = h.aggregator().run(&h.iso3, false).await.unwrap();
    let counts = report.counts();
    assert_eq!((counts.processed, counts.failed), (1, 2));

    let rows = h.admin_rows();
    assert!(rows.iter().all(|r| r.valid_date == date(1)));
    assert_eq!(rows.len(), 6);

    // Failed dates are picked up again once their rasters are fixed.
    h.put_exposure(date(2), &north_only(10.0)).await;
    let retry = h.aggregator().run(&h.iso3, false).await.unwrap();
    assert_eq!(retry.processed_dates(), vec![date(2)]);
    assert_eq!(retry.counts().failed, 1);
    assert_eq!(sum_of(&h.admin_rows(), "TS", 2), Some(50));
}

#[tokio::test]
async fn test_missing_boundaries_are_fatal() {
    let h = Harness::new();
    h.put_exposure(date(1), &north_only(10.0)).await;

    let err = h.aggregator().run(&h.iso3, false).await.unwrap_err();
    assert!(matches!(err, PipelineError::MissingInput { .. }));
    assert!(h.admin_rows().is_empty());
}

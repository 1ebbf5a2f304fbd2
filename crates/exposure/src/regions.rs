//! Named regions built from level-1 units.
//!
//! A region total is the arithmetic sum of its members' stored level-1
//! rows, never a geometric union.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use exposure_common::{AdmLevel, ExposureStat, Iso3, StatsTable};
use storage::StatsStore;

use crate::error::{PipelineError, Result};
use crate::report::BatchReport;

/// A user-defined group of level-1 pcodes within one country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDefinition {
    pub iso3: Iso3,
    /// Number used in the synthesized pcode
    pub number: u32,
    pub name: String,
    pub pcodes: Vec<String>,
}

impl RegionDefinition {
    pub fn new(iso3: Iso3, number: u32, name: &str, pcodes: &[&str]) -> Self {
        Self {
            iso3,
            number,
            name: name.to_string(),
            pcodes: pcodes.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// `{iso3}_region_{number}`
    pub fn pcode(&self) -> String {
        format!("{}_region_{}", self.iso3, self.number)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pcodes.is_empty() {
            return Err(PipelineError::InvalidRegion(format!(
                "{} ({}) has no pcodes",
                self.pcode(),
                self.name
            )));
        }
        Ok(())
    }
}

/// Regions configured when none are supplied.
pub fn default_regions() -> Vec<RegionDefinition> {
    let Ok(cod) = Iso3::new("cod") else {
        return Vec::new();
    };
    vec![
        RegionDefinition::new(cod.clone(), 1, "Zone 1", &["CD52", "CD53", "CD51"]),
        RegionDefinition::new(cod.clone(), 2, "Zone 2", &["CD61", "CD62"]),
        RegionDefinition::new(cod, 3, "Zone 3", &["CD74"]),
    ]
}

/// One row per date on which every member pcode has a row.
///
/// Rows for pcodes outside the region are ignored. A date missing any
/// member produces no row.
pub fn aggregate_region(region: &RegionDefinition, rows: &[ExposureStat]) -> Vec<ExposureStat> {
    let members: BTreeSet<&str> = region.pcodes.iter().map(String::as_str).collect();

    let mut by_date: BTreeMap<NaiveDate, BTreeMap<&str, i64>> = BTreeMap::new();
    for row in rows {
        if let Some(member) = members.get(row.pcode.as_str()) {
            by_date.entry(row.valid_date).or_default().insert(*member, row.sum);
        }
    }

    let pcode = region.pcode();
    let iso3 = region.iso3.upper();
    by_date
        .into_iter()
        .filter_map(|(valid_date, sums)| {
            if sums.len() < members.len() {
                debug!(pcode = %pcode, date = %valid_date, present = sums.len(), "Incomplete region date");
                return None;
            }
            Some(ExposureStat {
                iso3: iso3.clone(),
                pcode: pcode.clone(),
                adm_level: AdmLevel::Region,
                valid_date,
                sum: sums.values().sum(),
            })
        })
        .collect()
}

/// Derives region rows from stored level-1 rows.
pub struct RegionAggregator {
    store: Arc<dyn StatsStore>,
}

impl RegionAggregator {
    pub fn new(store: Arc<dyn StatsStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, region), fields(iso3 = %region.iso3, region = %region.pcode()))]
    pub async fn run(&self, region: &RegionDefinition) -> Result<BatchReport> {
        region.validate()?;
        let mut report = BatchReport::new("regions", region.iso3.as_str());

        let members = self
            .store
            .stats_for_pcodes(StatsTable::Admin, &region.pcodes)
            .await?;
        let rows = aggregate_region(region, &members);
        info!(
            name = %region.name,
            member_rows = members.len(),
            dates = rows.len(),
            "Aggregating region"
        );

        let written = self.store.upsert_stats(StatsTable::Regions, &rows).await?;
        report.add_rows_written(written);
        for row in &rows {
            report.processed(row.pcode.as_str(), row.valid_date);
        }

        report.log_summary();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn row(pcode: &str, day: u32, sum: i64) -> ExposureStat {
        ExposureStat {
            iso3: "COD".to_string(),
            pcode: pcode.to_string(),
            adm_level: AdmLevel::Province,
            valid_date: date(day),
            sum,
        }
    }

    #[test]
    fn test_region_pcode() {
        let regions = default_regions();
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].pcode(), "cod_region_1");
        assert_eq!(regions[2].pcodes, vec!["CD74".to_string()]);
    }

    #[test]
    fn test_sum_of_members() {
        let region = &default_regions()[1];
        let rows = vec![row("CD61", 1, 10), row("CD62", 1, 5), row("CD51", 1, 100)];
        let out = aggregate_region(region, &rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].sum, 15);
        assert_eq!(out[0].pcode, "cod_region_2");
        assert_eq!(out[0].iso3, "COD");
        assert_eq!(out[0].adm_level, AdmLevel::Region);
    }

    #[test]
    fn test_missing_member_drops_date() {
        let region = &default_regions()[1];
        let rows = vec![row("CD61", 1, 10), row("CD62", 1, 5), row("CD61", 2, 7)];
        let out = aggregate_region(region, &rows);
        assert_eq!(out.iter().map(|r| r.valid_date).collect::<Vec<_>>(), vec![date(1)]);
    }

    #[test]
    fn test_empty_region_is_invalid() {
        let region = RegionDefinition::new(Iso3::new("cod").unwrap(), 9, "Empty", &[]);
        assert!(region.validate().is_err());
    }

    #[test]
    fn test_region_from_yaml_shape() {
        let region: RegionDefinition = serde_json::from_str(
            r#"{ "iso3": "COD", "number": 4, "name": "Zone 4", "pcodes": ["CD10"] }"#,
        )
        .unwrap();
        assert_eq!(region.pcode(), "cod_region_4");
    }
}

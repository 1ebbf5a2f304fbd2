//! Date extraction from blob names.

use chrono::NaiveDate;

use exposure_common::{parse_iso_date, Iso3};

/// Marker preceding the date in raw flood extent file names.
const RAW_DATE_MARKER: &str = "300s_v";

/// Length of an ISO `YYYY-MM-DD` date.
const DATE_LEN: usize = 10;

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn date_at(name: &str, start: usize) -> Option<NaiveDate> {
    let text = name.get(start..start + DATE_LEN)?;
    parse_iso_date(text).ok()
}

/// Date of a raw flood extent blob: the ten characters after `300s_v`.
pub fn raw_date(key: &str) -> Option<NaiveDate> {
    let name = file_name(key);
    let start = name.find(RAW_DATE_MARKER)? + RAW_DATE_MARKER.len();
    date_at(name, start)
}

/// Whether a raw blob belongs to `year`.
pub fn is_recent(key: &str, year: i32) -> bool {
    file_name(key).contains(&format!("{}{}", RAW_DATE_MARKER, year))
}

/// Date of an exposure raster blob named `{iso3}_exposure_{date}.tif`.
pub fn exposure_date(iso3: &Iso3, key: &str) -> Option<NaiveDate> {
    let name = file_name(key);
    let prefix = format!("{}_exposure_", iso3);
    let rest = name.strip_prefix(&prefix)?.strip_suffix(".tif")?;
    if rest.len() != DATE_LEN {
        return None;
    }
    parse_iso_date(rest).ok()
}

pub fn is_tif(key: &str) -> bool {
    key.ends_with(".tif")
}

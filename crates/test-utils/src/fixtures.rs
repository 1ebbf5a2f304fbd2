//! Common test fixtures for flood exposure tests.
//!
//! The "TST" country sits on a 5 x 2 grid of one-degree cells whose
//! top-left corner is (0, 2):
//!
//! ```text
//!  y=2 +---+---+---+---+---+
//!      |        TS0101     |   TS01
//!  y=1 +---+---+---+---+---+
//!      |  TS0201   | TS0202|   TS02
//!  y=0 +---+---+---+---+---+
//!     x=0         x=3     x=5
//! ```

use serde_json::{json, Value};

/// Country code of the fixture country.
pub const TEST_ISO3: &str = "tst";

/// Grid of the fixture country as (width, height, origin_x, origin_y, res).
pub const TEST_GRID: (usize, usize, f64, f64, f64) = (5, 2, 0.0, 2.0, 1.0);

/// Level-1 pcodes of the fixture country.
pub const TEST_ADM1_PCODES: [&str; 2] = ["TS01", "TS02"];

/// Level-2 pcodes of the fixture country with their cell counts.
pub const TEST_ADM2_CELLS: [(&str, usize); 3] = [("TS0101", 5), ("TS0201", 3), ("TS0202", 2)];

/// A GeoJSON feature with an axis-aligned rectangle geometry.
pub fn rect_feature(properties: Value, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Value {
    json!({
        "type": "Feature",
        "properties": properties,
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [min_x, min_y],
                [max_x, min_y],
                [max_x, max_y],
                [min_x, max_y],
                [min_x, min_y]
            ]]
        }
    })
}

/// Serialise features into a FeatureCollection document.
pub fn feature_collection(features: Vec<Value>) -> String {
    json!({ "type": "FeatureCollection", "features": features }).to_string()
}

fn adm0_props() -> Value {
    json!({ "ADM0_PCODE": "TS", "ADM0_EN": "Testland" })
}

/// Level-0 boundary of the fixture country.
pub fn test_adm0_geojson() -> String {
    feature_collection(vec![rect_feature(adm0_props(), 0.0, 0.0, 5.0, 2.0)])
}

/// Level-1 boundaries of the fixture country.
pub fn test_adm1_geojson() -> String {
    feature_collection(vec![
        rect_feature(
            json!({ "ADM0_PCODE": "TS", "ADM0_EN": "Testland", "ADM1_PCODE": "TS01", "ADM1_EN": "North" }),
            0.0,
            1.0,
            5.0,
            2.0,
        ),
        rect_feature(
            json!({ "ADM0_PCODE": "TS", "ADM0_EN": "Testland", "ADM1_PCODE": "TS02", "ADM1_EN": "South" }),
            0.0,
            0.0,
            5.0,
            1.0,
        ),
    ])
}

/// Level-2 boundaries of the fixture country.
///
/// `TS0202` only carries a French name.
pub fn test_adm2_geojson() -> String {
    feature_collection(vec![
        rect_feature(
            json!({
                "ADM0_PCODE": "TS", "ADM0_EN": "Testland",
                "ADM1_PCODE": "TS01", "ADM1_EN": "North",
                "ADM2_PCODE": "TS0101", "ADM2_EN": "North Central"
            }),
            0.0,
            1.0,
            5.0,
            2.0,
        ),
        rect_feature(
            json!({
                "ADM0_PCODE": "TS", "ADM0_EN": "Testland",
                "ADM1_PCODE": "TS02", "ADM1_EN": "South",
                "ADM2_PCODE": "TS0201", "ADM2_EN": "South West"
            }),
            0.0,
            0.0,
            3.0,
            1.0,
        ),
        rect_feature(
            json!({
                "ADM0_PCODE": "TS", "ADM0_EN": "Testland",
                "ADM1_PCODE": "TS02", "ADM1_EN": "South",
                "ADM2_PCODE": "TS0202", "ADM2_EN": "", "ADM2_FR": "Sud Est"
            }),
            3.0,
            0.0,
            5.0,
            1.0,
        ),
    ])
}

/// Boundaries of the fixture country for `level` 0, 1 or 2.
pub fn test_boundaries_geojson(level: u8) -> String {
    match level {
        0 => test_adm0_geojson(),
        1 => test_adm1_geojson(),
        _ => test_adm2_geojson(),
    }
}

/// Raw flood extent file name for a date string.
pub fn raw_flood_name(date: &str) -> String {
    format!("aer_area_300s_v{}_v05r01.tif", date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adm2_fixture_is_valid_json() {
        let doc: Value = serde_json::from_str(&test_adm2_geojson()).unwrap();
        assert_eq!(doc["features"].as_array().unwrap().len(), 3);
        assert_eq!(
            doc["features"][2]["properties"]["ADM2_FR"].as_str(),
            Some("Sud Est")
        );
    }

    #[test]
    fn test_fixture_cells_cover_grid() {
        let (width, height, ..) = TEST_GRID;
        let cells: usize = TEST_ADM2_CELLS.iter().map(|(_, n)| n).sum();
        assert_eq!(cells, width * height);
    }

    #[test]
    fn test_raw_flood_name() {
        assert_eq!(
            raw_flood_name("2024-01-01"),
            "aer_area_300s_v2024-01-01_v05r01.tif"
        );
    }
}

//! Name lookup table and merged GeoJSON boundary exports.

use bytes::Bytes;
use geo::{LineString, MultiLineString};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use tracing::{info, instrument};

use exposure_common::{AdminLookupRow, ExposureError, Iso3};
use storage::{ObjectStorage, StatsStore, StoragePath};

use crate::boundaries::{load_boundaries, AdminBoundary, MAX_ADMIN_LEVEL};
use crate::error::Result;

/// Lookup rows for a country's level-2 boundaries.
pub fn admin_lookup_rows(iso3: &Iso3, boundaries: &[AdminBoundary]) -> Vec<AdminLookupRow> {
    let text = |value: Option<&str>| value.unwrap_or_default().to_string();
    boundaries
        .iter()
        .filter(|b| b.level == MAX_ADMIN_LEVEL)
        .map(|b| AdminLookupRow {
            iso3: iso3.upper(),
            adm0_pcode: text(b.pcode_at(0)),
            adm0_name: text(b.name_at(0)),
            adm1_pcode: text(b.pcode_at(1)),
            adm1_name: text(b.name_at(1)),
            adm2_pcode: text(b.pcode_at(2)),
            adm2_name: text(b.name_at(2)),
        })
        .collect()
}

/// Rebuild the `admin_lookup` table from every country's level-2 boundaries.
#[instrument(skip_all, fields(countries = countries.len()))]
pub async fn refresh_admin_lookup(
    project: &ObjectStorage,
    store: &dyn StatsStore,
    paths: &StoragePath,
    countries: &[Iso3],
) -> Result<u64> {
    let mut rows = Vec::new();
    for iso3 in countries {
        let boundaries = load_boundaries(project, paths, iso3, MAX_ADMIN_LEVEL).await?;
        rows.extend(admin_lookup_rows(iso3, &boundaries));
    }

    let written = store.replace_admin_lookup(&rows).await?;
    info!(rows = written, "Admin lookup replaced");
    Ok(written)
}

/// A feature carrying only `pcode` and `name`.
pub fn boundary_feature(boundary: &AdminBoundary) -> Feature {
    named_feature(boundary, geojson::Value::from(&boundary.geometry))
}

/// Every ring of the boundary as a line, exterior first.
pub fn boundary_outline(boundary: &AdminBoundary) -> MultiLineString<f64> {
    let lines: Vec<LineString<f64>> = boundary
        .geometry
        .iter()
        .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
        .cloned()
        .collect();
    MultiLineString::new(lines)
}

fn named_feature(boundary: &AdminBoundary, geometry: geojson::Value) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("pcode".to_string(), JsonValue::from(boundary.pcode()));
    properties.insert("name".to_string(), JsonValue::from(boundary.name()));

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Serialise boundaries as a FeatureCollection of `pcode`/`name` features.
pub fn boundaries_to_geojson<'a>(boundaries: impl IntoIterator<Item = &'a AdminBoundary>) -> Result<String> {
    features_to_string(boundaries.into_iter().map(boundary_feature).collect())
}

/// Serialise boundary outlines as a FeatureCollection of
/// `MultiLineString` features.
pub fn outlines_to_geojson<'a>(boundaries: impl IntoIterator<Item = &'a AdminBoundary>) -> Result<String> {
    features_to_string(
        boundaries
            .into_iter()
            .map(|b| named_feature(b, geojson::Value::from(&boundary_outline(b))))
            .collect(),
    )
}

fn features_to_string(features: Vec<Feature>) -> Result<String> {
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    serde_json::to_string(&collection).map_err(|e| ExposureError::from(e).into())
}

/// Upload one merged FeatureCollection per admin level, plus the country
/// outlines after level 0. Returns the keys written.
#[instrument(skip_all, fields(countries = countries.len()))]
pub async fn export_geojson(
    project: &ObjectStorage,
    paths: &StoragePath,
    countries: &[Iso3],
) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    for level in 0..=MAX_ADMIN_LEVEL {
        let mut merged = Vec::new();
        for iso3 in countries {
            merged.extend(load_boundaries(project, paths, iso3, level).await?);
        }

        let key = paths.geojson_export(level);
        let text = boundaries_to_geojson(&merged)?;
        project.put(&key, Bytes::from(text)).await?;
        info!(level, features = merged.len(), key = %key, "Exported boundaries");
        keys.push(key);

        if level == 0 {
            let key = paths.geojson_outline();
            project.put(&key, Bytes::from(outlines_to_geojson(&merged)?)).await?;
            info!(features = merged.len(), key = %key, "Exported country outlines");
            keys.push(key);
        }
    }
    Ok(keys)
}

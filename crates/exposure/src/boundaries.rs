//! Administrative boundaries read from GeoJSON.
//!
//! Each feature carries the pcodes of its own level and of every parent
//! level (`ADM0_PCODE` .. `ADM{n}_PCODE`) plus `ADM{n}_EN` / `ADM{n}_FR`
//! names. The parent of a level-2 unit is read from these properties, never
//! inferred from the pcode text.

use geo::{Geometry, MultiPolygon};
use geojson::{GeoJson, JsonObject, JsonValue};
use tracing::{debug, instrument};

use exposure_common::{ExposureError, Iso3};
use storage::{ObjectStorage, StoragePath};

use crate::error::{PipelineError, Result};

/// Deepest administrative level handled.
pub const MAX_ADMIN_LEVEL: u8 = 2;

/// One administrative unit at `level` with its ancestry.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminBoundary {
    pub level: u8,
    /// Pcodes for levels `0..=level`
    pcodes: Vec<String>,
    /// Display names for levels `0..=level`
    names: Vec<String>,
    pub geometry: MultiPolygon<f64>,
}

impl AdminBoundary {
    /// Pcode of this unit.
    pub fn pcode(&self) -> &str {
        self.pcodes.last().map(String::as_str).unwrap_or_default()
    }

    /// Display name of this unit.
    pub fn name(&self) -> &str {
        self.names.last().map(String::as_str).unwrap_or_default()
    }

    /// Pcode of this unit or its ancestor at `level`.
    pub fn pcode_at(&self, level: u8) -> Option<&str> {
        self.pcodes.get(usize::from(level)).map(String::as_str)
    }

    pub fn name_at(&self, level: u8) -> Option<&str> {
        self.names.get(usize::from(level)).map(String::as_str)
    }
}

fn property_text(properties: &JsonObject, name: &str) -> Option<String> {
    match properties.get(name)? {
        JsonValue::String(s) => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// English name, falling back to French when missing or empty.
fn display_name(properties: &JsonObject, level: u8) -> String {
    property_text(properties, &format!("ADM{}_EN", level))
        .filter(|s| !s.is_empty())
        .or_else(|| property_text(properties, &format!("ADM{}_FR", level)))
        .unwrap_or_default()
}

fn to_multi_polygon(geometry: Option<geojson::Geometry>) -> std::result::Result<MultiPolygon<f64>, String> {
    let Some(geometry) = geometry else {
        return Ok(MultiPolygon(Vec::new()));
    };
    match Geometry::<f64>::try_from(geometry.value).map_err(|e| e.to_string())? {
        Geometry::Polygon(polygon) => Ok(MultiPolygon(vec![polygon])),
        Geometry::MultiPolygon(multi) => Ok(multi),
        Geometry::Rect(rect) => Ok(MultiPolygon(vec![rect.to_polygon()])),
        other => Err(format!("unsupported geometry {}", geometry_name(&other))),
    }
}

fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => "point",
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => "line",
        Geometry::GeometryCollection(_) => "collection",
        _ => "shape",
    }
}

/// Parse a level-`level` FeatureCollection. `key` only labels errors.
pub fn parse_boundaries(key: &str, text: &str, level: u8) -> Result<Vec<AdminBoundary>> {
    let error = |message: String| PipelineError::Boundaries {
        key: key.to_string(),
        message,
    };

    if level > MAX_ADMIN_LEVEL {
        return Err(error(format!("unsupported admin level {}", level)));
    }

    let collection = match text.parse::<GeoJson>().map_err(|e| error(e.to_string()))? {
        GeoJson::FeatureCollection(collection) => collection,
        _ => return Err(error("expected a FeatureCollection".to_string())),
    };

    let mut boundaries = Vec::with_capacity(collection.features.len());
    for (i, feature) in collection.features.into_iter().enumerate() {
        let properties = feature.properties.unwrap_or_default();

        let mut pcodes = Vec::with_capacity(usize::from(level) + 1);
        let mut names = Vec::with_capacity(usize::from(level) + 1);
        for l in 0..=level {
            let pcode = property_text(&properties, &format!("ADM{}_PCODE", l))
                .filter(|s| !s.is_empty())
                .ok_or_else(|| error(format!("feature {} has no ADM{}_PCODE", i, l)))?;
            pcodes.push(pcode);
            names.push(display_name(&properties, l));
        }

        let geometry = to_multi_polygon(feature.geometry)
            .map_err(|e| error(format!("feature {}: {}", i, e)))?;

        boundaries.push(AdminBoundary {
            level,
            pcodes,
            names,
            geometry,
        });
    }

    Ok(boundaries)
}

/// Load a country's boundaries at `level`. Missing boundaries are fatal for
/// the country.
#[instrument(skip(storage, paths), fields(iso3 = %iso3))]
pub async fn load_boundaries(
    storage: &ObjectStorage,
    paths: &StoragePath,
    iso3: &Iso3,
    level: u8,
) -> Result<Vec<AdminBoundary>> {
    let key = paths.boundaries(iso3, level);
    let bytes = storage.get(&key).await.map_err(|e| match e {
        ExposureError::NotFound(key) => PipelineError::MissingInput {
            iso3: iso3.to_string(),
            key,
        },
        other => other.into(),
    })?;

    let text = std::str::from_utf8(&bytes).map_err(|e| PipelineError::Boundaries {
        key: key.clone(),
        message: e.to_string(),
    })?;

    let boundaries = parse_boundaries(&key, text, level)?;
    debug!(level, count = boundaries.len(), "Loaded boundaries");
    Ok(boundaries)
}

//! Administrative identifiers: country codes and hierarchy levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ExposureError, ExposureResult};

/// A three-letter ISO country code, stored lower-case.
///
/// Object-store keys use the lower-case form, table rows the upper-case form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Iso3(String);

impl Iso3 {
    pub fn new(code: &str) -> ExposureResult<Self> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ExposureError::InvalidIso3(code.to_string()));
        }
        Ok(Self(code.to_ascii_lowercase()))
    }

    /// Lower-case form used in blob keys and region pcodes.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-case form used in table rows.
    pub fn upper(&self) -> String {
        self.0.to_ascii_uppercase()
    }
}

impl fmt::Display for Iso3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Iso3 {
    type Err = ExposureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Iso3::new(s)
    }
}

impl TryFrom<String> for Iso3 {
    type Error = ExposureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Iso3::new(&value)
    }
}

impl From<Iso3> for String {
    fn from(value: Iso3) -> Self {
        value.0
    }
}

/// Depth in the administrative hierarchy, or a synthetic region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdmLevel {
    /// Country (level 0)
    Country,
    /// Province (level 1)
    Province,
    /// District (level 2)
    District,
    /// User-defined group of level-1 units
    Region,
}

impl AdmLevel {
    /// Levels produced by raster aggregation, coarsest first.
    pub const ADMIN: [AdmLevel; 3] = [AdmLevel::Country, AdmLevel::Province, AdmLevel::District];

    pub fn from_index(level: u8) -> ExposureResult<Self> {
        match level {
            0 => Ok(AdmLevel::Country),
            1 => Ok(AdmLevel::Province),
            2 => Ok(AdmLevel::District),
            other => Err(ExposureError::InvalidAdmLevel(other.to_string())),
        }
    }

    /// Numeric level, `None` for regions.
    pub fn index(&self) -> Option<u8> {
        match self {
            AdmLevel::Country => Some(0),
            AdmLevel::Province => Some(1),
            AdmLevel::District => Some(2),
            AdmLevel::Region => None,
        }
    }
}

impl fmt::Display for AdmLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(i) => write!(f, "{}", i),
            None => f.write_str("region"),
        }
    }
}

impl FromStr for AdmLevel {
    type Err = ExposureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "region" => Ok(AdmLevel::Region),
            other => other
                .parse::<u8>()
                .map_err(|_| ExposureError::InvalidAdmLevel(other.to_string()))
                .and_then(AdmLevel::from_index),
        }
    }
}

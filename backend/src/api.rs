//! Public API surface.
//!
//! Page and reference DTOs returned by the retrieval facade. They derive `Serialize` with
//! kebab-case field names so an outer formatter can render them as JSON or anything else.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Quality code reported for readings stored without one.
pub const DEFAULT_QUALITY_CODE: i32 = 5;

/// Unit system of the catalog and group listings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitSystem {
    #[default]
    #[serde(rename = "SI")]
    Si,
    #[serde(rename = "EN")]
    En,
}

impl UnitSystem {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SI" => Some(UnitSystem::Si),
            "EN" => Some(UnitSystem::En),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Si => "SI",
            UnitSystem::En => "EN",
        }
    }

    /// Unit used for location elevations in this system.
    pub fn elevation_unit(&self) -> &'static str {
        match self {
            UnitSystem::Si => "m",
            UnitSystem::En => "ft",
        }
    }

    /// Convert an elevation stored in meters.
    pub fn elevation_from_meters(&self, meters: f64) -> f64 {
        match self {
            UnitSystem::Si => meters,
            UnitSystem::En => meters / 0.3048,
        }
    }
}

/// One reading of a time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeSeriesValue {
    pub date_time: DateTime<Utc>,
    pub value: Option<f64>,
    pub quality_code: i32,
}

/// A page of readings plus the series metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeSeries {
    /// Cursor this page was requested with.
    pub page: Option<String>,
    pub next_page: Option<String>,
    pub page_size: i32,
    pub total: Option<u64>,
    pub name: String,
    pub office_id: String,
    pub begin: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub time_zone: String,
    pub units: String,
    /// Interval in minutes; 0 for irregular series.
    pub interval_minutes: i64,
    pub values: Vec<TimeSeriesValue>,
}

/// A page of a catalog listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Catalog<E> {
    pub page: Option<String>,
    pub next_page: Option<String>,
    pub total: Option<u64>,
    pub page_size: i32,
    pub entries: Vec<E>,
}

impl<E> Catalog<E> {
    pub fn is_last_page(&self) -> bool {
        self.next_page.is_none()
    }
}

pub type TimeSeriesCatalog = Catalog<TimeSeriesCatalogEntry>;
pub type LocationCatalog = Catalog<LocationCatalogEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeSeriesCatalogEntry {
    pub office: String,
    pub name: String,
    pub units: String,
    pub interval_minutes: i64,
}

/// Alias of a location inside one location group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationAlias {
    /// `<category>-<group>`
    pub name: String,
    pub value: String,
}

impl LocationAlias {
    pub fn new(category: &str, group: &str, alias_id: impl Into<String>) -> Self {
        Self {
            name: format!("{}-{}", category, group),
            value: alias_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LocationCatalogEntry {
    pub office: String,
    pub name: String,
    pub nearest_city: Option<String>,
    pub public_name: Option<String>,
    pub long_name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub time_zone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
    /// Unit of `elevation`.
    pub unit: String,
    pub state: Option<String>,
    pub county: Option<String>,
    pub nation: Option<String>,
    pub active: bool,
    pub aliases: Vec<LocationAlias>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Office {
    pub name: String,
    pub long_name: String,
    #[serde(rename = "type")]
    pub office_type: String,
    pub reports_to: Option<String>,
}

/// Human readable office type for a stored type code.
pub fn office_type_name(code: &str) -> &'static str {
    match code.trim().to_ascii_uppercase().as_str() {
        "HQ" => "corps headquarters",
        "MSC" => "division headquarters",
        "MSCR" => "division regional",
        "DIS" => "district",
        "FOA" => "field operating activity",
        _ => "unknown",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LocationCategory {
    pub office_id: String,
    pub id: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssignedLocation {
    pub location_id: String,
    pub office_id: String,
    pub alias_id: Option<String>,
    pub attribute: Option<i64>,
    pub ref_location_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LocationGroup {
    pub category: LocationCategory,
    pub office_id: String,
    pub id: String,
    pub description: Option<String>,
    pub shared_alias_id: Option<String>,
    pub shared_ref_location_id: Option<String>,
    pub attribute: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub assigned_locations: Vec<AssignedLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeSeriesCategory {
    pub office_id: String,
    pub id: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeSeriesGroup {
    pub category: TimeSeriesCategory,
    pub office_id: String,
    pub id: String,
    pub description: Option<String>,
    pub shared_alias_id: Option<String>,
    pub shared_ref_ts_id: Option<String>,
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod api_tests;

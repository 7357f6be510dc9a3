//! Rows returned by repositories, before they are shaped into API DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{
    AssignedLocation, LocationAlias, LocationCategory, LocationGroup, Office, TimeSeriesCategory,
    TimeSeriesGroup, office_type_name,
};
use crate::paging::{CatalogKey, JoinedRow};

/// Stored metadata of one time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesMetadataRow {
    pub office_id: String,
    pub ts_id: String,
    /// Unit the readings are stored in.
    pub storage_unit: String,
    /// Default unit of the series' parameter in each unit system.
    pub si_unit: String,
    pub en_unit: String,
    pub interval_minutes: i64,
}

impl TimeSeriesMetadataRow {
    pub fn key(&self) -> CatalogKey {
        CatalogKey::new(&self.office_id, &self.ts_id)
    }
}

/// One stored reading, already converted to the requested unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRow {
    pub date_time: DateTime<Utc>,
    pub value: Option<f64>,
    pub quality_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesCatalogRow {
    pub office_id: String,
    pub ts_id: String,
    pub units: String,
    pub interval_minutes: i64,
}

impl TimeSeriesCatalogRow {
    pub fn key(&self) -> CatalogKey {
        CatalogKey::new(&self.office_id, &self.ts_id)
    }
}

/// Location columns of the location catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRow {
    pub office_id: String,
    pub location_id: String,
    pub nearest_city: Option<String>,
    pub public_name: Option<String>,
    pub long_name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub time_zone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Stored in meters.
    pub elevation: Option<f64>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub nation: Option<String>,
    pub active: bool,
}

impl LocationRow {
    pub fn key(&self) -> CatalogKey {
        CatalogKey::new(&self.office_id, &self.location_id)
    }

    /// Whether an assignment naming `office_id`/`location_id` belongs to this location.
    /// Identifiers compare case-insensitively.
    pub fn is_assigned_as(&self, office_id: &str, location_id: &str) -> bool {
        self.office_id.eq_ignore_ascii_case(office_id)
            && self.location_id.eq_ignore_ascii_case(location_id)
    }
}

/// A location left-joined with one of its group assignments.
///
/// The assignment columns are all `None` for locations without assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCatalogRow {
    pub location: LocationRow,
    pub category_id: Option<String>,
    pub group_id: Option<String>,
    pub alias_id: Option<String>,
}

impl LocationCatalogRow {
    pub fn bare(location: LocationRow) -> Self {
        Self {
            location,
            category_id: None,
            group_id: None,
            alias_id: None,
        }
    }
}

impl JoinedRow for LocationCatalogRow {
    type Key = CatalogKey;
    type Parent = LocationRow;
    type Child = LocationAlias;

    fn parent_key(&self) -> CatalogKey {
        self.location.key()
    }

    fn into_parts(self) -> (LocationRow, Option<LocationAlias>) {
        let alias = match (self.category_id, self.group_id, self.alias_id) {
            (Some(category), Some(group), Some(alias)) => {
                Some(LocationAlias::new(&category, &group, alias))
            }
            _ => None,
        };
        (self.location, alias)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficeRow {
    pub office_id: String,
    pub long_name: String,
    pub office_type: String,
    pub reports_to: Option<String>,
}

impl From<OfficeRow> for Office {
    fn from(row: OfficeRow) -> Self {
        Office {
            office_type: office_type_name(&row.office_type).to_string(),
            name: row.office_id,
            long_name: row.long_name,
            reports_to: row.reports_to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub office_id: String,
    pub category_id: String,
    pub description: Option<String>,
}

impl From<CategoryRow> for LocationCategory {
    fn from(row: CategoryRow) -> Self {
        LocationCategory {
            office_id: row.office_id,
            id: row.category_id,
            description: row.description,
        }
    }
}

impl From<CategoryRow> for TimeSeriesCategory {
    fn from(row: CategoryRow) -> Self {
        TimeSeriesCategory {
            office_id: row.office_id,
            id: row.category_id,
            description: row.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationGroupRow {
    pub category: CategoryRow,
    pub office_id: String,
    pub group_id: String,
    pub description: Option<String>,
    pub shared_alias_id: Option<String>,
    pub shared_ref_location_id: Option<String>,
    pub attribute: Option<i64>,
}

impl From<LocationGroupRow> for LocationGroup {
    fn from(row: LocationGroupRow) -> Self {
        LocationGroup {
            category: row.category.into(),
            office_id: row.office_id,
            id: row.group_id,
            description: row.description,
            shared_alias_id: row.shared_alias_id,
            shared_ref_location_id: row.shared_ref_location_id,
            attribute: row.attribute,
            assigned_locations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub location_id: String,
    pub office_id: String,
    pub alias_id: Option<String>,
    pub attribute: Option<i64>,
    pub ref_location_id: Option<String>,
}

impl From<AssignmentRow> for AssignedLocation {
    fn from(row: AssignmentRow) -> Self {
        AssignedLocation {
            location_id: row.location_id,
            office_id: row.office_id,
            alias_id: row.alias_id,
            attribute: row.attribute,
            ref_location_id: row.ref_location_id,
        }
    }
}

/// A location group left-joined with one of its assigned locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationGroupAssignmentRow {
    pub group: LocationGroupRow,
    pub assignment: Option<AssignmentRow>,
}

impl JoinedRow for LocationGroupAssignmentRow {
    type Key = (String, String, String);
    type Parent = LocationGroupRow;
    type Child = AssignmentRow;

    fn parent_key(&self) -> Self::Key {
        (
            self.group.office_id.to_uppercase(),
            self.group.category.category_id.to_uppercase(),
            self.group.group_id.to_uppercase(),
        )
    }

    fn into_parts(self) -> (LocationGroupRow, Option<AssignmentRow>) {
        (self.group, self.assignment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesGroupRow {
    pub category: CategoryRow,
    pub office_id: String,
    pub group_id: String,
    pub description: Option<String>,
    pub shared_alias_id: Option<String>,
    pub shared_ref_ts_id: Option<String>,
}

impl From<TimeSeriesGroupRow> for TimeSeriesGroup {
    fn from(row: TimeSeriesGroupRow) -> Self {
        TimeSeriesGroup {
            category: row.category.into(),
            office_id: row.office_id,
            id: row.group_id,
            description: row.description,
            shared_alias_id: row.shared_alias_id,
            shared_ref_ts_id: row.shared_ref_ts_id,
        }
    }
}

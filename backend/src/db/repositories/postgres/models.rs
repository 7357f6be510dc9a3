use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{
    location_categories, location_group_assignments, location_groups, locations, offices,
    timeseries, timeseries_categories, timeseries_groups, timeseries_values,
};
use crate::db::models::{
    AssignmentRow, CategoryRow, LocationGroupRow, LocationRow, OfficeRow, TimeSeriesCatalogRow,
    TimeSeriesGroupRow, TimeSeriesMetadataRow, ValueRow,
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = offices)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OfficeRecord {
    pub office_id: String,
    pub long_name: String,
    pub office_type: String,
    pub reports_to: Option<String>,
}

impl From<OfficeRecord> for OfficeRow {
    fn from(r: OfficeRecord) -> Self {
        OfficeRow {
            office_id: r.office_id,
            long_name: r.long_name,
            office_type: r.office_type,
            reports_to: r.reports_to,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = timeseries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TimeSeriesRecord {
    pub ts_code: i64,
    pub office_id: String,
    pub ts_id: String,
    pub storage_unit: String,
    pub si_unit: String,
    pub en_unit: String,
    pub interval_minutes: i64,
}

impl From<TimeSeriesRecord> for TimeSeriesMetadataRow {
    fn from(r: TimeSeriesRecord) -> Self {
        TimeSeriesMetadataRow {
            office_id: r.office_id,
            ts_id: r.ts_id,
            storage_unit: r.storage_unit,
            si_unit: r.si_unit,
            en_unit: r.en_unit,
            interval_minutes: r.interval_minutes,
        }
    }
}

impl From<TimeSeriesRecord> for TimeSeriesCatalogRow {
    fn from(r: TimeSeriesRecord) -> Self {
        TimeSeriesCatalogRow {
            office_id: r.office_id,
            ts_id: r.ts_id,
            units: r.storage_unit,
            interval_minutes: r.interval_minutes,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = timeseries_values)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ValueRecord {
    pub date_time: DateTime<Utc>,
    pub value: Option<f64>,
    pub quality_code: Option<i32>,
}

impl ValueRecord {
    pub fn converted(self, factor: f64, offset: f64) -> ValueRow {
        ValueRow {
            date_time: self.date_time,
            value: self.value.map(|v| v * factor + offset),
            quality_code: self.quality_code,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = locations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LocationRecord {
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
    pub elevation: Option<f64>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub nation: Option<String>,
    pub active: bool,
}

impl From<LocationRecord> for LocationRow {
    fn from(r: LocationRecord) -> Self {
        LocationRow {
            office_id: r.office_id,
            location_id: r.location_id,
            nearest_city: r.nearest_city,
            public_name: r.public_name,
            long_name: r.long_name,
            description: r.description,
            kind: r.kind,
            time_zone: r.time_zone,
            latitude: r.latitude,
            longitude: r.longitude,
            elevation: r.elevation,
            state: r.state,
            county: r.county,
            nation: r.nation,
            active: r.active,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = location_categories)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LocationCategoryRecord {
    pub office_id: String,
    pub category_id: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = timeseries_categories)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TimeSeriesCategoryRecord {
    pub office_id: String,
    pub category_id: String,
    pub description: Option<String>,
}

impl From<LocationCategoryRecord> for CategoryRow {
    fn from(r: LocationCategoryRecord) -> Self {
        CategoryRow {
            office_id: r.office_id,
            category_id: r.category_id,
            description: r.description,
        }
    }
}

impl From<TimeSeriesCategoryRecord> for CategoryRow {
    fn from(r: TimeSeriesCategoryRecord) -> Self {
        CategoryRow {
            office_id: r.office_id,
            category_id: r.category_id,
            description: r.description,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = location_groups)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LocationGroupRecord {
    pub office_id: String,
    pub category_id: String,
    pub group_id: String,
    pub description: Option<String>,
    pub shared_alias_id: Option<String>,
    pub shared_ref_location_id: Option<String>,
    pub attribute: Option<i64>,
}

impl LocationGroupRecord {
    /// Attach the owning category; a missing category keeps only its id.
    pub fn into_row(self, category: Option<CategoryRow>) -> LocationGroupRow {
        let category = category.unwrap_or_else(|| CategoryRow {
            office_id: self.office_id.clone(),
            category_id: self.category_id.clone(),
            description: None,
        });
        LocationGroupRow {
            category,
            office_id: self.office_id,
            group_id: self.group_id,
            description: self.description,
            shared_alias_id: self.shared_alias_id,
            shared_ref_location_id: self.shared_ref_location_id,
            attribute: self.attribute,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = location_group_assignments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AssignmentRecord {
    pub office_id: String,
    pub category_id: String,
    pub group_id: String,
    pub location_id: String,
    pub alias_id: Option<String>,
    pub attribute: Option<i64>,
    pub ref_location_id: Option<String>,
}

impl From<AssignmentRecord> for AssignmentRow {
    fn from(r: AssignmentRecord) -> Self {
        AssignmentRow {
            location_id: r.location_id,
            office_id: r.office_id,
            alias_id: r.alias_id,
            attribute: r.attribute,
            ref_location_id: r.ref_location_id,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = timeseries_groups)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TimeSeriesGroupRecord {
    pub office_id: String,
    pub category_id: String,
    pub group_id: String,
    pub description: Option<String>,
    pub shared_alias_id: Option<String>,
    pub shared_ref_ts_id: Option<String>,
}

impl TimeSeriesGroupRecord {
    pub fn into_row(self, category: Option<CategoryRow>) -> TimeSeriesGroupRow {
        let category = category.unwrap_or_else(|| CategoryRow {
            office_id: self.office_id.clone(),
            category_id: self.category_id.clone(),
            description: None,
        });
        TimeSeriesGroupRow {
            category,
            office_id: self.office_id,
            group_id: self.group_id,
            description: self.description,
            shared_alias_id: self.shared_alias_id,
            shared_ref_ts_id: self.shared_ref_ts_id,
        }
    }
}

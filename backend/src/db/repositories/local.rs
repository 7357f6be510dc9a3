//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits suitable for unit
//! testing and local development. Query semantics (ordering, office scoping, resume
//! predicates and row limits) match the Postgres backend so paging can be exercised without
//! a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::db::models::*;
use crate::db::repository::*;
use crate::paging::{CatalogQuery, ValuesQuery};

/// In-memory local repository.
///
/// # Example
/// ```
/// use cwms_data::db::repositories::LocalRepository;
/// use cwms_data::db::models::OfficeRow;
///
/// let repo = LocalRepository::new();
/// repo.add_office(OfficeRow {
///     office_id: "SWT".to_string(),
///     long_name: "Tulsa District".to_string(),
///     office_type: "DIS".to_string(),
///     reports_to: Some("SWD".to_string()),
/// });
/// assert_eq!(repo.office_count(), 1);
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

#[derive(Debug, Clone, PartialEq)]
struct StoredValue {
    value: Option<f64>,
    quality_code: Option<i32>,
}

struct StoredSeries {
    meta: TimeSeriesMetadataRow,
    values: BTreeMap<DateTime<Utc>, StoredValue>,
}

struct StoredAssignment {
    office_id: String,
    category_id: String,
    group_id: String,
    row: AssignmentRow,
}

impl StoredAssignment {
    fn belongs_to(&self, office: &str, category_id: &str, group_id: &str) -> bool {
        self.office_id.eq_ignore_ascii_case(office)
            && self.category_id.eq_ignore_ascii_case(category_id)
            && self.group_id.eq_ignore_ascii_case(group_id)
    }
}

struct LocalData {
    offices: Vec<OfficeRow>,
    series: Vec<StoredSeries>,
    locations: Vec<LocationRow>,
    location_categories: Vec<CategoryRow>,
    location_groups: Vec<LocationGroupRow>,
    assignments: Vec<StoredAssignment>,
    timeseries_categories: Vec<CategoryRow>,
    timeseries_groups: Vec<TimeSeriesGroupRow>,
    // (from, to) -> (factor, offset)
    conversions: HashMap<(String, String), (f64, f64)>,

    // Connection health
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            offices: Vec::new(),
            series: Vec::new(),
            locations: Vec::new(),
            location_categories: Vec::new(),
            location_groups: Vec::new(),
            assignments: Vec::new(),
            timeseries_categories: Vec::new(),
            timeseries_groups: Vec::new(),
            conversions: HashMap::new(),
            is_healthy: true,
        }
    }
}

impl LocalData {
    fn ensure_healthy(&self, operation: &str) -> RepositoryResult<()> {
        if self.is_healthy {
            Ok(())
        } else {
            Err(RepositoryError::connection_with_context(
                "local repository is marked unhealthy",
                ErrorContext::new(operation),
            ))
        }
    }

    fn conversion(&self, from: &str, to: &str) -> Option<(f64, f64)> {
        if from == to {
            return Some((1.0, 0.0));
        }
        self.conversions
            .get(&(from.to_string(), to.to_string()))
            .copied()
    }

    fn find_series(&self, office: &str, ts_id: &str) -> Option<&StoredSeries> {
        self.series.iter().find(|s| {
            s.meta.office_id.eq_ignore_ascii_case(office) && s.meta.ts_id.eq_ignore_ascii_case(ts_id)
        })
    }

    fn catalog_locations(&self, query: &CatalogQuery) -> Vec<&LocationRow> {
        let mut locations: Vec<&LocationRow> = self
            .locations
            .iter()
            .filter(|loc| query.admits(&loc.key()))
            .collect();
        locations.sort_by_key(|loc| loc.key());
        if let Some(limit) = query.limit {
            locations.truncate(limit);
        }
        locations
    }

    fn joined_location_rows(&self, location: &LocationRow) -> Vec<LocationCatalogRow> {
        let mut assigned: Vec<&StoredAssignment> = self
            .assignments
            .iter()
            .filter(|a| location.is_assigned_as(&a.row.office_id, &a.row.location_id))
            .collect();
        assigned.sort_by_key(|a| (a.category_id.to_uppercase(), a.group_id.to_uppercase()));

        if assigned.is_empty() {
            return vec![LocationCatalogRow::bare(location.clone())];
        }

        assigned
            .into_iter()
            .map(|a| LocationCatalogRow {
                location: location.clone(),
                category_id: Some(a.category_id.clone()),
                group_id: Some(a.group_id.clone()),
                alias_id: a.row.alias_id.clone(),
            })
            .collect()
    }
}

fn office_matches(filter: Option<&str>, office: &str) -> bool {
    filter.map_or(true, |wanted| wanted.eq_ignore_ascii_case(office))
}

fn category_sort_key(row: &CategoryRow) -> (String, String) {
    (row.office_id.to_uppercase(), row.category_id.to_uppercase())
}

fn failed<'a, T: Send + 'a>(err: RepositoryError) -> RowStream<'a, T> {
    stream::iter(vec![Err(err)]).boxed()
}

fn rows<'a, T: Send + 'a>(rows: Vec<T>) -> RowStream<'a, T> {
    stream::iter(rows.into_iter().map(Ok)).boxed()
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    pub fn add_office(&self, office: OfficeRow) {
        self.data.write().offices.push(office);
    }

    /// Register a series. Readings are added with [`LocalRepository::add_values`].
    pub fn add_timeseries(&self, meta: TimeSeriesMetadataRow) {
        self.data.write().series.push(StoredSeries {
            meta,
            values: BTreeMap::new(),
        });
    }

    /// Store readings in the series' storage unit. Existing timestamps are overwritten.
    pub fn add_values(
        &self,
        office: &str,
        ts_id: &str,
        values: impl IntoIterator<Item = ValueRow>,
    ) -> RepositoryResult<usize> {
        let mut data = self.data.write();
        let series = data
            .series
            .iter_mut()
            .find(|s| {
                s.meta.office_id.eq_ignore_ascii_case(office)
                    && s.meta.ts_id.eq_ignore_ascii_case(ts_id)
            })
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    format!("time series {} not found", ts_id),
                    ErrorContext::new("add_values")
                        .with_entity("timeseries")
                        .with_entity_id(format!("{}/{}", office, ts_id)),
                )
            })?;

        let mut added = 0;
        for row in values {
            series.values.insert(
                row.date_time,
                StoredValue {
                    value: row.value,
                    quality_code: row.quality_code,
                },
            );
            added += 1;
        }
        Ok(added)
    }

    /// Register a linear conversion `to = from * factor + offset`.
    pub fn add_unit_conversion(&self, from: &str, to: &str, factor: f64, offset: f64) {
        self.data
            .write()
            .conversions
            .insert((from.to_string(), to.to_string()), (factor, offset));
    }

    pub fn add_location(&self, location: LocationRow) {
        self.data.write().locations.push(location);
    }

    pub fn add_location_category(&self, category: CategoryRow) {
        self.data.write().location_categories.push(category);
    }

    pub fn add_location_group(&self, group: LocationGroupRow) {
        self.data.write().location_groups.push(group);
    }

    /// Assign a location to a group. The group's office is the assignment's office.
    pub fn assign_location(&self, category_id: &str, group_id: &str, assignment: AssignmentRow) {
        self.data.write().assignments.push(StoredAssignment {
            office_id: assignment.office_id.clone(),
            category_id: category_id.to_string(),
            group_id: group_id.to_string(),
            row: assignment,
        });
    }

    pub fn add_timeseries_category(&self, category: CategoryRow) {
        self.data.write().timeseries_categories.push(category);
    }

    pub fn add_timeseries_group(&self, group: TimeSeriesGroupRow) {
        self.data.write().timeseries_groups.push(group);
    }

    /// Set the health status for testing connection failures.
    ///
    /// An unhealthy repository fails every query with a connection error.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
    }

    pub fn office_count(&self) -> usize {
        self.data.read().offices.len()
    }

    pub fn location_count(&self) -> usize {
        self.data.read().locations.len()
    }

    pub fn timeseries_count(&self) -> usize {
        self.data.read().series.len()
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeSeriesRepository for LocalRepository {
    async fn fetch_timeseries_metadata(
        &self,
        office: Option<&str>,
        ts_id: &str,
    ) -> RepositoryResult<Option<TimeSeriesMetadataRow>> {
        let data = self.data.read();
        data.ensure_healthy("fetch_timeseries_metadata")?;

        let mut matches: Vec<&TimeSeriesMetadataRow> = data
            .series
            .iter()
            .map(|s| &s.meta)
            .filter(|m| office_matches(office, &m.office_id) && m.ts_id.eq_ignore_ascii_case(ts_id))
            .collect();
        matches.sort_by_key(|m| m.key());
        Ok(matches.first().map(|m| (*m).clone()))
    }

    async fn count_values(
        &self,
        series: &TimeSeriesMetadataRow,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        let data = self.data.read();
        data.ensure_healthy("count_values")?;

        if begin > end {
            return Ok(0);
        }
        Ok(data
            .find_series(&series.office_id, &series.ts_id)
            .map_or(0, |s| s.values.range(begin..=end).count() as u64))
    }

    fn query_values<'a>(
        &'a self,
        series: &'a TimeSeriesMetadataRow,
        unit: &'a str,
        query: &'a ValuesQuery,
    ) -> RowStream<'a, ValueRow> {
        let data = self.data.read();
        if let Err(e) = data.ensure_healthy("query_values") {
            return failed(e);
        }

        let Some(stored) = data.find_series(&series.office_id, &series.ts_id) else {
            return rows(Vec::new());
        };
        let Some((factor, offset)) = data.conversion(&stored.meta.storage_unit, unit) else {
            return failed(RepositoryError::validation_with_context(
                format!(
                    "cannot convert from {} to {}",
                    stored.meta.storage_unit, unit
                ),
                ErrorContext::new("query_values")
                    .with_entity("timeseries")
                    .with_entity_id(&series.ts_id),
            ));
        };

        if query.begin > query.end {
            return rows(Vec::new());
        }
        let limit = query.limit.unwrap_or(usize::MAX);
        let page: Vec<ValueRow> = stored
            .values
            .range(query.begin..=query.end)
            .filter(|(t, _)| query.admits(t))
            .take(limit)
            .map(|(t, v)| ValueRow {
                date_time: *t,
                value: v.value.map(|x| x * factor + offset),
                quality_code: v.quality_code,
            })
            .collect();
        rows(page)
    }
}

#[async_trait]
impl CatalogRepository for LocalRepository {
    async fn count_timeseries(&self, office: Option<&str>) -> RepositoryResult<u64> {
        let data = self.data.read();
        data.ensure_healthy("count_timeseries")?;
        Ok(data
            .series
            .iter()
            .filter(|s| office_matches(office, &s.meta.office_id))
            .count() as u64)
    }

    fn query_timeseries_catalog<'a>(
        &'a self,
        query: &'a CatalogQuery,
    ) -> RowStream<'a, TimeSeriesCatalogRow> {
        let data = self.data.read();
        if let Err(e) = data.ensure_healthy("query_timeseries_catalog") {
            return failed(e);
        }

        let mut entries: Vec<TimeSeriesCatalogRow> = data
            .series
            .iter()
            .map(|s| TimeSeriesCatalogRow {
                office_id: s.meta.office_id.clone(),
                ts_id: s.meta.ts_id.clone(),
                units: s.meta.storage_unit.clone(),
                interval_minutes: s.meta.interval_minutes,
            })
            .filter(|row| query.admits(&row.key()))
            .collect();
        entries.sort_by_key(|row| row.key());
        if let Some(limit) = query.limit {
            entries.truncate(limit);
        }
        rows(entries)
    }

    async fn count_locations(&self, office: Option<&str>) -> RepositoryResult<u64> {
        let data = self.data.read();
        data.ensure_healthy("count_locations")?;
        Ok(data
            .locations
            .iter()
            .filter(|l| office_matches(office, &l.office_id))
            .count() as u64)
    }

    fn query_location_catalog<'a>(
        &'a self,
        query: &'a CatalogQuery,
    ) -> RowStream<'a, LocationCatalogRow> {
        let data = self.data.read();
        if let Err(e) = data.ensure_healthy("query_location_catalog") {
            return failed(e);
        }

        let joined: Vec<LocationCatalogRow> = data
            .catalog_locations(query)
            .into_iter()
            .flat_map(|loc| data.joined_location_rows(loc))
            .collect();
        rows(joined)
    }

    async fn fetch_location(
        &self,
        office: Option<&str>,
        location_id: &str,
    ) -> RepositoryResult<Vec<LocationCatalogRow>> {
        let data = self.data.read();
        data.ensure_healthy("fetch_location")?;

        let mut matches: Vec<&LocationRow> = data
            .locations
            .iter()
            .filter(|l| {
                office_matches(office, &l.office_id) && l.location_id.eq_ignore_ascii_case(location_id)
            })
            .collect();
        matches.sort_by_key(|l| l.key());
        Ok(matches
            .first()
            .map(|loc| data.joined_location_rows(loc))
            .unwrap_or_default())
    }
}

#[async_trait]
impl ReferenceRepository for LocalRepository {
    async fn list_offices(&self) -> RepositoryResult<Vec<OfficeRow>> {
        let data = self.data.read();
        data.ensure_healthy("list_offices")?;
        let mut offices = data.offices.clone();
        offices.sort_by_key(|o| o.office_id.to_uppercase());
        Ok(offices)
    }

    async fn fetch_office(&self, office_id: &str) -> RepositoryResult<Option<OfficeRow>> {
        let data = self.data.read();
        data.ensure_healthy("fetch_office")?;
        Ok(data
            .offices
            .iter()
            .find(|o| o.office_id.eq_ignore_ascii_case(office_id))
            .cloned())
    }

    async fn list_location_categories(
        &self,
        office: Option<&str>,
    ) -> RepositoryResult<Vec<CategoryRow>> {
        let data = self.data.read();
        data.ensure_healthy("list_location_categories")?;
        let mut categories: Vec<CategoryRow> = data
            .location_categories
            .iter()
            .filter(|c| office_matches(office, &c.office_id))
            .cloned()
            .collect();
        categories.sort_by_key(category_sort_key);
        Ok(categories)
    }

    async fn fetch_location_category(
        &self,
        office: Option<&str>,
        category_id: &str,
    ) -> RepositoryResult<Option<CategoryRow>> {
        let categories = self.list_location_categories(office).await?;
        Ok(categories
            .into_iter()
            .find(|c| c.category_id.eq_ignore_ascii_case(category_id)))
    }

    async fn list_location_groups(
        &self,
        office: Option<&str>,
    ) -> RepositoryResult<Vec<LocationGroupRow>> {
        let data = self.data.read();
        data.ensure_healthy("list_location_groups")?;
        let mut groups: Vec<LocationGroupRow> = data
            .location_groups
            .iter()
            .filter(|g| office_matches(office, &g.office_id))
            .cloned()
            .collect();
        groups.sort_by_key(|g| {
            (
                g.office_id.to_uppercase(),
                g.category.category_id.to_uppercase(),
                g.group_id.to_uppercase(),
            )
        });
        Ok(groups)
    }

    fn query_location_group<'a>(
        &'a self,
        office: &'a str,
        category_id: &'a str,
        group_id: &'a str,
    ) -> RowStream<'a, LocationGroupAssignmentRow> {
        let data = self.data.read();
        if let Err(e) = data.ensure_healthy("query_location_group") {
            return failed(e);
        }

        let Some(group) = data.location_groups.iter().find(|g| {
            g.office_id.eq_ignore_ascii_case(office)
                && g.category.category_id.eq_ignore_ascii_case(category_id)
                && g.group_id.eq_ignore_ascii_case(group_id)
        }) else {
            return rows(Vec::new());
        };

        let mut assigned: Vec<&AssignmentRow> = data
            .assignments
            .iter()
            .filter(|a| a.belongs_to(office, category_id, group_id))
            .map(|a| &a.row)
            .collect();
        // Nulls sort last, as in the database.
        assigned.sort_by_key(|a| (a.attribute.is_none(), a.attribute, a.location_id.to_uppercase()));

        if assigned.is_empty() {
            return rows(vec![LocationGroupAssignmentRow {
                group: group.clone(),
                assignment: None,
            }]);
        }

        rows(assigned
            .into_iter()
            .map(|a| LocationGroupAssignmentRow {
                group: group.clone(),
                assignment: Some(a.clone()),
            })
            .collect())
    }

    async fn list_timeseries_categories(
        &self,
        office: Option<&str>,
    ) -> RepositoryResult<Vec<CategoryRow>> {
        let data = self.data.read();
        data.ensure_healthy("list_timeseries_categories")?;
        let mut categories: Vec<CategoryRow> = data
            .timeseries_categories
            .iter()
            .filter(|c| office_matches(office, &c.office_id))
            .cloned()
            .collect();
        categories.sort_by_key(category_sort_key);
        Ok(categories)
    }

    async fn fetch_timeseries_category(
        &self,
        office: Option<&str>,
        category_id: &str,
    ) -> RepositoryResult<Option<CategoryRow>> {
        let categories = self.list_timeseries_categories(office).await?;
        Ok(categories
            .into_iter()
            .find(|c| c.category_id.eq_ignore_ascii_case(category_id)))
    }

    async fn list_timeseries_groups(
        &self,
        office: Option<&str>,
        category_id: Option<&str>,
        group_id: Option<&str>,
    ) -> RepositoryResult<Vec<TimeSeriesGroupRow>> {
        let data = self.data.read();
        data.ensure_healthy("list_timeseries_groups")?;
        let mut groups: Vec<TimeSeriesGroupRow> = data
            .timeseries_groups
            .iter()
            .filter(|g| office_matches(office, &g.office_id))
            .filter(|g| {
                category_id.map_or(true, |c| g.category.category_id.eq_ignore_ascii_case(c))
            })
            .filter(|g| group_id.map_or(true, |id| g.group_id.eq_ignore_ascii_case(id)))
            .cloned()
            .collect();
        groups.sort_by_key(|g| {
            (
                g.office_id.to_uppercase(),
                g.category.category_id.to_uppercase(),
                g.group_id.to_uppercase(),
            )
        });
        Ok(groups)
    }
}

#[async_trait]
impl FullRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }
}

//! Repository traits for the retrieval core.
//!
//! Each trait covers one resource family. Count methods feed the `total` of a first page;
//! query methods return a bounded stream of rows in the order the page is built from.
//!
//! # Thread Safety
//! Implementations must be `Send + Sync` to work with async Rust.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

pub mod error;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

use super::models::{
    CategoryRow, LocationCatalogRow, LocationGroupAssignmentRow, LocationGroupRow, OfficeRow,
    TimeSeriesCatalogRow, TimeSeriesGroupRow, TimeSeriesMetadataRow, ValueRow,
};
use crate::paging::{CatalogQuery, ValuesQuery};

/// Rows of one page, in page order.
pub type RowStream<'a, T> = BoxStream<'a, RepositoryResult<T>>;

/// Readings of a single time series.
#[async_trait]
pub trait TimeSeriesRepository: Send + Sync {
    /// Look up a series by id, case-insensitively.
    ///
    /// Without an office, the first matching series in catalog order is returned.
    ///
    /// # Returns
    /// * `Ok(None)` - If no series matches
    async fn fetch_timeseries_metadata(
        &self,
        office: Option<&str>,
        ts_id: &str,
    ) -> RepositoryResult<Option<TimeSeriesMetadataRow>>;

    /// Count readings with `begin <= t <= end`.
    async fn count_values(
        &self,
        series: &TimeSeriesMetadataRow,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<u64>;

    /// Readings admitted by `query`, ascending by timestamp, converted to `unit`.
    ///
    /// Fails with `ValidationError` when the stored unit cannot be converted to `unit`.
    fn query_values<'a>(
        &'a self,
        series: &'a TimeSeriesMetadataRow,
        unit: &'a str,
        query: &'a ValuesQuery,
    ) -> RowStream<'a, ValueRow>;
}

/// Time-series and location catalogs.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn count_timeseries(&self, office: Option<&str>) -> RepositoryResult<u64>;

    /// Catalog rows ordered by `(UPPER(ts_id), UPPER(office))`.
    fn query_timeseries_catalog<'a>(
        &'a self,
        query: &'a CatalogQuery,
    ) -> RowStream<'a, TimeSeriesCatalogRow>;

    async fn count_locations(&self, office: Option<&str>) -> RepositoryResult<u64>;

    /// Locations left-joined with their group assignments.
    ///
    /// `query.limit` bounds the number of distinct locations. Every assignment row of
    /// those locations is returned, grouped by location in catalog order.
    fn query_location_catalog<'a>(
        &'a self,
        query: &'a CatalogQuery,
    ) -> RowStream<'a, LocationCatalogRow>;

    /// All joined rows of one location; empty when the location does not exist.
    async fn fetch_location(
        &self,
        office: Option<&str>,
        location_id: &str,
    ) -> RepositoryResult<Vec<LocationCatalogRow>>;
}

/// Offices, categories and groups.
///
/// Every method takes the office filter explicitly; `None` means all offices.
#[async_trait]
pub trait ReferenceRepository: Send + Sync {
    async fn list_offices(&self) -> RepositoryResult<Vec<OfficeRow>>;

    async fn fetch_office(&self, office_id: &str) -> RepositoryResult<Option<OfficeRow>>;

    async fn list_location_categories(
        &self,
        office: Option<&str>,
    ) -> RepositoryResult<Vec<CategoryRow>>;

    async fn fetch_location_category(
        &self,
        office: Option<&str>,
        category_id: &str,
    ) -> RepositoryResult<Option<CategoryRow>>;

    async fn list_location_groups(
        &self,
        office: Option<&str>,
    ) -> RepositoryResult<Vec<LocationGroupRow>>;

    /// One group left-joined with its assigned locations, ordered by attribute.
    fn query_location_group<'a>(
        &'a self,
        office: &'a str,
        category_id: &'a str,
        group_id: &'a str,
    ) -> RowStream<'a, LocationGroupAssignmentRow>;

    async fn list_timeseries_categories(
        &self,
        office: Option<&str>,
    ) -> RepositoryResult<Vec<CategoryRow>>;

    async fn fetch_timeseries_category(
        &self,
        office: Option<&str>,
        category_id: &str,
    ) -> RepositoryResult<Option<CategoryRow>>;

    async fn list_timeseries_groups(
        &self,
        office: Option<&str>,
        category_id: Option<&str>,
        group_id: Option<&str>,
    ) -> RepositoryResult<Vec<TimeSeriesGroupRow>>;
}

/// Everything the retrieval facade needs from a backend.
#[async_trait]
pub trait FullRepository: TimeSeriesRepository + CatalogRepository + ReferenceRepository {
    /// Check if the backend is reachable.
    ///
    /// # Returns
    /// - `Ok(true)` if the backend is healthy
    /// - `Ok(false)` if it is unhealthy but no error occurred
    async fn health_check(&self) -> RepositoryResult<bool>;
}

//! Postgres repository implementation using Diesel.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Per-connection `statement_timeout`
//! - Automatic migration execution
//!
//! Every trait call checks one pooled connection out inside `spawn_blocking` and returns
//! it when the closure finishes. Failures are reported as-is; nothing is retried.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_STATEMENT_TIMEOUT_MS`: Statement timeout in milliseconds (default: none)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sql_query;
use diesel::sql_types::Text;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task;

use crate::db::models::{
    AssignmentRow, CategoryRow, LocationCatalogRow, LocationGroupAssignmentRow, LocationGroupRow,
    LocationRow, OfficeRow, TimeSeriesCatalogRow, TimeSeriesGroupRow, TimeSeriesMetadataRow,
    ValueRow,
};
use crate::db::repository::{
    CatalogRepository, ErrorContext, FullRepository, ReferenceRepository, RepositoryError,
    RepositoryResult, RowStream, TimeSeriesRepository,
};
use crate::paging::{CatalogQuery, Resume, ValuesQuery};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

diesel::define_sql_function! {
    fn upper(x: Text) -> Text;
}

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// `statement_timeout` applied to every pooled connection
    pub statement_timeout_ms: Option<u64>,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            statement_timeout_ms: None,
        }
    }
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let max_pool_size = std::env::var("PG_POOL_MAX")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let min_pool_size = std::env::var("PG_POOL_MIN")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);

        let connection_timeout_sec = std::env::var("PG_CONN_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let idle_timeout_sec = std::env::var("PG_IDLE_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(600);

        let statement_timeout_ms = std::env::var("PG_STATEMENT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0);

        Ok(Self {
            database_url,
            max_pool_size,
            min_pool_size,
            connection_timeout_sec,
            idle_timeout_sec,
            statement_timeout_ms,
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Sets `statement_timeout` whenever the pool opens a connection.
#[derive(Debug, Clone, Copy)]
struct StatementTimeout(u64);

impl CustomizeConnection<PgConnection, diesel::r2d2::Error> for StatementTimeout {
    fn on_acquire(&self, conn: &mut PgConnection) -> Result<(), diesel::r2d2::Error> {
        sql_query(format!("SET statement_timeout = {}", self.0))
            .execute(conn)
            .map(|_| ())
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Diesel-backed repository for Postgres.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let mut builder = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true);
        if let Some(ms) = config.statement_timeout_ms {
            builder = builder.connection_customizer(Box::new(StatementTimeout(ms)));
        }

        let pool = builder.build(manager).map_err(|e| {
            RepositoryError::connection_with_context(
                e.to_string(),
                ErrorContext::new("create_pool")
                    .with_details(format!("max_size={}", config.max_pool_size)),
            )
        })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        log::info!(
            "postgres repository ready (pool max={}, statement_timeout_ms={:?})",
            config.max_pool_size,
            config.statement_timeout_ms
        );
        Ok(Self { pool })
    }

    /// Run pending database migrations.
    fn run_migrations(conn: &mut PgConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;

        Ok(())
    }

    /// Run `f` on one pooled connection in the blocking pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();

        task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new(operation).with_details("get_connection"),
                )
            })?;
            f(&mut conn).map_err(|e| e.with_operation(operation))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }

    /// Stream a page loaded in one blocking call.
    fn page_stream<'a, T, F>(&'a self, operation: &'static str, f: F) -> RowStream<'a, T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<Vec<T>> + Send + 'static,
    {
        stream::once(self.with_conn(operation, f))
            .map_ok(|rows| stream::iter(rows.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn find_series(
    conn: &mut PgConnection,
    office: Option<&str>,
    ts_id: &str,
) -> RepositoryResult<Option<TimeSeriesRecord>> {
    let mut q = timeseries::table
        .select(TimeSeriesRecord::as_select())
        .filter(upper(timeseries::ts_id).eq(ts_id.to_uppercase()))
        .into_boxed();
    if let Some(office) = office {
        q = q.filter(upper(timeseries::office_id).eq(office.to_uppercase()));
    }
    q.order((
        upper(timeseries::ts_id).asc(),
        upper(timeseries::office_id).asc(),
        timeseries::ts_id.asc(),
        timeseries::office_id.asc(),
    ))
    .first(conn)
    .optional()
    .map_err(map_diesel_error)
}

fn unit_conversion(conn: &mut PgConnection, from: &str, to: &str) -> RepositoryResult<(f64, f64)> {
    if from == to {
        return Ok((1.0, 0.0));
    }
    unit_conversions::table
        .filter(unit_conversions::from_unit.eq(from))
        .filter(unit_conversions::to_unit.eq(to))
        .select((unit_conversions::factor, unit_conversions::offset_value))
        .first::<(f64, f64)>(conn)
        .optional()
        .map_err(map_diesel_error)?
        .ok_or_else(|| {
            RepositoryError::validation_with_context(
                format!("cannot convert from {} to {}", from, to),
                ErrorContext::new("unit_conversion").with_entity("unit"),
            )
        })
}

fn load_values(
    conn: &mut PgConnection,
    series: &TimeSeriesMetadataRow,
    unit: &str,
    query: &ValuesQuery,
) -> RepositoryResult<Vec<ValueRow>> {
    let Some(record) = find_series(conn, Some(&series.office_id), &series.ts_id)? else {
        return Ok(Vec::new());
    };
    let (factor, offset) = unit_conversion(conn, &record.storage_unit, unit)?;

    let mut q = timeseries_values::table
        .select(ValueRecord::as_select())
        .filter(timeseries_values::ts_code.eq(record.ts_code))
        .filter(timeseries_values::date_time.le(query.end))
        .into_boxed();
    q = match &query.after {
        Resume::Start => q.filter(timeseries_values::date_time.ge(query.begin)),
        Resume::After(key) => q.filter(timeseries_values::date_time.gt(*key)),
    };
    q = q.order(timeseries_values::date_time.asc());
    if let Some(limit) = query.limit {
        q = q.limit(sql_limit(limit));
    }

    let records: Vec<ValueRecord> = q.load(conn).map_err(map_diesel_error)?;
    Ok(records
        .into_iter()
        .map(|r| r.converted(factor, offset))
        .collect())
}

fn load_timeseries_catalog(
    conn: &mut PgConnection,
    query: &CatalogQuery,
) -> RepositoryResult<Vec<TimeSeriesCatalogRow>> {
    let mut q = timeseries::table
        .select(TimeSeriesRecord::as_select())
        .into_boxed();
    if let Some(office) = &query.office {
        q = q.filter(upper(timeseries::office_id).eq(office.to_uppercase()));
    }
    if let Resume::After(key) = &query.after {
        let (upper_id, upper_office) = key.sort_key();
        let exact = timeseries::ts_id
            .gt(key.id.clone())
            .or(timeseries::ts_id
                .eq(key.id.clone())
                .and(timeseries::office_id.gt(key.office.clone())));
        let same_upper_id = upper(timeseries::office_id)
            .gt(upper_office.clone())
            .or(upper(timeseries::office_id).eq(upper_office).and(exact));
        q = q.filter(
            upper(timeseries::ts_id)
                .gt(upper_id.clone())
                .or(upper(timeseries::ts_id).eq(upper_id).and(same_upper_id)),
        );
    }
    q = q.order((
        upper(timeseries::ts_id).asc(),
        upper(timeseries::office_id).asc(),
        timeseries::ts_id.asc(),
        timeseries::office_id.asc(),
    ));
    if let Some(limit) = query.limit {
        q = q.limit(sql_limit(limit));
    }

    let records: Vec<TimeSeriesRecord> = q.load(conn).map_err(map_diesel_error)?;
    Ok(records.into_iter().map(Into::into).collect())
}

fn load_catalog_locations(
    conn: &mut PgConnection,
    query: &CatalogQuery,
) -> RepositoryResult<Vec<LocationRecord>> {
    let mut q = locations::table
        .select(LocationRecord::as_select())
        .into_boxed();
    if let Some(office) = &query.office {
        q = q.filter(upper(locations::office_id).eq(office.to_uppercase()));
    }
    if let Resume::After(key) = &query.after {
        let (upper_id, upper_office) = key.sort_key();
        let exact = locations::location_id
            .gt(key.id.clone())
            .or(locations::location_id
                .eq(key.id.clone())
                .and(locations::office_id.gt(key.office.clone())));
        let same_upper_id = upper(locations::office_id)
            .gt(upper_office.clone())
            .or(upper(locations::office_id).eq(upper_office).and(exact));
        q = q.filter(
            upper(locations::location_id)
                .gt(upper_id.clone())
                .or(upper(locations::location_id).eq(upper_id).and(same_upper_id)),
        );
    }
    q = q.order((
        upper(locations::location_id).asc(),
        upper(locations::office_id).asc(),
        locations::location_id.asc(),
        locations::office_id.asc(),
    ));
    if let Some(limit) = query.limit {
        q = q.limit(sql_limit(limit));
    }

    q.load(conn).map_err(map_diesel_error)
}

/// Left-join already limited locations with their group assignments.
fn join_assignments(
    conn: &mut PgConnection,
    records: Vec<LocationRecord>,
) -> RepositoryResult<Vec<LocationCatalogRow>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let offices: Vec<String> = records.iter().map(|r| r.office_id.to_uppercase()).collect();
    let ids: Vec<String> = records.iter().map(|r| r.location_id.to_uppercase()).collect();
    let assignments: Vec<AssignmentRecord> = location_group_assignments::table
        .select(AssignmentRecord::as_select())
        .filter(upper(location_group_assignments::office_id).eq_any(offices))
        .filter(upper(location_group_assignments::location_id).eq_any(ids))
        .order((
            upper(location_group_assignments::category_id).asc(),
            upper(location_group_assignments::group_id).asc(),
        ))
        .load(conn)
        .map_err(map_diesel_error)?;

    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let location: LocationRow = record.into();
        let matched: Vec<&AssignmentRecord> = assignments
            .iter()
            .filter(|a| location.is_assigned_as(&a.office_id, &a.location_id))
            .collect();

        if matched.is_empty() {
            out.push(LocationCatalogRow::bare(location));
            continue;
        }
        for a in matched {
            out.push(LocationCatalogRow {
                location: location.clone(),
                category_id: Some(a.category_id.clone()),
                group_id: Some(a.group_id.clone()),
                alias_id: a.alias_id.clone(),
            });
        }
    }
    Ok(out)
}

fn load_location_categories(
    conn: &mut PgConnection,
    office: Option<&str>,
) -> RepositoryResult<Vec<CategoryRow>> {
    let mut q = location_categories::table
        .select(LocationCategoryRecord::as_select())
        .into_boxed();
    if let Some(office) = office {
        q = q.filter(upper(location_categories::office_id).eq(office.to_uppercase()));
    }
    let records: Vec<LocationCategoryRecord> = q
        .order((
            upper(location_categories::office_id).asc(),
            upper(location_categories::category_id).asc(),
        ))
        .load(conn)
        .map_err(map_diesel_error)?;
    Ok(records.into_iter().map(Into::into).collect())
}

fn load_timeseries_categories(
    conn: &mut PgConnection,
    office: Option<&str>,
) -> RepositoryResult<Vec<CategoryRow>> {
    let mut q = timeseries_categories::table
        .select(TimeSeriesCategoryRecord::as_select())
        .into_boxed();
    if let Some(office) = office {
        q = q.filter(upper(timeseries_categories::office_id).eq(office.to_uppercase()));
    }
    let records: Vec<TimeSeriesCategoryRecord> = q
        .order((
            upper(timeseries_categories::office_id).asc(),
            upper(timeseries_categories::category_id).asc(),
        ))
        .load(conn)
        .map_err(map_diesel_error)?;
    Ok(records.into_iter().map(Into::into).collect())
}

fn category_index(categories: Vec<CategoryRow>) -> HashMap<(String, String), CategoryRow> {
    categories
        .into_iter()
        .map(|c| ((c.office_id.clone(), c.category_id.clone()), c))
        .collect()
}

fn load_location_group(
    conn: &mut PgConnection,
    office: &str,
    category_id: &str,
    group_id: &str,
) -> RepositoryResult<Vec<LocationGroupAssignmentRow>> {
    let group: Option<LocationGroupRecord> = location_groups::table
        .select(LocationGroupRecord::as_select())
        .filter(upper(location_groups::office_id).eq(office.to_uppercase()))
        .filter(upper(location_groups::category_id).eq(category_id.to_uppercase()))
        .filter(upper(location_groups::group_id).eq(group_id.to_uppercase()))
        .first(conn)
        .optional()
        .map_err(map_diesel_error)?;
    let Some(group) = group else {
        return Ok(Vec::new());
    };

    let category = location_categories::table
        .select(LocationCategoryRecord::as_select())
        .filter(location_categories::office_id.eq(&group.office_id))
        .filter(location_categories::category_id.eq(&group.category_id))
        .first(conn)
        .optional()
        .map_err(map_diesel_error)?
        .map(CategoryRow::from);

    // Postgres sorts NULL attributes last in ascending order.
    let assignments: Vec<AssignmentRecord> = location_group_assignments::table
        .select(AssignmentRecord::as_select())
        .filter(location_group_assignments::office_id.eq(&group.office_id))
        .filter(location_group_assignments::category_id.eq(&group.category_id))
        .filter(location_group_assignments::group_id.eq(&group.group_id))
        .order((
            location_group_assignments::attribute.asc(),
            upper(location_group_assignments::location_id).asc(),
        ))
        .load(conn)
        .map_err(map_diesel_error)?;

    let group_row = group.into_row(category);
    if assignments.is_empty() {
        return Ok(vec![LocationGroupAssignmentRow {
            group: group_row,
            assignment: None,
        }]);
    }
    Ok(assignments
        .into_iter()
        .map(|a| LocationGroupAssignmentRow {
            group: group_row.clone(),
            assignment: Some(AssignmentRow::from(a)),
        })
        .collect())
}

#[async_trait]
impl TimeSeriesRepository for PostgresRepository {
    async fn fetch_timeseries_metadata(
        &self,
        office: Option<&str>,
        ts_id: &str,
    ) -> RepositoryResult<Option<TimeSeriesMetadataRow>> {
        let office = office.map(str::to_string);
        let ts_id = ts_id.to_string();
        self.with_conn("fetch_timeseries_metadata", move |conn| {
            Ok(find_series(conn, office.as_deref(), &ts_id)?.map(Into::into))
        })
        .await
    }

    async fn count_values(
        &self,
        series: &TimeSeriesMetadataRow,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        let series = series.clone();
        self.with_conn("count_values", move |conn| {
            let Some(record) = find_series(conn, Some(&series.office_id), &series.ts_id)? else {
                return Ok(0);
            };
            let count: i64 = timeseries_values::table
                .filter(timeseries_values::ts_code.eq(record.ts_code))
                .filter(timeseries_values::date_time.ge(begin))
                .filter(timeseries_values::date_time.le(end))
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    fn query_values<'a>(
        &'a self,
        series: &'a TimeSeriesMetadataRow,
        unit: &'a str,
        query: &'a ValuesQuery,
    ) -> RowStream<'a, ValueRow> {
        let series = series.clone();
        let unit = unit.to_string();
        let query = query.clone();
        self.page_stream("query_values", move |conn| {
            load_values(conn, &series, &unit, &query)
        })
    }
}

#[async_trait]
impl CatalogRepository for PostgresRepository {
    async fn count_timeseries(&self, office: Option<&str>) -> RepositoryResult<u64> {
        let office = office.map(str::to_uppercase);
        self.with_conn("count_timeseries", move |conn| {
            let count: i64 = match office {
                Some(office) => timeseries::table
                    .filter(upper(timeseries::office_id).eq(office))
                    .count()
                    .get_result(conn),
                None => timeseries::table.count().get_result(conn),
            }
            .map_err(map_diesel_error)?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    fn query_timeseries_catalog<'a>(
        &'a self,
        query: &'a CatalogQuery,
    ) -> RowStream<'a, TimeSeriesCatalogRow> {
        let query = query.clone();
        self.page_stream("query_timeseries_catalog", move |conn| {
            load_timeseries_catalog(conn, &query)
        })
    }

    async fn count_locations(&self, office: Option<&str>) -> RepositoryResult<u64> {
        let office = office.map(str::to_uppercase);
        self.with_conn("count_locations", move |conn| {
            let count: i64 = match office {
                Some(office) => locations::table
                    .filter(upper(locations::office_id).eq(office))
                    .count()
                    .get_result(conn),
                None => locations::table.count().get_result(conn),
            }
            .map_err(map_diesel_error)?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    fn query_location_catalog<'a>(
        &'a self,
        query: &'a CatalogQuery,
    ) -> RowStream<'a, LocationCatalogRow> {
        let query = query.clone();
        self.page_stream("query_location_catalog", move |conn| {
            let records = load_catalog_locations(conn, &query)?;
            join_assignments(conn, records)
        })
    }

    async fn fetch_location(
        &self,
        office: Option<&str>,
        location_id: &str,
    ) -> RepositoryResult<Vec<LocationCatalogRow>> {
        let office = office.map(str::to_uppercase);
        let location_id = location_id.to_uppercase();
        self.with_conn("fetch_location", move |conn| {
            let mut q = locations::table
                .select(LocationRecord::as_select())
                .filter(upper(locations::location_id).eq(location_id))
                .into_boxed();
            if let Some(office) = office {
                q = q.filter(upper(locations::office_id).eq(office));
            }
            let records: Vec<LocationRecord> = q
                .order(upper(locations::office_id).asc())
                .limit(1)
                .load(conn)
                .map_err(map_diesel_error)?;
            join_assignments(conn, records)
        })
        .await
    }
}

#[async_trait]
impl ReferenceRepository for PostgresRepository {
    async fn list_offices(&self) -> RepositoryResult<Vec<OfficeRow>> {
        self.with_conn("list_offices", |conn| {
            let records: Vec<OfficeRecord> = offices::table
                .select(OfficeRecord::as_select())
                .order(upper(offices::office_id).asc())
                .load(conn)
                .map_err(map_diesel_error)?;
            Ok(records.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn fetch_office(&self, office_id: &str) -> RepositoryResult<Option<OfficeRow>> {
        let office_id = office_id.to_uppercase();
        self.with_conn("fetch_office", move |conn| {
            let record: Option<OfficeRecord> = offices::table
                .select(OfficeRecord::as_select())
                .filter(upper(offices::office_id).eq(office_id))
                .first(conn)
                .optional()
                .map_err(map_diesel_error)?;
            Ok(record.map(Into::into))
        })
        .await
    }

    async fn list_location_categories(
        &self,
        office: Option<&str>,
    ) -> RepositoryResult<Vec<CategoryRow>> {
        let office = office.map(str::to_string);
        self.with_conn("list_location_categories", move |conn| {
            load_location_categories(conn, office.as_deref())
        })
        .await
    }

    async fn fetch_location_category(
        &self,
        office: Option<&str>,
        category_id: &str,
    ) -> RepositoryResult<Option<CategoryRow>> {
        let office = office.map(str::to_string);
        let category_id = category_id.to_string();
        self.with_conn("fetch_location_category", move |conn| {
            Ok(load_location_categories(conn, office.as_deref())?
                .into_iter()
                .find(|c| c.category_id.eq_ignore_ascii_case(&category_id)))
        })
        .await
    }

    async fn list_location_groups(
        &self,
        office: Option<&str>,
    ) -> RepositoryResult<Vec<LocationGroupRow>> {
        let office = office.map(str::to_string);
        self.with_conn("list_location_groups", move |conn| {
            let mut q = location_groups::table
                .select(LocationGroupRecord::as_select())
                .into_boxed();
            if let Some(office) = &office {
                q = q.filter(upper(location_groups::office_id).eq(office.to_uppercase()));
            }
            let records: Vec<LocationGroupRecord> = q
                .order((
                    upper(location_groups::office_id).asc(),
                    upper(location_groups::category_id).asc(),
                    upper(location_groups::group_id).asc(),
                ))
                .load(conn)
                .map_err(map_diesel_error)?;

            let categories = category_index(load_location_categories(conn, office.as_deref())?);
            Ok(records
                .into_iter()
                .map(|g| {
                    let category = categories
                        .get(&(g.office_id.clone(), g.category_id.clone()))
                        .cloned();
                    g.into_row(category)
                })
                .collect())
        })
        .await
    }

    fn query_location_group<'a>(
        &'a self,
        office: &'a str,
        category_id: &'a str,
        group_id: &'a str,
    ) -> RowStream<'a, LocationGroupAssignmentRow> {
        let office = office.to_string();
        let category_id = category_id.to_string();
        let group_id = group_id.to_string();
        self.page_stream("query_location_group", move |conn| {
            load_location_group(conn, &office, &category_id, &group_id)
        })
    }

    async fn list_timeseries_categories(
        &self,
        office: Option<&str>,
    ) -> RepositoryResult<Vec<CategoryRow>> {
        let office = office.map(str::to_string);
        self.with_conn("list_timeseries_categories", move |conn| {
            load_timeseries_categories(conn, office.as_deref())
        })
        .await
    }

    async fn fetch_timeseries_category(
        &self,
        office: Option<&str>,
        category_id: &str,
    ) -> RepositoryResult<Option<CategoryRow>> {
        let office = office.map(str::to_string);
        let category_id = category_id.to_string();
        self.with_conn("fetch_timeseries_category", move |conn| {
            Ok(load_timeseries_categories(conn, office.as_deref())?
                .into_iter()
                .find(|c| c.category_id.eq_ignore_ascii_case(&category_id)))
        })
        .await
    }

    async fn list_timeseries_groups(
        &self,
        office: Option<&str>,
        category_id: Option<&str>,
        group_id: Option<&str>,
    ) -> RepositoryResult<Vec<TimeSeriesGroupRow>> {
        let office = office.map(str::to_string);
        let category_id = category_id.map(str::to_uppercase);
        let group_id = group_id.map(str::to_uppercase);
        self.with_conn("list_timeseries_groups", move |conn| {
            let mut q = timeseries_groups::table
                .select(TimeSeriesGroupRecord::as_select())
                .into_boxed();
            if let Some(office) = &office {
                q = q.filter(upper(timeseries_groups::office_id).eq(office.to_uppercase()));
            }
            if let Some(category_id) = category_id {
                q = q.filter(upper(timeseries_groups::category_id).eq(category_id));
            }
            if let Some(group_id) = group_id {
                q = q.filter(upper(timeseries_groups::group_id).eq(group_id));
            }
            let records: Vec<TimeSeriesGroupRecord> = q
                .order((
                    upper(timeseries_groups::office_id).asc(),
                    upper(timeseries_groups::category_id).asc(),
                    upper(timeseries_groups::group_id).asc(),
                ))
                .load(conn)
                .map_err(map_diesel_error)?;

            let categories = category_index(load_timeseries_categories(conn, office.as_deref())?);
            Ok(records
                .into_iter()
                .map(|g| {
                    let category = categories
                        .get(&(g.office_id.clone(), g.category_id.clone()))
                        .cloned();
                    g.into_row(category)
                })
                .collect())
        })
        .await
    }
}

#[async_trait]
impl FullRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn("health_check", |conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }
}

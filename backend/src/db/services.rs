//! Retrieval facade.
//!
//! High-level operations that work with any [`FullRepository`]. Each paged operation
//! decodes the incoming cursor, builds a bounded query, drains the backend stream and
//! re-encodes a cursor for the next page.
//!
//! A page fetches at most `page_size + 1` rows. The extra row only signals that another
//! page exists and is never returned.

use chrono::{DateTime, Utc};
use futures::TryStreamExt;

use super::models::{
    CategoryRow, LocationCatalogRow, LocationRow, TimeSeriesCatalogRow, TimeSeriesMetadataRow,
    ValueRow,
};
use super::repository::{
    CatalogRepository, FullRepository, ReferenceRepository, RepositoryError, TimeSeriesRepository,
};
use crate::api::{
    LocationAlias, LocationCatalog, LocationCatalogEntry, LocationCategory, LocationGroup, Office,
    TimeSeries, TimeSeriesCatalog, TimeSeriesCatalogEntry, TimeSeriesCategory, TimeSeriesGroup,
    TimeSeriesValue, UnitSystem, DEFAULT_QUALITY_CODE,
};
use crate::models::{normalize, TimeError, ZonedInstant};
use crate::paging::{
    build_catalog, build_values, fold, fold_stream, instant_key, next_token, split_page,
    CursorError, Folded, PageKind, PageToken,
};

/// How an outer layer should report a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    ClientInput,
    NotFound,
    Server,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("malformed page cursor: {0}")]
    MalformedCursor(CursorError),

    #[error("invalid time window: {0}")]
    InvalidTime(TimeError),

    #[error("invalid value '{value}' for parameter '{name}'")]
    InvalidParameter { name: String, value: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("backend error: {0}")]
    Backend(RepositoryError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::MalformedCursor(_)
            | ServiceError::InvalidTime(_)
            | ServiceError::InvalidParameter { .. } => ErrorClass::ClientInput,
            ServiceError::NotFound { .. } => ErrorClass::NotFound,
            ServiceError::Backend(_) => ErrorClass::Server,
        }
    }

    /// Message safe to hand to a client. Backend details stay in the logs.
    pub fn public_message(&self) -> String {
        match self.class() {
            ErrorClass::Server => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<CursorError> for ServiceError {
    fn from(err: CursorError) -> Self {
        log::warn!("rejected page cursor: {}", err);
        ServiceError::MalformedCursor(err)
    }
}

impl From<TimeError> for ServiceError {
    fn from(err: TimeError) -> Self {
        log::warn!("rejected time window: {}", err);
        ServiceError::InvalidTime(err)
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        log::error!("backend failure: {}", err);
        ServiceError::Backend(err)
    }
}

/// Parameters of a time-series page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSeriesRequest {
    pub name: String,
    pub office: Option<String>,
    /// `SI`, `EN` or a literal unit id. Absent means `EN`.
    pub units: Option<String>,
    pub begin: Option<String>,
    pub end: Option<String>,
    pub timezone: Option<String>,
    /// Cursor of the requested page; absent for the first page.
    pub page: Option<String>,
    /// Zero or negative returns the series metadata without readings.
    pub page_size: i32,
}

/// Parameters of a catalog page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRequest {
    pub office: Option<String>,
    pub page: Option<String>,
    /// Zero or negative returns every entry on one page.
    pub page_size: i32,
    pub unit_system: UnitSystem,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn decode_token(page: Option<&str>, kind: PageKind) -> ServiceResult<Option<PageToken>> {
    let Some(page) = non_blank(page) else {
        return Ok(None);
    };
    let token = PageToken::decode(page, kind)?;
    log::debug!(
        "decoded {} cursor: key='{}' total={:?} size={}",
        kind,
        token.resume_key,
        token.total,
        token.page_size
    );
    Ok(Some(token))
}

/// Unit the readings are requested in.
fn resolve_unit(units: Option<&str>, series: &TimeSeriesMetadataRow) -> String {
    match non_blank(units) {
        None => series.en_unit.clone(),
        Some(units) => match UnitSystem::parse(units) {
            Some(UnitSystem::Si) => series.si_unit.clone(),
            Some(UnitSystem::En) => series.en_unit.clone(),
            None => units.to_string(),
        },
    }
}

impl From<ValueRow> for TimeSeriesValue {
    fn from(row: ValueRow) -> Self {
        TimeSeriesValue {
            date_time: row.date_time,
            value: row.value,
            quality_code: row.quality_code.unwrap_or(DEFAULT_QUALITY_CODE),
        }
    }
}

impl From<TimeSeriesCatalogRow> for TimeSeriesCatalogEntry {
    fn from(row: TimeSeriesCatalogRow) -> Self {
        TimeSeriesCatalogEntry {
            office: row.office_id,
            name: row.ts_id,
            units: row.units,
            interval_minutes: row.interval_minutes,
        }
    }
}

fn location_entry(
    folded: Folded<LocationRow, LocationAlias>,
    unit_system: UnitSystem,
) -> LocationCatalogEntry {
    let Folded {
        parent: location,
        children: aliases,
    } = folded;

    LocationCatalogEntry {
        office: location.office_id,
        name: location.location_id,
        nearest_city: location.nearest_city,
        public_name: location.public_name,
        long_name: location.long_name,
        description: location.description,
        kind: location.kind,
        time_zone: location.time_zone,
        latitude: location.latitude,
        longitude: location.longitude,
        elevation: location
            .elevation
            .map(|meters| unit_system.elevation_from_meters(meters)),
        unit: unit_system.elevation_unit().to_string(),
        state: location.state,
        county: location.county,
        nation: location.nation,
        active: location.active,
        aliases,
    }
}

/// Fetch one page of readings of a time series.
///
/// `now` anchors the default window (the last 24 hours).
pub async fn get_timeseries(
    repo: &dyn FullRepository,
    request: &TimeSeriesRequest,
    now: DateTime<Utc>,
) -> ServiceResult<TimeSeries> {
    let token = decode_token(request.page.as_deref(), PageKind::Values)?;
    let window = normalize(
        request.begin.as_deref(),
        request.end.as_deref(),
        request.timezone.as_deref(),
        now,
    )?;
    let plan = build_values(token.as_ref(), &window, request.page_size)?;
    log::debug!("time series query for '{}': {:?}", request.name, plan.query);

    let office = non_blank(request.office.as_deref());
    let series = repo
        .fetch_timeseries_metadata(office, &request.name)
        .await?
        .ok_or_else(|| ServiceError::not_found("time series", &request.name))?;
    let unit = resolve_unit(request.units.as_deref(), &series);

    let total = if plan.is_first_page {
        let count = repo
            .count_values(&series, plan.query.begin, plan.query.end)
            .await?;
        log::info!("time series '{}' has {} readings in window", series.ts_id, count);
        Some(count)
    } else {
        plan.known_total
    };

    let (rows, has_more) = if plan.page_size > 0 {
        let rows: Vec<ValueRow> = repo
            .query_values(&series, &unit, &plan.query)
            .try_collect()
            .await?;
        split_page(rows, plan.page_size)
    } else {
        (Vec::new(), false)
    };

    let next_page = next_token(
        PageKind::Values,
        rows.last().map(|row| instant_key(&row.date_time)),
        has_more,
        plan.page_size,
        total,
    )
    .map(|token| token.encode());

    Ok(TimeSeries {
        page: non_blank(request.page.as_deref()).map(str::to_string),
        next_page,
        page_size: plan.page_size,
        total,
        name: series.ts_id,
        office_id: series.office_id,
        begin: ZonedInstant::new(window.begin_utc(), window.zone).to_fixed(),
        end: ZonedInstant::new(window.end_utc(), window.zone).to_fixed(),
        time_zone: window.zone.name(),
        units: unit,
        interval_minutes: series.interval_minutes,
        values: rows.into_iter().map(Into::into).collect(),
    })
}

/// Fetch one page of the time-series catalog.
pub async fn get_timeseries_catalog(
    repo: &dyn FullRepository,
    request: &CatalogRequest,
) -> ServiceResult<TimeSeriesCatalog> {
    let token = decode_token(request.page.as_deref(), PageKind::Catalog)?;
    let office = non_blank(request.office.as_deref());
    let plan = build_catalog(token.as_ref(), office, request.page_size)?;
    log::debug!("time series catalog query: {:?}", plan.query);

    let total = if plan.is_first_page {
        let count = repo.count_timeseries(office).await?;
        log::info!("time series catalog has {} entries (office={:?})", count, office);
        Some(count)
    } else {
        plan.known_total
    };

    let rows: Vec<TimeSeriesCatalogRow> = repo
        .query_timeseries_catalog(&plan.query)
        .try_collect()
        .await?;
    let (rows, has_more) = split_page(rows, plan.page_size);

    let next_page = next_token(
        PageKind::Catalog,
        rows.last().map(|row| row.key().to_token_key()),
        has_more,
        plan.page_size,
        total,
    )
    .map(|token| token.encode());

    Ok(TimeSeriesCatalog {
        page: non_blank(request.page.as_deref()).map(str::to_string),
        next_page,
        total,
        page_size: plan.page_size,
        entries: rows.into_iter().map(Into::into).collect(),
    })
}

/// Fetch one page of the location catalog, each location with its aliases.
pub async fn get_location_catalog(
    repo: &dyn FullRepository,
    request: &CatalogRequest,
) -> ServiceResult<LocationCatalog> {
    let token = decode_token(request.page.as_deref(), PageKind::Catalog)?;
    let office = non_blank(request.office.as_deref());
    let plan = build_catalog(token.as_ref(), office, request.page_size)?;
    log::debug!("location catalog query: {:?}", plan.query);

    let total = if plan.is_first_page {
        let count = repo.count_locations(office).await?;
        log::info!("location catalog has {} entries (office={:?})", count, office);
        Some(count)
    } else {
        plan.known_total
    };

    let folded = fold_stream(repo.query_location_catalog(&plan.query)).await?;
    let (folded, has_more) = split_page(folded, plan.page_size);

    let next_page = next_token(
        PageKind::Catalog,
        folded.last().map(|f| f.parent.key().to_token_key()),
        has_more,
        plan.page_size,
        total,
    )
    .map(|token| token.encode());

    Ok(LocationCatalog {
        page: non_blank(request.page.as_deref()).map(str::to_string),
        next_page,
        total,
        page_size: plan.page_size,
        entries: folded
            .into_iter()
            .map(|f| location_entry(f, request.unit_system))
            .collect(),
    })
}

/// A single location catalog entry.
pub async fn get_location(
    repo: &dyn FullRepository,
    office: Option<&str>,
    location_id: &str,
    unit_system: UnitSystem,
) -> ServiceResult<LocationCatalogEntry> {
    let rows: Vec<LocationCatalogRow> = repo.fetch_location(non_blank(office), location_id).await?;
    fold(rows)
        .into_iter()
        .next()
        .map(|f| location_entry(f, unit_system))
        .ok_or_else(|| ServiceError::not_found("location", location_id))
}

pub async fn list_offices(repo: &dyn FullRepository) -> ServiceResult<Vec<Office>> {
    let rows = repo.list_offices().await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get_office(repo: &dyn FullRepository, office_id: &str) -> ServiceResult<Office> {
    repo.fetch_office(office_id)
        .await?
        .map(Into::into)
        .ok_or_else(|| ServiceError::not_found("office", office_id))
}

pub async fn list_location_categories(
    repo: &dyn FullRepository,
    office: Option<&str>,
) -> ServiceResult<Vec<LocationCategory>> {
    let rows: Vec<CategoryRow> = repo.list_location_categories(non_blank(office)).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get_location_category(
    repo: &dyn FullRepository,
    office: Option<&str>,
    category_id: &str,
) -> ServiceResult<LocationCategory> {
    repo.fetch_location_category(non_blank(office), category_id)
        .await?
        .map(Into::into)
        .ok_or_else(|| ServiceError::not_found("location category", category_id))
}

/// Location groups without their assigned locations.
pub async fn list_location_groups(
    repo: &dyn FullRepository,
    office: Option<&str>,
) -> ServiceResult<Vec<LocationGroup>> {
    let rows = repo.list_location_groups(non_blank(office)).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// One location group with its assigned locations, ordered by attribute.
pub async fn get_location_group(
    repo: &dyn FullRepository,
    office: &str,
    category_id: &str,
    group_id: &str,
) -> ServiceResult<LocationGroup> {
    let folded = fold_stream(repo.query_location_group(office, category_id, group_id)).await?;
    let Some(Folded { parent, children }) = folded.into_iter().next() else {
        return Err(ServiceError::not_found(
            "location group",
            format!("{}/{}", category_id, group_id),
        ));
    };

    let mut group: LocationGroup = parent.into();
    group.assigned_locations = children.into_iter().map(Into::into).collect();
    Ok(group)
}

pub async fn list_timeseries_categories(
    repo: &dyn FullRepository,
    office: Option<&str>,
) -> ServiceResult<Vec<TimeSeriesCategory>> {
    let rows = repo.list_timeseries_categories(non_blank(office)).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get_timeseries_category(
    repo: &dyn FullRepository,
    office: Option<&str>,
    category_id: &str,
) -> ServiceResult<TimeSeriesCategory> {
    repo.fetch_timeseries_category(non_blank(office), category_id)
        .await?
        .map(Into::into)
        .ok_or_else(|| ServiceError::not_found("time series category", category_id))
}

/// Time-series groups; each filter is optional and case-insensitive.
pub async fn list_timeseries_groups(
    repo: &dyn FullRepository,
    office: Option<&str>,
    category_id: Option<&str>,
    group_id: Option<&str>,
) -> ServiceResult<Vec<TimeSeriesGroup>> {
    let rows = repo
        .list_timeseries_groups(non_blank(office), non_blank(category_id), non_blank(group_id))
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Check backend health.
pub async fn health_check(repo: &dyn FullRepository) -> ServiceResult<bool> {
    Ok(repo.health_check().await?)
}

//! Bounded range queries.
//!
//! Every page is fetched with a strict "greater than the resume key" predicate over a total
//! order, limited to `page_size + 1` rows. The extra row only tells the caller whether a
//! next page exists.

use std::cmp::Ordering;

use chrono::{DateTime, TimeZone, Utc};

use super::cursor::{CursorError, PageKind, PageToken};
use crate::models::TimeWindow;

/// Resume key of a first catalog page in legacy tokens.
pub const START_SENTINEL: &str = "*";

/// Where a page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resume<K> {
    /// Before all rows.
    Start,
    /// Strictly after the row with this key.
    After(K),
}

impl<K> Resume<K> {
    pub fn is_start(&self) -> bool {
        matches!(self, Resume::Start)
    }

    pub fn key(&self) -> Option<&K> {
        match self {
            Resume::Start => None,
            Resume::After(key) => Some(key),
        }
    }
}

/// Identity and sort key of a catalog entry.
///
/// Entries are ordered by `(UPPER(id), UPPER(office), id, office)`, which is also how the
/// Postgres backend sorts them. The exact-case columns order ids that differ only in case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogKey {
    pub office: String,
    pub id: String,
}

impl CatalogKey {
    pub fn new(office: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            office: office.into(),
            id: id.into(),
        }
    }

    pub fn sort_key(&self) -> (String, String) {
        (self.id.to_uppercase(), self.office.to_uppercase())
    }

    /// `OFFICE/ID`, the form stored in page tokens.
    pub fn to_token_key(&self) -> String {
        format!("{}/{}", self.office, self.id)
    }

    pub fn from_token_key(key: &str) -> Result<Self, CursorError> {
        match key.split_once('/') {
            Some((office, id)) if !office.is_empty() && !id.is_empty() => {
                Ok(Self::new(office, id))
            }
            _ => Err(CursorError::InvalidResumeKey(key.to_string())),
        }
    }
}

impl Ord for CatalogKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.id.cmp(&other.id))
            .then_with(|| self.office.cmp(&other.office))
    }
}

impl PartialOrd for CatalogKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Row budget for a page: `page_size + 1` when bounded, nothing when unbounded.
pub fn row_limit(page_size: i32) -> Option<usize> {
    usize::try_from(page_size).ok().filter(|size| *size > 0).map(|size| size + 1)
}

/// Split a fetched batch into the kept page and a has-more flag.
pub fn split_page<T>(mut rows: Vec<T>, page_size: i32) -> (Vec<T>, bool) {
    match usize::try_from(page_size) {
        Ok(size) if size > 0 && rows.len() > size => {
            rows.truncate(size);
            (rows, true)
        }
        _ => (rows, false),
    }
}

/// Reading query for one time series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesQuery {
    pub after: Resume<DateTime<Utc>>,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: Option<usize>,
}

impl ValuesQuery {
    /// `begin <= t <= end` on the first page, `key < t <= end` afterwards.
    pub fn admits(&self, t: &DateTime<Utc>) -> bool {
        let lower = match &self.after {
            Resume::Start => *t >= self.begin,
            Resume::After(key) => t > key,
        };
        lower && *t <= self.end
    }
}

/// Catalog query, shared by the time-series and location catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogQuery {
    /// Case-insensitive office filter.
    pub office: Option<String>,
    pub after: Resume<CatalogKey>,
    /// Counts entries, not joined rows.
    pub limit: Option<usize>,
}

impl<K> Default for Resume<K> {
    fn default() -> Self {
        Resume::Start
    }
}

impl CatalogQuery {
    pub fn matches_office(&self, office: &str) -> bool {
        self.office
            .as_deref()
            .map_or(true, |wanted| wanted.eq_ignore_ascii_case(office))
    }

    pub fn admits(&self, key: &CatalogKey) -> bool {
        self.matches_office(&key.office)
            && match &self.after {
                Resume::Start => true,
                Resume::After(resume) => key > resume,
            }
    }
}

/// A built query plus the paging state around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePlan<Q> {
    pub query: Q,
    pub is_first_page: bool,
    /// Total carried by the incoming token; never re-counted on later pages.
    pub known_total: Option<u64>,
    pub page_size: i32,
}

fn effective_page_size(token: Option<&PageToken>, requested: i32) -> i32 {
    match token {
        Some(token) if token.has_page_size() => token.page_size,
        _ => requested,
    }
}

pub fn build_values(
    token: Option<&PageToken>,
    window: &TimeWindow,
    page_size: i32,
) -> Result<PagePlan<ValuesQuery>, CursorError> {
    let page_size = effective_page_size(token, page_size);
    let after = match token {
        Some(token) if !token.resume_key.is_empty() => {
            Resume::After(parse_instant_key(&token.resume_key)?)
        }
        _ => Resume::Start,
    };

    Ok(PagePlan {
        is_first_page: after.is_start(),
        known_total: token.and_then(|t| t.total),
        page_size,
        query: ValuesQuery {
            after,
            begin: window.begin_utc(),
            end: window.end_utc(),
            limit: row_limit(page_size),
        },
    })
}

pub fn build_catalog(
    token: Option<&PageToken>,
    office: Option<&str>,
    page_size: i32,
) -> Result<PagePlan<CatalogQuery>, CursorError> {
    let page_size = effective_page_size(token, page_size);
    let after = match token {
        Some(token) if !token.resume_key.is_empty() && token.resume_key != START_SENTINEL => {
            Resume::After(CatalogKey::from_token_key(&token.resume_key)?)
        }
        _ => Resume::Start,
    };

    Ok(PagePlan {
        is_first_page: after.is_start(),
        known_total: token.and_then(|t| t.total),
        page_size,
        query: CatalogQuery {
            office: office.map(str::to_string),
            after,
            limit: row_limit(page_size),
        },
    })
}

/// Resume key of a reading: epoch milliseconds of its timestamp.
pub fn instant_key(t: &DateTime<Utc>) -> String {
    t.timestamp_millis().to_string()
}

fn parse_instant_key(key: &str) -> Result<DateTime<Utc>, CursorError> {
    key.trim()
        .parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .ok_or_else(|| CursorError::InvalidResumeKey(key.to_string()))
}

/// Token for the page after `last_key`, or `None` when the page was the last one.
pub fn next_token(
    kind: PageKind,
    last_key: Option<String>,
    has_more: bool,
    page_size: i32,
    total: Option<u64>,
) -> Option<PageToken> {
    match (has_more, last_key) {
        (true, Some(key)) => Some(PageToken::new(kind, key, page_size, total)),
        _ => None,
    }
}

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};
use cwms_data::db::models::{AssignmentRow, LocationRow, TimeSeriesMetadataRow, ValueRow};
use cwms_data::db::LocalRepository;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Variables are restored on unwind and access to the process environment is serialized,
/// since tests run in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

pub const KEYS_ELEV: &str = "KEYS.Elev.Inst.1Hour.0.Ccp-Rev";

/// First reading of the seeded series.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 10, 0, 0, 0).unwrap()
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 11, 0, 0, 0).unwrap()
}

pub fn series(office: &str, ts_id: &str) -> TimeSeriesMetadataRow {
    TimeSeriesMetadataRow {
        office_id: office.to_string(),
        ts_id: ts_id.to_string(),
        storage_unit: "m".to_string(),
        si_unit: "m".to_string(),
        en_unit: "ft".to_string(),
        interval_minutes: 60,
    }
}

pub fn location(office: &str, id: &str) -> LocationRow {
    LocationRow {
        office_id: office.to_string(),
        location_id: id.to_string(),
        nearest_city: None,
        public_name: Some(id.to_string()),
        long_name: None,
        description: None,
        kind: Some("SITE".to_string()),
        time_zone: Some("US/Central".to_string()),
        latitude: None,
        longitude: None,
        elevation: Some(30.48),
        state: None,
        county: None,
        nation: Some("US".to_string()),
        active: true,
    }
}

pub fn alias(office: &str, id: &str, alias_id: &str) -> AssignmentRow {
    AssignmentRow {
        location_id: id.to_string(),
        office_id: office.to_string(),
        alias_id: Some(alias_id.to_string()),
        attribute: None,
        ref_location_id: None,
    }
}

/// A repository holding `KEYS_ELEV` with `hours` hourly readings from [`start`].
pub fn repo_with_readings(hours: i64) -> LocalRepository {
    let repo = LocalRepository::new();
    repo.add_timeseries(series("SWT", KEYS_ELEV));
    repo.add_unit_conversion("m", "ft", 1.0 / 0.3048, 0.0);
    repo.add_values(
        "SWT",
        KEYS_ELEV,
        (0..hours).map(|h| ValueRow {
            date_time: start() + Duration::hours(h),
            value: Some(h as f64),
            quality_code: Some(0),
        }),
    )
    .unwrap();
    repo
}

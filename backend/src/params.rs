//! Query parameter resolution.
//!
//! Several parameters were renamed over time. Each lookup takes an ordered list of names,
//! the current one first, followed by its deprecated spellings. The first name carrying a
//! non-blank value wins.

use std::collections::{BTreeMap, HashMap};

use crate::api::UnitSystem;
use crate::db::repo_config::PagingSettings;
use crate::db::services::{CatalogRequest, ServiceError, TimeSeriesRequest};

/// Readings per time-series page when the request names no page size.
pub const DEFAULT_PAGE_SIZE: i32 = 500;
/// Entries per catalog page when the request names no page size.
pub const DEFAULT_CATALOG_PAGE_SIZE: i32 = 100;

pub const PAGE: &[&str] = &["page", "cursor"];
pub const PAGE_SIZE: &[&str] = &["page-size", "pagesize", "pageSize"];
pub const UNIT_SYSTEM: &[&str] = &["unit-system", "unitSystem"];
pub const OFFICE: &[&str] = &["office"];
pub const NAME: &[&str] = &["name"];
pub const UNIT: &[&str] = &["unit"];
pub const BEGIN: &[&str] = &["begin"];
pub const END: &[&str] = &["end"];
pub const TIMEZONE: &[&str] = &["timezone"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("parameter '{name}' must be an integer, got '{value}'")]
    InvalidNumber { name: String, value: String },

    #[error("parameter '{name}' must be SI or EN, got '{value}'")]
    InvalidUnitSystem { name: String, value: String },

    #[error("missing required parameter '{0}'")]
    Missing(&'static str),
}

impl From<ParamError> for ServiceError {
    fn from(err: ParamError) -> Self {
        log::warn!("rejected request parameter: {}", err);
        match err {
            ParamError::InvalidNumber { name, value }
            | ParamError::InvalidUnitSystem { name, value } => {
                ServiceError::InvalidParameter { name, value }
            }
            ParamError::Missing(name) => ServiceError::InvalidParameter {
                name: name.to_string(),
                value: String::new(),
            },
        }
    }
}

/// Anything query parameters can be read from.
pub trait ParamSource {
    fn get_param(&self, name: &str) -> Option<&str>;
}

impl ParamSource for HashMap<String, String> {
    fn get_param(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl ParamSource for BTreeMap<String, String> {
    fn get_param(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl ParamSource for [(&str, &str)] {
    fn get_param(&self, name: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
    }
}

/// First matching parameter as `(name, value)`.
pub fn first_param<'a, P>(params: &'a P, names: &[&'static str]) -> Option<(&'static str, &'a str)>
where
    P: ParamSource + ?Sized,
{
    for (i, name) in names.iter().enumerate() {
        let Some(value) = params.get_param(name).map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        if i > 0 {
            log::debug!("deprecated parameter '{}' used instead of '{}'", name, names[0]);
        }
        return Some((*name, value));
    }
    None
}

pub fn param<'a, P>(params: &'a P, names: &[&'static str]) -> Option<&'a str>
where
    P: ParamSource + ?Sized,
{
    first_param(params, names).map(|(_, value)| value)
}

pub fn param_string<P>(params: &P, names: &[&'static str]) -> Option<String>
where
    P: ParamSource + ?Sized,
{
    param(params, names).map(str::to_string)
}

pub fn param_i32<P>(params: &P, names: &[&'static str], default: i32) -> Result<i32, ParamError>
where
    P: ParamSource + ?Sized,
{
    match first_param(params, names) {
        None => Ok(default),
        Some((name, value)) => value.parse().map_err(|_| ParamError::InvalidNumber {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

pub fn param_unit_system<P>(params: &P, default: UnitSystem) -> Result<UnitSystem, ParamError>
where
    P: ParamSource + ?Sized,
{
    match first_param(params, UNIT_SYSTEM) {
        None => Ok(default),
        Some((name, value)) => {
            UnitSystem::parse(value).ok_or_else(|| ParamError::InvalidUnitSystem {
                name: name.to_string(),
                value: value.to_string(),
            })
        }
    }
}

/// Build a time-series page request. `name` is required.
pub fn timeseries_request<P>(
    params: &P,
    paging: &PagingSettings,
) -> Result<TimeSeriesRequest, ParamError>
where
    P: ParamSource + ?Sized,
{
    Ok(TimeSeriesRequest {
        name: param_string(params, NAME).ok_or(ParamError::Missing("name"))?,
        office: param_string(params, OFFICE),
        units: param_string(params, UNIT),
        begin: param_string(params, BEGIN),
        end: param_string(params, END),
        timezone: param_string(params, TIMEZONE),
        page: param_string(params, PAGE),
        page_size: param_i32(params, PAGE_SIZE, paging.default_page_size)?,
    })
}

/// Build a catalog page request.
pub fn catalog_request<P>(params: &P, paging: &PagingSettings) -> Result<CatalogRequest, ParamError>
where
    P: ParamSource + ?Sized,
{
    Ok(CatalogRequest {
        office: param_string(params, OFFICE),
        page: param_string(params, PAGE),
        page_size: param_i32(params, PAGE_SIZE, paging.catalog_page_size)?,
        unit_system: param_unit_system(params, UnitSystem::default())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_current_name_wins() {
        let params = map(&[("page-size", "333"), ("pageSize", "7")]);
        assert_eq!(param_i32(&params, PAGE_SIZE, 500).unwrap(), 333);
    }

    #[test]
    fn test_deprecated_names_accepted() {
        for name in ["pagesize", "pageSize"] {
            let params = map(&[(name, "333")]);
            assert_eq!(param_i32(&params, PAGE_SIZE, 500).unwrap(), 333);
        }
    }

    #[test]
    fn test_default_when_absent() {
        let params = map(&[("fake", "333")]);
        assert_eq!(param_i32(&params, PAGE_SIZE, 500).unwrap(), 500);
    }

    #[test]
    fn test_blank_value_falls_through() {
        let params: &[(&str, &str)] = &[("page-size", " "), ("pagesize", "20")];
        assert_eq!(param_i32(params, PAGE_SIZE, 500).unwrap(), 20);
    }

    #[test]
    fn test_non_numeric_page_size() {
        let params = map(&[("pageSize", "ten")]);
        let err = param_i32(&params, PAGE_SIZE, 500).unwrap_err();
        assert_eq!(
            err,
            ParamError::InvalidNumber {
                name: "pageSize".to_string(),
                value: "ten".to_string()
            }
        );
    }

    #[test]
    fn test_unit_system_alias() {
        let params = map(&[("unitSystem", "en")]);
        assert_eq!(
            param_unit_system(&params, UnitSystem::Si).unwrap(),
            UnitSystem::En
        );
        let bad = map(&[("unit-system", "metric")]);
        assert!(param_unit_system(&bad, UnitSystem::Si).is_err());
    }

    #[test]
    fn test_timeseries_request_from_params() {
        let params = map(&[
            ("name", "KEYS.Elev.Inst.1Hour.0.Ccp-Rev"),
            ("office", "SWT"),
            ("begin", "2021-06-10T13:00:00-07:00[PST8PDT]"),
            ("cursor", "abc"),
        ]);
        let request = timeseries_request(&params, &PagingSettings::default()).unwrap();
        assert_eq!(request.name, "KEYS.Elev.Inst.1Hour.0.Ccp-Rev");
        assert_eq!(request.page.as_deref(), Some("abc"));
        assert_eq!(request.page_size, DEFAULT_PAGE_SIZE);
        assert!(request.end.is_none());
    }

    #[test]
    fn test_timeseries_request_requires_name() {
        let params = map(&[("office", "SWT")]);
        let err = timeseries_request(&params, &PagingSettings::default()).unwrap_err();
        assert_eq!(err, ParamError::Missing("name"));

        let service: ServiceError = err.into();
        assert!(matches!(service, ServiceError::InvalidParameter { .. }));
    }

    #[test]
    fn test_catalog_request_defaults() {
        let params = map(&[]);
        let paging = PagingSettings {
            default_page_size: 500,
            catalog_page_size: 25,
        };
        let request = catalog_request(&params, &paging).unwrap();
        assert_eq!(request.page_size, 25);
        assert_eq!(request.unit_system, UnitSystem::Si);
        assert!(request.office.is_none());
    }
}

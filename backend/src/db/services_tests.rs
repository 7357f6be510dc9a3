use chrono::{DateTime, Duration, TimeZone, Utc};

use super::models::*;
use super::repositories::LocalRepository;
use super::services::*;
use crate::api::UnitSystem;
use crate::models::TimeError;
use crate::paging::{CursorError, PageKind, PageToken};

const KEYS_ELEV: &str = "KEYS.Elev.Inst.1Hour.0.Ccp-Rev";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 10, 0, 0, 0).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 11, 0, 0, 0).unwrap()
}

fn series(office: &str, ts_id: &str) -> TimeSeriesMetadataRow {
    TimeSeriesMetadataRow {
        office_id: office.to_string(),
        ts_id: ts_id.to_string(),
        storage_unit: "m".to_string(),
        si_unit: "m".to_string(),
        en_unit: "ft".to_string(),
        interval_minutes: 60,
    }
}

fn location(office: &str, id: &str) -> LocationRow {
    LocationRow {
        office_id: office.to_string(),
        location_id: id.to_string(),
        nearest_city: Some("Tulsa".to_string()),
        public_name: None,
        long_name: None,
        description: None,
        kind: Some("SITE".to_string()),
        time_zone: Some("US/Central".to_string()),
        latitude: Some(36.15),
        longitude: Some(-96.25),
        elevation: Some(100.0),
        state: Some("OK".to_string()),
        county: None,
        nation: Some("US".to_string()),
        active: true,
    }
}

fn assignment(office: &str, id: &str, alias: Option<&str>, attribute: Option<i64>) -> AssignmentRow {
    AssignmentRow {
        location_id: id.to_string(),
        office_id: office.to_string(),
        alias_id: alias.map(str::to_string),
        attribute,
        ref_location_id: None,
    }
}

fn category(office: &str, id: &str) -> CategoryRow {
    CategoryRow {
        office_id: office.to_string(),
        category_id: id.to_string(),
        description: None,
    }
}

/// Five hourly readings starting at 2021-06-10T00:00Z; the third has no quality code.
fn seeded() -> LocalRepository {
    let repo = LocalRepository::new();
    repo.add_timeseries(series("SWT", KEYS_ELEV));
    repo.add_unit_conversion("m", "ft", 1.0 / 0.3048, 0.0);
    repo.add_values(
        "SWT",
        KEYS_ELEV,
        (0..5).map(|h| ValueRow {
            date_time: start() + Duration::hours(h),
            value: Some(200.0 + h as f64),
            quality_code: if h == 2 { None } else { Some(0) },
        }),
    )
    .unwrap();
    repo
}

fn window_request(page_size: i32) -> TimeSeriesRequest {
    TimeSeriesRequest {
        name: KEYS_ELEV.to_string(),
        office: Some("SWT".to_string()),
        units: Some("SI".to_string()),
        begin: Some("2021-06-10T00:00:00Z".to_string()),
        end: Some("2021-06-10T04:00:00Z".to_string()),
        page_size,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_timeseries_first_page() {
    let repo = seeded();
    let page = get_timeseries(&repo, &window_request(2), now()).await.unwrap();

    assert_eq!(page.values.len(), 2);
    assert_eq!(page.total, Some(5));
    assert_eq!(page.page_size, 2);
    assert_eq!(page.units, "m");
    assert_eq!(page.time_zone, "UTC");
    assert_eq!(page.interval_minutes, 60);
    assert!(page.page.is_none());
    assert!(page.next_page.is_some());
}

#[tokio::test]
async fn test_timeseries_pages_resume_without_gaps() {
    let repo = seeded();
    let mut request = window_request(2);
    let mut seen = Vec::new();
    let mut pages = 0;

    loop {
        let page = get_timeseries(&repo, &request, now()).await.unwrap();
        pages += 1;
        assert_eq!(page.total, Some(5));
        seen.extend(page.values.iter().map(|v| v.date_time));
        match page.next_page {
            Some(next) => request.page = Some(next),
            None => break,
        }
    }

    let expected: Vec<DateTime<Utc>> = (0..5).map(|h| start() + Duration::hours(h)).collect();
    assert_eq!(seen, expected);
    assert_eq!(pages, 3);
}

#[tokio::test]
async fn test_timeseries_cursor_page_size_wins() {
    let repo = seeded();
    let first = get_timeseries(&repo, &window_request(2), now()).await.unwrap();

    let mut request = window_request(50);
    request.page = first.next_page;
    let second = get_timeseries(&repo, &request, now()).await.unwrap();
    assert_eq!(second.page_size, 2);
    assert_eq!(second.values.len(), 2);
}

#[tokio::test]
async fn test_timeseries_default_units_are_english() {
    let repo = seeded();
    let mut request = window_request(1);
    request.units = None;

    let page = get_timeseries(&repo, &request, now()).await.unwrap();
    assert_eq!(page.units, "ft");
    let feet = page.values[0].value.unwrap();
    assert!((feet - 200.0 / 0.3048).abs() < 1e-9);
}

#[tokio::test]
async fn test_timeseries_unknown_unit_is_backend_validation() {
    let repo = seeded();
    let mut request = window_request(1);
    request.units = Some("furlongs".to_string());

    let err = get_timeseries(&repo, &request, now()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Backend(_)));
    assert_eq!(err.class(), ErrorClass::Server);
}

#[tokio::test]
async fn test_timeseries_zero_page_size_is_metadata_only() {
    let repo = seeded();
    let page = get_timeseries(&repo, &window_request(0), now()).await.unwrap();

    assert!(page.values.is_empty());
    assert!(page.next_page.is_none());
    assert_eq!(page.total, Some(5));
    assert_eq!(page.name, KEYS_ELEV);
}

#[tokio::test]
async fn test_timeseries_negative_page_size_is_metadata_only() {
    let repo = seeded();
    let page = get_timeseries(&repo, &window_request(-1), now()).await.unwrap();

    assert!(page.values.is_empty());
    assert!(page.next_page.is_none());
    assert_eq!(page.total, Some(5));
    assert_eq!(page.page_size, -1);
}

#[tokio::test]
async fn test_timeseries_missing_quality_defaults() {
    let repo = seeded();
    let page = get_timeseries(&repo, &window_request(5), now()).await.unwrap();

    let codes: Vec<i32> = page.values.iter().map(|v| v.quality_code).collect();
    assert_eq!(codes, vec![0, 0, 5, 0, 0]);
    assert!(page.next_page.is_none());
}

#[tokio::test]
async fn test_timeseries_default_window_is_last_day() {
    let repo = seeded();
    let request = TimeSeriesRequest {
        name: KEYS_ELEV.to_string(),
        page_size: 10,
        ..Default::default()
    };

    let page = get_timeseries(&repo, &request, now()).await.unwrap();
    assert_eq!(page.begin, now() - Duration::hours(24));
    assert_eq!(page.end, now());
    assert_eq!(page.values.len(), 5);
}

#[tokio::test]
async fn test_timeseries_not_found() {
    let repo = seeded();
    let mut request = window_request(2);
    request.name = "NOPE.Flow.Inst.1Hour.0.raw".to_string();

    let err = get_timeseries(&repo, &request, now()).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);
    assert!(err.public_message().contains("NOPE.Flow.Inst.1Hour.0.raw"));
}

#[tokio::test]
async fn test_timeseries_offset_only_begin_rejected() {
    let repo = seeded();
    let mut request = window_request(2);
    request.begin = Some("2021-06-10T13:00:00-0700".to_string());
    request.end = None;

    let err = get_timeseries(&repo, &request, now()).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::InvalidTime(TimeError::AmbiguousOffset { .. })
    ));
    assert_eq!(err.class(), ErrorClass::ClientInput);
}

#[tokio::test]
async fn test_timeseries_end_inherits_begin_zone() {
    let repo = seeded();
    let mut request = window_request(2);
    request.begin = Some("2021-06-10T13:00:00-07:00[PST8PDT]".to_string());
    request.end = Some("2021-06-10T18:00:00".to_string());

    let page = get_timeseries(&repo, &request, now()).await.unwrap();
    assert_eq!(page.time_zone, "PST8PDT");
    assert_eq!(
        page.end.with_timezone(&Utc),
        Utc.with_ymd_and_hms(2021, 6, 11, 1, 0, 0).unwrap()
    );
    assert_eq!(page.end.offset().local_minus_utc(), -7 * 3600);
}

#[tokio::test]
async fn test_malformed_cursor_rejected() {
    let repo = seeded();
    let mut request = window_request(2);
    request.page = Some("!!not a cursor!!".to_string());

    let err = get_timeseries(&repo, &request, now()).await.unwrap_err();
    assert!(matches!(err, ServiceError::MalformedCursor(_)));
    assert_eq!(err.class(), ErrorClass::ClientInput);
}

#[tokio::test]
async fn test_catalog_cursor_rejected_for_values() {
    let repo = seeded();
    let mut request = window_request(2);
    request.page = Some(PageToken::new(PageKind::Catalog, "SWT/KEYS", 2, Some(1)).encode());

    let err = get_timeseries(&repo, &request, now()).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::MalformedCursor(CursorError::WrongKind { .. })
    ));
}

fn catalog_repo() -> LocalRepository {
    let repo = LocalRepository::new();
    repo.add_timeseries(series("SWT", "KEYS.Elev.Inst.1Hour.0.Ccp-Rev"));
    repo.add_timeseries(series("SWT", "ARCA.Flow.Inst.1Hour.0.raw"));
    repo.add_timeseries(series("LRL", "BUCK.Stage.Inst.15Minutes.0.raw"));
    repo
}

#[tokio::test]
async fn test_timeseries_catalog_page_boundary() {
    let repo = catalog_repo();
    let mut request = CatalogRequest {
        page_size: 2,
        ..Default::default()
    };

    let first = get_timeseries_catalog(&repo, &request).await.unwrap();
    let names: Vec<&str> = first.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["ARCA.Flow.Inst.1Hour.0.raw", "BUCK.Stage.Inst.15Minutes.0.raw"]
    );
    assert_eq!(first.total, Some(3));
    assert!(!first.is_last_page());

    request.page = first.next_page.clone();
    let second = get_timeseries_catalog(&repo, &request).await.unwrap();
    assert_eq!(second.entries.len(), 1);
    assert_eq!(second.entries[0].name, "KEYS.Elev.Inst.1Hour.0.Ccp-Rev");
    assert_eq!(second.total, Some(3));
    assert!(second.is_last_page());
    assert_eq!(second.page, first.next_page);
}

#[tokio::test]
async fn test_timeseries_catalog_office_filter() {
    let repo = catalog_repo();
    let request = CatalogRequest {
        office: Some("swt".to_string()),
        page_size: 10,
        ..Default::default()
    };

    let page = get_timeseries_catalog(&repo, &request).await.unwrap();
    assert_eq!(page.total, Some(2));
    assert!(page.entries.iter().all(|e| e.office == "SWT"));
    assert!(page.next_page.is_none());
}

#[tokio::test]
async fn test_timeseries_catalog_first_page_is_repeatable() {
    let repo = catalog_repo();
    let request = CatalogRequest {
        page_size: 2,
        ..Default::default()
    };

    let a = get_timeseries_catalog(&repo, &request).await.unwrap();
    let b = get_timeseries_catalog(&repo, &request).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_empty_catalog() {
    let repo = LocalRepository::new();
    let request = CatalogRequest {
        page_size: 100,
        ..Default::default()
    };

    let page = get_location_catalog(&repo, &request).await.unwrap();
    assert!(page.entries.is_empty());
    assert_eq!(page.total, Some(0));
    assert!(page.next_page.is_none());
}

fn location_repo() -> LocalRepository {
    let repo = LocalRepository::new();
    for id in ["KEYS", "ARCA", "TULA"] {
        repo.add_location(location("SWT", id));
    }
    repo.assign_location(
        "Agency Aliases",
        "NWS Handbook 5 ID",
        assignment("SWT", "KEYS", Some("KEYO2"), Some(2)),
    );
    repo.assign_location(
        "Agency Aliases",
        "USGS Station Number",
        assignment("SWT", "KEYS", Some("07164400"), Some(1)),
    );
    // Assigned without an alias; must not produce an alias entry.
    repo.assign_location("Basin", "Arkansas", assignment("SWT", "KEYS", None, None));
    repo
}

#[tokio::test]
async fn test_location_catalog_folds_aliases() {
    let repo = location_repo();
    let request = CatalogRequest {
        page_size: 2,
        ..Default::default()
    };

    let first = get_location_catalog(&repo, &request).await.unwrap();
    let names: Vec<&str> = first.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["ARCA", "KEYS"]);
    assert!(first.entries[0].aliases.is_empty());

    let aliases: Vec<(&str, &str)> = first.entries[1]
        .aliases
        .iter()
        .map(|a| (a.name.as_str(), a.value.as_str()))
        .collect();
    assert_eq!(
        aliases,
        vec![
            ("Agency Aliases-NWS Handbook 5 ID", "KEYO2"),
            ("Agency Aliases-USGS Station Number", "07164400"),
        ]
    );

    let second = get_location_catalog(
        &repo,
        &CatalogRequest {
            page: first.next_page,
            ..request
        },
    )
    .await
    .unwrap();
    assert_eq!(second.entries.len(), 1);
    assert_eq!(second.entries[0].name, "TULA");
    assert!(second.next_page.is_none());
}

#[tokio::test]
async fn test_location_catalog_english_elevation() {
    let repo = location_repo();
    let request = CatalogRequest {
        page_size: 1,
        unit_system: UnitSystem::En,
        ..Default::default()
    };

    let page = get_location_catalog(&repo, &request).await.unwrap();
    let entry = &page.entries[0];
    assert_eq!(entry.unit, "ft");
    assert!((entry.elevation.unwrap() - 100.0 / 0.3048).abs() < 1e-9);
}

#[tokio::test]
async fn test_get_location() {
    let repo = location_repo();
    let entry = get_location(&repo, Some("swt"), "keys", UnitSystem::Si)
        .await
        .unwrap();
    assert_eq!(entry.name, "KEYS");
    assert_eq!(entry.aliases.len(), 2);
    assert_eq!(entry.unit, "m");

    let err = get_location(&repo, None, "NOWHERE", UnitSystem::Si)
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);
}

#[tokio::test]
async fn test_offices() {
    let repo = LocalRepository::new();
    repo.add_office(OfficeRow {
        office_id: "SWT".to_string(),
        long_name: "Tulsa District".to_string(),
        office_type: "DIS".to_string(),
        reports_to: Some("SWD".to_string()),
    });
    repo.add_office(OfficeRow {
        office_id: "SWD".to_string(),
        long_name: "Southwestern Division".to_string(),
        office_type: "MSC".to_string(),
        reports_to: Some("HQ".to_string()),
    });

    let offices = list_offices(&repo).await.unwrap();
    let names: Vec<&str> = offices.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["SWD", "SWT"]);

    let swt = get_office(&repo, "swt").await.unwrap();
    assert_eq!(swt.office_type, "district");

    let err = get_office(&repo, "XYZ").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { entity: "office", .. }));
}

#[tokio::test]
async fn test_location_categories() {
    let repo = LocalRepository::new();
    repo.add_location_category(category("SWT", "Basin"));
    repo.add_location_category(category("LRL", "Agency Aliases"));

    let all = list_location_categories(&repo, None).await.unwrap();
    assert_eq!(all.len(), 2);
    let swt = list_location_categories(&repo, Some("SWT")).await.unwrap();
    assert_eq!(swt.len(), 1);

    let basin = get_location_category(&repo, Some("SWT"), "basin").await.unwrap();
    assert_eq!(basin.id, "Basin");
    assert!(get_location_category(&repo, Some("LRL"), "Basin").await.is_err());
    assert!(list_location_categories(&repo, Some("NAB")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_location_group_assignments_ordered_by_attribute() {
    let repo = location_repo();
    let group = LocationGroupRow {
        category: category("SWT", "Agency Aliases"),
        office_id: "SWT".to_string(),
        group_id: "Tulsa Gages".to_string(),
        description: Some("gages".to_string()),
        shared_alias_id: None,
        shared_ref_location_id: None,
        attribute: None,
    };
    repo.add_location_group(group.clone());
    repo.assign_location(
        "Agency Aliases",
        "Tulsa Gages",
        assignment("SWT", "TULA", None, None),
    );
    repo.assign_location(
        "Agency Aliases",
        "Tulsa Gages",
        assignment("SWT", "KEYS", None, Some(2)),
    );
    repo.assign_location(
        "Agency Aliases",
        "Tulsa Gages",
        assignment("SWT", "ARCA", None, Some(1)),
    );

    let found = get_location_group(&repo, "SWT", "agency aliases", "tulsa gages")
        .await
        .unwrap();
    let ids: Vec<&str> = found
        .assigned_locations
        .iter()
        .map(|a| a.location_id.as_str())
        .collect();
    assert_eq!(ids, vec!["ARCA", "KEYS", "TULA"]);
    assert_eq!(found.category.id, "Agency Aliases");

    let listed = list_location_groups(&repo, Some("SWT")).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].assigned_locations.is_empty());

    let err = get_location_group(&repo, "SWT", "Agency Aliases", "Missing")
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);
}

#[tokio::test]
async fn test_timeseries_groups_filters() {
    let repo = LocalRepository::new();
    repo.add_timeseries_category(category("SWT", "Data Acquisition"));
    for (cat, id) in [("Data Acquisition", "GOES"), ("Data Acquisition", "LRGS"), ("Agency", "USGS")] {
        repo.add_timeseries_group(TimeSeriesGroupRow {
            category: category("SWT", cat),
            office_id: "SWT".to_string(),
            group_id: id.to_string(),
            description: None,
            shared_alias_id: None,
            shared_ref_ts_id: None,
        });
    }

    let all = list_timeseries_groups(&repo, None, None, None).await.unwrap();
    assert_eq!(all.len(), 3);

    let acquisition = list_timeseries_groups(&repo, Some("SWT"), Some("data acquisition"), None)
        .await
        .unwrap();
    let ids: Vec<&str> = acquisition.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids, vec!["GOES", "LRGS"]);

    let one = list_timeseries_groups(&repo, None, None, Some("usgs")).await.unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].category.id, "Agency");

    let cats = list_timeseries_categories(&repo, Some("SWT")).await.unwrap();
    assert_eq!(cats.len(), 1);
    let cat = get_timeseries_category(&repo, None, "DATA ACQUISITION").await.unwrap();
    assert_eq!(cat.id, "Data Acquisition");
}

#[tokio::test]
async fn test_backend_failure_hides_details() {
    let repo = seeded();
    repo.set_healthy(false);

    let err = get_timeseries_catalog(&repo, &CatalogRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Server);
    assert_eq!(err.public_message(), "internal server error");
    assert!(err.to_string().contains("unhealthy"));
    assert!(!health_check(&repo).await.unwrap());
}

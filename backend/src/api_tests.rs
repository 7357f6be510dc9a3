use super::*;
use chrono::TimeZone;

#[test]
fn test_unit_system_parse() {
    assert_eq!(UnitSystem::parse("si"), Some(UnitSystem::Si));
    assert_eq!(UnitSystem::parse(" EN "), Some(UnitSystem::En));
    assert_eq!(UnitSystem::parse("ft"), None);
}

#[test]
fn test_elevation_conversion() {
    assert_eq!(UnitSystem::Si.elevation_from_meters(10.0), 10.0);
    let feet = UnitSystem::En.elevation_from_meters(0.3048);
    assert!((feet - 1.0).abs() < 1e-9);
    assert_eq!(UnitSystem::En.elevation_unit(), "ft");
}

#[test]
fn test_alias_name_joins_category_and_group() {
    let alias = LocationAlias::new("Agency Aliases", "NWS Handbook 5 ID", "KEYO2");
    assert_eq!(alias.name, "Agency Aliases-NWS Handbook 5 ID");
    assert_eq!(alias.value, "KEYO2");
}

#[test]
fn test_office_type_names() {
    assert_eq!(office_type_name("DIS"), "district");
    assert_eq!(office_type_name("msc"), "division headquarters");
    assert_eq!(office_type_name("??"), "unknown");
}

#[test]
fn test_catalog_serializes_kebab_case() {
    let catalog: TimeSeriesCatalog = Catalog {
        page: None,
        next_page: Some("abc".to_string()),
        total: Some(3),
        page_size: 2,
        entries: vec![TimeSeriesCatalogEntry {
            office: "SWT".to_string(),
            name: "KEYS.Elev.Inst.1Hour.0.Ccp-Rev".to_string(),
            units: "m".to_string(),
            interval_minutes: 60,
        }],
    };

    let json = serde_json::to_value(&catalog).unwrap();
    assert_eq!(json["next-page"], "abc");
    assert_eq!(json["page-size"], 2);
    assert_eq!(json["entries"][0]["interval-minutes"], 60);
    assert!(!catalog.is_last_page());
}

#[test]
fn test_timeseries_value_serialization() {
    let value = TimeSeriesValue {
        date_time: Utc.with_ymd_and_hms(2021, 6, 10, 20, 0, 0).unwrap(),
        value: None,
        quality_code: DEFAULT_QUALITY_CODE,
    };
    let json = serde_json::to_value(&value).unwrap();
    assert_eq!(json["quality-code"], 5);
    assert!(json["value"].is_null());
    assert_eq!(json["date-time"], "2021-06-10T20:00:00Z");
}

#[test]
fn test_office_type_field_name() {
    let office = Office {
        name: "SWT".to_string(),
        long_name: "Tulsa District".to_string(),
        office_type: office_type_name("DIS").to_string(),
        reports_to: Some("SWD".to_string()),
    };
    let json = serde_json::to_value(&office).unwrap();
    assert_eq!(json["type"], "district");
    assert_eq!(json["reports-to"], "SWD");
}

#[test]
fn test_group_without_assignments_omits_field() {
    let group = LocationGroup {
        category: LocationCategory {
            office_id: "SWT".to_string(),
            id: "Basin".to_string(),
            description: None,
        },
        office_id: "SWT".to_string(),
        id: "Arkansas".to_string(),
        description: None,
        shared_alias_id: None,
        shared_ref_location_id: None,
        attribute: None,
        assigned_locations: Vec::new(),
    };
    let json = serde_json::to_value(&group).unwrap();
    assert!(json.get("assigned-locations").is_none());
}

// Matches migrations/2024-05-01-000000_create_cwms_tables.

diesel::table! {
    offices (office_id) {
        office_id -> Text,
        long_name -> Text,
        office_type -> Text,
        reports_to -> Nullable<Text>,
    }
}

diesel::table! {
    timeseries (ts_code) {
        ts_code -> Int8,
        office_id -> Text,
        ts_id -> Text,
        storage_unit -> Text,
        si_unit -> Text,
        en_unit -> Text,
        interval_minutes -> Int8,
    }
}

diesel::table! {
    timeseries_values (ts_code, date_time) {
        ts_code -> Int8,
        date_time -> Timestamptz,
        value -> Nullable<Float8>,
        quality_code -> Nullable<Int4>,
    }
}

diesel::table! {
    unit_conversions (from_unit, to_unit) {
        from_unit -> Text,
        to_unit -> Text,
        factor -> Float8,
        offset_value -> Float8,
    }
}

diesel::table! {
    locations (location_code) {
        location_code -> Int8,
        office_id -> Text,
        location_id -> Text,
        nearest_city -> Nullable<Text>,
        public_name -> Nullable<Text>,
        long_name -> Nullable<Text>,
        description -> Nullable<Text>,
        kind -> Nullable<Text>,
        time_zone -> Nullable<Text>,
        latitude -> Nullable<Float8>,
        longitude -> Nullable<Float8>,
        elevation -> Nullable<Float8>,
        state -> Nullable<Text>,
        county -> Nullable<Text>,
        nation -> Nullable<Text>,
        active -> Bool,
    }
}

diesel::table! {
    location_categories (office_id, category_id) {
        office_id -> Text,
        category_id -> Text,
        description -> Nullable<Text>,
    }
}

diesel::table! {
    location_groups (office_id, category_id, group_id) {
        office_id -> Text,
        category_id -> Text,
        group_id -> Text,
        description -> Nullable<Text>,
        shared_alias_id -> Nullable<Text>,
        shared_ref_location_id -> Nullable<Text>,
        attribute -> Nullable<Int8>,
    }
}

diesel::table! {
    location_group_assignments (office_id, category_id, group_id, location_id) {
        office_id -> Text,
        category_id -> Text,
        group_id -> Text,
        location_id -> Text,
        alias_id -> Nullable<Text>,
        attribute -> Nullable<Int8>,
        ref_location_id -> Nullable<Text>,
    }
}

diesel::table! {
    timeseries_categories (office_id, category_id) {
        office_id -> Text,
        category_id -> Text,
        description -> Nullable<Text>,
    }
}

diesel::table! {
    timeseries_groups (office_id, category_id, group_id) {
        office_id -> Text,
        category_id -> Text,
        group_id -> Text,
        description -> Nullable<Text>,
        shared_alias_id -> Nullable<Text>,
        shared_ref_ts_id -> Nullable<Text>,
    }
}

diesel::joinable!(timeseries_values -> timeseries (ts_code));

diesel::allow_tables_to_appear_in_same_query!(
    offices,
    timeseries,
    timeseries_values,
    unit_conversions,
    locations,
    location_categories,
    location_groups,
    location_group_assignments,
    timeseries_categories,
    timeseries_groups,
);

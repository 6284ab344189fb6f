use serde_json::Value;
use tracing::{debug, info};

use crate::records::{parse_coordinate, RestaurantLocationRecord, RestaurantRecord};
use crate::sources::OpenDataRecord;

/// First location id handed to restaurants.
pub const RESTAURANT_LOCATION_ID_START: i64 = 234;

const DROPPED_FIELDS: [&str; 22] = [
    "sidewalk_dimensions_length",
    "sidewalk_dimensions_width",
    "sidewalk_dimensions_area",
    "approved_for_sidewalk_seating",
    "approved_for_roadway_seating",
    "qualify_alcohol",
    "sla_serial_number",
    "sla_license_type",
    "landmark_district_or_building",
    "healthcompliance_terms",
    "time_of_submission",
    "community_board",
    "council_district",
    "census_tract",
    "bin",
    "bbl",
    "roadway_dimensions_length",
    "roadway_dimensions_width",
    "roadway_dimensions_area",
    "globalid",
    "objectid",
    "food_service_establishment",
];

const FIELD_RENAMES: [(&str, &str); 1] = [("bulding_number", "building_number")];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestaurantTables {
    pub restaurants: Vec<RestaurantRecord>,
    pub locations: Vec<RestaurantLocationRecord>,
}

/// Location ids for restaurants start at 234, or right after the filming
/// range when that range reaches past it.
pub fn restaurant_location_offset(filming_count: usize) -> i64 {
    RESTAURANT_LOCATION_ID_START.max(filming_count as i64 + 1)
}

pub fn normalize_restaurants(
    records: Vec<OpenDataRecord>,
    filming_count: usize,
) -> RestaurantTables {
    let offset = restaurant_location_offset(filming_count);
    let mut tables = RestaurantTables::default();

    for ((record, restaurant_id), location_id) in records.into_iter().zip(1_i64..).zip(offset..) {
        let record = clean_record(record);
        tables.restaurants.push(RestaurantRecord {
            restaurant_id,
            location_id,
            restaurant_name: text_field(&record, "restaurant_name"),
            legal_business_name: text_field(&record, "legal_business_name"),
            doing_business_as_dba: text_field(&record, "doing_business_as_dba"),
            seating_interest_sidewalk: text_field(&record, "seating_interest_sidewalk"),
            landmarkdistrict_terms: is_yes(text_field(&record, "landmarkdistrict_terms")),
        });
        tables.locations.push(RestaurantLocationRecord {
            location_id,
            building_number: text_field(&record, "building_number"),
            street: text_field(&record, "street"),
            borough: text_field(&record, "borough"),
            zip: text_field(&record, "zip"),
            business_address: text_field(&record, "business_address"),
            latitude: parse_coordinate(text_field(&record, "latitude").as_deref()),
            longitude: parse_coordinate(text_field(&record, "longitude").as_deref()),
            nta: text_field(&record, "nta"),
        });
    }

    info!(
        restaurants = tables.restaurants.len(),
        first_location_id = offset,
        "normalized restaurants"
    );
    tables
}

/// Removes unused fields and fixes the misspelled building number key.
fn clean_record(mut record: OpenDataRecord) -> OpenDataRecord {
    let before = record.len();
    for field in DROPPED_FIELDS {
        record.remove(field);
    }
    for (from, to) in FIELD_RENAMES {
        if let Some(value) = record.remove(from) {
            record.insert(to.to_string(), value);
        }
    }
    debug!(dropped = before - record.len(), "cleaned restaurant record");
    record
}

fn text_field(record: &OpenDataRecord, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn is_yes(value: Option<String>) -> bool {
    value
        .map(|text| text.eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}

use std::collections::HashSet;

use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::records::{
    FilmingLocationRecord, RestaurantLocationRecord, SourceType, UnifiedLocation,
};

/// Concatenates filming and restaurant locations into one set, filming rows
/// first. Locations are not merged by proximity.
pub fn unify_locations(
    filming: &[FilmingLocationRecord],
    restaurants: &[RestaurantLocationRecord],
) -> AppResult<Vec<UnifiedLocation>> {
    let mut unified = Vec::with_capacity(filming.len() + restaurants.len());
    unified.extend(filming.iter().map(from_filming));
    unified.extend(restaurants.iter().map(from_restaurant));

    let mut seen = HashSet::with_capacity(unified.len());
    if let Some(duplicate) = unified.iter().find(|loc| !seen.insert(loc.location_id)) {
        return Err(AppError::Parse(format!(
            "location id {} is used by more than one source row",
            duplicate.location_id
        )));
    }

    info!(
        filming = filming.len(),
        restaurant = restaurants.len(),
        "unified locations"
    );
    Ok(unified)
}

fn from_filming(record: &FilmingLocationRecord) -> UnifiedLocation {
    UnifiedLocation {
        location_id: record.location_id,
        building_number: None,
        street: None,
        zip: None,
        borough: record.borough.clone(),
        address: record.address.clone(),
        address_indicator: record.address_indicator.clone(),
        neighborhood_or_nta: record.neighborhood.clone(),
        latitude: record.latitude,
        longitude: record.longitude,
        source_type: SourceType::Filming,
    }
}

fn from_restaurant(record: &RestaurantLocationRecord) -> UnifiedLocation {
    UnifiedLocation {
        location_id: record.location_id,
        building_number: record.building_number.clone(),
        street: record.street.clone(),
        zip: record.zip.clone(),
        borough: record.borough.clone(),
        address: record.business_address.clone(),
        address_indicator: None,
        neighborhood_or_nta: record.nta.clone(),
        latitude: record.latitude,
        longitude: record.longitude,
        source_type: SourceType::Restaurant,
    }
}

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::geocode::client::{GeocodeHit, Geocoder};
use crate::geocode::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::records::{GeocodeStatus, StandardizedLocation, UnifiedLocation};

pub const NO_RESPONSE: &str = "No response or invalid data";
pub const NOTHING_TO_GEOCODE: &str = "No coordinates or street address";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeocodeStats {
    pub total: usize,
    pub reverse_hits: usize,
    pub forward_hits: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Reverse,
    Forward,
    Failed,
}

/// Resolves unified locations to standardized addresses, reverse geocoding
/// when coordinates exist and forward geocoding otherwise.
pub struct GeocodeReconciler {
    geocoder: Arc<dyn Geocoder>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl GeocodeReconciler {
    pub fn new(geocoder: Arc<dyn Geocoder>, policy: RetryPolicy) -> Self {
        Self::with_sleeper(geocoder, policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        geocoder: Arc<dyn Geocoder>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            geocoder,
            policy,
            sleeper,
        }
    }

    pub async fn standardize_all(
        &self,
        locations: &[UnifiedLocation],
    ) -> (Vec<StandardizedLocation>, GeocodeStats) {
        let mut stats = GeocodeStats {
            total: locations.len(),
            ..GeocodeStats::default()
        };
        let mut results = Vec::with_capacity(locations.len());
        for location in locations {
            let (standardized, resolution) = self.resolve(location).await;
            match resolution {
                Resolution::Reverse => stats.reverse_hits += 1,
                Resolution::Forward => stats.forward_hits += 1,
                Resolution::Failed => stats.failed += 1,
            }
            results.push(standardized);
        }
        info!(
            total = stats.total,
            reverse = stats.reverse_hits,
            forward = stats.forward_hits,
            failed = stats.failed,
            "geocoded locations"
        );
        (results, stats)
    }

    pub async fn standardize(&self, location: &UnifiedLocation) -> StandardizedLocation {
        self.resolve(location).await.0
    }

    async fn resolve(&self, location: &UnifiedLocation) -> (StandardizedLocation, Resolution) {
        if let Some((latitude, longitude)) = location.coordinates() {
            let hit = self
                .policy
                .run(self.sleeper.as_ref(), "reverse", || {
                    self.geocoder.reverse(latitude, longitude)
                })
                .await;
            return match hit {
                Some(hit) => (success(location, hit), Resolution::Reverse),
                None => (failure(location, NO_RESPONSE), Resolution::Failed),
            };
        }

        let queries = forward_queries(location);
        if queries.is_empty() {
            debug!(location_id = location.location_id, "nothing to geocode");
            return (failure(location, NOTHING_TO_GEOCODE), Resolution::Failed);
        }
        for query in &queries {
            let hit = self
                .policy
                .run(self.sleeper.as_ref(), "search", || {
                    self.geocoder.search(query)
                })
                .await;
            if let Some(hit) = hit {
                return (success(location, hit), Resolution::Forward);
            }
        }
        (failure(location, NO_RESPONSE), Resolution::Failed)
    }
}

/// Address strings to try, least specific first: street, zip and borough,
/// then the same prefixed with the building number. A format is skipped
/// when its street or building number is missing.
pub fn forward_queries(location: &UnifiedLocation) -> Vec<String> {
    let Some(street) = location.street.as_deref() else {
        return Vec::new();
    };
    let tail = [location.zip.as_deref(), location.borough.as_deref()];

    let mut queries = vec![join_parts(
        std::iter::once(Some(street)).chain(tail.iter().copied()),
    )];
    if let Some(building) = location.building_number.as_deref() {
        queries.push(join_parts(
            [Some(building), Some(street)]
                .into_iter()
                .chain(tail.iter().copied()),
        ));
    }
    queries
}

fn join_parts<'a>(parts: impl Iterator<Item = Option<&'a str>>) -> String {
    parts
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn success(location: &UnifiedLocation, hit: GeocodeHit) -> StandardizedLocation {
    let address = hit.address;
    StandardizedLocation {
        location_id: location.location_id,
        source_type: location.source_type,
        status: GeocodeStatus::Success,
        failure_reason: None,
        address_type: blank_to_none(hit.address_type),
        name: blank_to_none(hit.name),
        display_name: blank_to_none(hit.display_name),
        latitude: hit.lat,
        longitude: hit.lon,
        house_number: blank_to_none(address.house_number),
        road: blank_to_none(address.road),
        neighbourhood: blank_to_none(address.neighbourhood),
        suburb: blank_to_none(address.suburb),
        county: blank_to_none(address.county),
        city: blank_to_none(address.city),
        state: blank_to_none(address.state),
        region_code: blank_to_none(address.region_code),
        postcode: blank_to_none(address.postcode),
        country: blank_to_none(address.country),
        country_code: blank_to_none(address.country_code),
    }
}

// Empty strings do not survive the CSV cache, so they are stored as null.
fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

/// Keeps whatever the source row carried; administrative fields stay empty.
fn failure(location: &UnifiedLocation, reason: &str) -> StandardizedLocation {
    StandardizedLocation {
        location_id: location.location_id,
        source_type: location.source_type,
        status: GeocodeStatus::Failed,
        failure_reason: Some(reason.to_string()),
        address_type: None,
        name: None,
        display_name: None,
        latitude: location.latitude,
        longitude: location.longitude,
        house_number: location.building_number.clone(),
        road: location.street.clone(),
        neighbourhood: location.neighborhood_or_nta.clone(),
        suburb: None,
        county: None,
        city: None,
        state: None,
        region_code: None,
        postcode: location.zip.clone(),
        country: None,
        country_code: None,
    }
}

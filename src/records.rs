//! Typed record sets passed between pipeline stages.

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// Header plus positional rows, as produced by the spreadsheet and CSV readers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<Option<String>>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<Option<String>>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolves a header case-insensitively.
    pub fn column(&self, source_name: &'static str, name: &str) -> AppResult<usize> {
        self.headers
            .iter()
            .position(|header| {
                header
                    .as_deref()
                    .map(|value| value.trim().eq_ignore_ascii_case(name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| AppError::MissingColumn {
                source_name,
                column: name.to_string(),
            })
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .and_then(|cell| cell.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Filming,
    Restaurant,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Filming => "filming",
            SourceType::Restaurant => "restaurant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeocodeStatus {
    Success,
    Failed,
}

impl GeocodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeocodeStatus::Success => "success",
            GeocodeStatus::Failed => "failed",
        }
    }
}

/// One catalog row after id extraction and list conversion, before dedup.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMovieRecord {
    pub imdb_id: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub director: Option<String>,
    pub writer: Option<String>,
    pub overview: Option<String>,
    pub rating: Option<String>,
    pub nb_users_ratings: Option<String>,
    pub genres: Vec<String>,
    pub actors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movie {
    pub imdb_id: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub director: Option<String>,
    pub writer: Option<String>,
    pub overview: Option<String>,
    pub rating: Option<f64>,
    pub nb_users_ratings: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Genre {
    pub genre_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub actor_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MovieGenreLink {
    pub imdb_id: Option<String>,
    pub genre_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MovieActorLink {
    pub imdb_id: Option<String>,
    pub actor_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilmingLocationRecord {
    pub location_id: i64,
    pub title: Option<String>,
    pub director_imdb_id: Option<String>,
    pub address: Option<String>,
    pub address_indicator: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub borough: Option<String>,
    pub neighborhood: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilmingLocationLink {
    pub location_id: i64,
    pub imdb_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestaurantRecord {
    pub restaurant_id: i64,
    pub location_id: i64,
    pub restaurant_name: Option<String>,
    pub legal_business_name: Option<String>,
    pub doing_business_as_dba: Option<String>,
    pub seating_interest_sidewalk: Option<String>,
    pub landmarkdistrict_terms: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantLocationRecord {
    pub location_id: i64,
    pub building_number: Option<String>,
    pub street: Option<String>,
    pub borough: Option<String>,
    pub zip: Option<String>,
    pub business_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub nta: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedLocation {
    pub location_id: i64,
    pub building_number: Option<String>,
    pub street: Option<String>,
    pub zip: Option<String>,
    pub borough: Option<String>,
    pub address: Option<String>,
    pub address_indicator: Option<String>,
    pub neighborhood_or_nta: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub source_type: SourceType,
}

impl UnifiedLocation {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if !lat.is_nan() && !lon.is_nan() => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Geocoding output, persisted as the location-table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedLocation {
    pub location_id: i64,
    pub source_type: SourceType,
    pub status: GeocodeStatus,
    pub failure_reason: Option<String>,
    pub address_type: Option<String>,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub house_number: Option<String>,
    pub road: Option<String>,
    pub neighbourhood: Option<String>,
    pub suburb: Option<String>,
    pub county: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "ISO3166-2-lvl4")]
    pub region_code: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub(crate) fn parse_coordinate(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

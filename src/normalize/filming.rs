use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::errors::AppResult;
use crate::records::{
    non_empty, parse_coordinate, FilmingLocationLink, FilmingLocationRecord, RawTable,
};

const SOURCE: &str = "filming locations";

static TITLE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"tt\d+").unwrap());
static NAME_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"nm\d+").unwrap());
static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilmingTables {
    pub locations: Vec<FilmingLocationRecord>,
    pub links: Vec<FilmingLocationLink>,
}

/// Numbers rows from 1 in input order and splits them into location
/// attributes and location-to-movie links.
pub fn normalize_filming_locations(table: &RawTable) -> AppResult<FilmingTables> {
    let imdb_link = table.column(SOURCE, "IMDB LINK")?;
    let director_link = table.column(SOURCE, "Director/Filmmaker IMDB Link")?;
    let display_text = table.column(SOURCE, "Location Display Text")?;
    let indicator = table.column(SOURCE, "Client or book location indicator")?;
    let title = table.column(SOURCE, "Movie Title")?;
    let latitude = table.column(SOURCE, "Latitude")?;
    let longitude = table.column(SOURCE, "Longitude")?;
    let borough = table.column(SOURCE, "Borough")?;
    let neighborhood = table.column(SOURCE, "Neighborhood")?;

    let mut tables = FilmingTables::default();
    for (row, location_id) in (0..table.len()).zip(1_i64..) {
        tables.locations.push(FilmingLocationRecord {
            location_id,
            title: non_empty(table.cell(row, title)),
            director_imdb_id: extract_director_id(table.cell(row, director_link)),
            address: clean_location_text(table.cell(row, display_text)),
            address_indicator: clean_location_text(table.cell(row, indicator)),
            latitude: parse_coordinate(table.cell(row, latitude)),
            longitude: parse_coordinate(table.cell(row, longitude)),
            borough: non_empty(table.cell(row, borough)),
            neighborhood: non_empty(table.cell(row, neighborhood)),
        });
        tables.links.push(FilmingLocationLink {
            location_id,
            imdb_id: extract_title_id(table.cell(row, imdb_link)),
        });
    }

    info!(
        locations = tables.locations.len(),
        with_imdb_id = tables.links.iter().filter(|l| l.imdb_id.is_some()).count(),
        with_director_id = tables
            .locations
            .iter()
            .filter(|l| l.director_imdb_id.is_some())
            .count(),
        "normalized filming locations"
    );
    Ok(tables)
}

pub fn extract_title_id(link: Option<&str>) -> Option<String> {
    link.and_then(|value| TITLE_ID.find(value))
        .map(|m| m.as_str().to_string())
}

pub fn extract_director_id(link: Option<&str>) -> Option<String> {
    link.and_then(|value| NAME_ID.find(value))
        .map(|m| m.as_str().to_string())
}

/// Replaces markup tags with spaces and collapses whitespace runs. Text that
/// is empty once tags are gone becomes `None`.
pub fn clean_location_text(value: Option<&str>) -> Option<String> {
    let without_tags = MARKUP_TAG.replace_all(value?, " ");
    let collapsed = WHITESPACE_RUN.replace_all(&without_tags, " ");
    non_empty(Some(&collapsed))
}

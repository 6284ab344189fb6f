//! Mapping from in-memory records to target table columns.

use rusqlite::types::Value;
use serde::Serialize;

use crate::records::{
    Actor, FilmingLocationLink, Genre, Movie, MovieActorLink, MovieGenreLink, RestaurantRecord,
    StandardizedLocation,
};

/// A record that can be inserted as one row of `TABLE`.
///
/// `values` must line up with `COLUMNS`.
pub trait TableRow: Clone + Serialize {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn values(&self) -> Vec<Value>;
}

pub fn insert_sql<R: TableRow>() -> String {
    let placeholders = (1..=R::COLUMNS.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders
    )
}

fn text(value: &Option<String>) -> Value {
    value.clone().map(Value::Text).unwrap_or(Value::Null)
}

fn real(value: Option<f64>) -> Value {
    value.map(Value::Real).unwrap_or(Value::Null)
}

impl TableRow for Movie {
    const TABLE: &'static str = "fc_movies";
    const COLUMNS: &'static [&'static str] = &[
        "mov_imdb_id",
        "mov_title",
        "mov_year",
        "mov_director",
        "mov_writer",
        "mov_overview",
        "mov_rating",
        "mov_nb_users_ratings",
    ];

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.imdb_id),
            text(&self.title),
            self.year.map(|y| Value::Integer(y.into())).unwrap_or(Value::Null),
            text(&self.director),
            text(&self.writer),
            text(&self.overview),
            real(self.rating),
            text(&self.nb_users_ratings),
        ]
    }
}

impl TableRow for Genre {
    const TABLE: &'static str = "fc_genres";
    const COLUMNS: &'static [&'static str] = &["gen_id", "gen_name"];

    fn values(&self) -> Vec<Value> {
        vec![Value::Integer(self.genre_id), Value::Text(self.name.clone())]
    }
}

impl TableRow for Actor {
    const TABLE: &'static str = "fc_actors";
    const COLUMNS: &'static [&'static str] = &["act_id", "act_name"];

    fn values(&self) -> Vec<Value> {
        vec![Value::Integer(self.actor_id), Value::Text(self.name.clone())]
    }
}

impl TableRow for MovieGenreLink {
    const TABLE: &'static str = "fc_genres_movies";
    const COLUMNS: &'static [&'static str] = &["gm_genre_id", "gm_imdb_id"];

    fn values(&self) -> Vec<Value> {
        vec![Value::Integer(self.genre_id), text(&self.imdb_id)]
    }
}

impl TableRow for MovieActorLink {
    const TABLE: &'static str = "fc_actors_movies";
    const COLUMNS: &'static [&'static str] = &["am_actor_id", "am_imdb_id"];

    fn values(&self) -> Vec<Value> {
        vec![Value::Integer(self.actor_id), text(&self.imdb_id)]
    }
}

impl TableRow for StandardizedLocation {
    const TABLE: &'static str = "fc_locations";
    const COLUMNS: &'static [&'static str] = &[
        "loc_id",
        "loc_source_type",
        "loc_status",
        "loc_failure_reason",
        "loc_address_type",
        "loc_name",
        "loc_display_name",
        "loc_latitude",
        "loc_longitude",
        "loc_house_number",
        "loc_road",
        "loc_neighborhood",
        "loc_suburb",
        "loc_county",
        "loc_city",
        "loc_state",
        "loc_iso3166_2_lvl4",
        "loc_postcode",
        "loc_country",
        "loc_country_code",
    ];

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.location_id),
            Value::Text(self.source_type.as_str().to_string()),
            Value::Text(self.status.as_str().to_string()),
            text(&self.failure_reason),
            text(&self.address_type),
            text(&self.name),
            text(&self.display_name),
            real(self.latitude),
            real(self.longitude),
            text(&self.house_number),
            text(&self.road),
            text(&self.neighbourhood),
            text(&self.suburb),
            text(&self.county),
            text(&self.city),
            text(&self.state),
            text(&self.region_code),
            text(&self.postcode),
            text(&self.country),
            text(&self.country_code),
        ]
    }
}

impl TableRow for FilmingLocationLink {
    const TABLE: &'static str = "fc_filming_locations";
    const COLUMNS: &'static [&'static str] = &["fl_location_id", "fl_imdb_id"];

    fn values(&self) -> Vec<Value> {
        vec![Value::Integer(self.location_id), text(&self.imdb_id)]
    }
}

impl TableRow for RestaurantRecord {
    const TABLE: &'static str = "fc_restaurants";
    const COLUMNS: &'static [&'static str] = &[
        "res_id",
        "res_name",
        "res_legal_business_name",
        "res_doing_business_as_dba",
        "res_seating_interest_sidewalk",
        "res_landmarkdistrict_terms",
        "res_location_id",
    ];

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.restaurant_id),
            text(&self.restaurant_name),
            text(&self.legal_business_name),
            text(&self.doing_business_as_dba),
            text(&self.seating_interest_sidewalk),
            Value::Integer(self.landmarkdistrict_terms.into()),
            Value::Integer(self.location_id),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_numbered_insert_statement() {
        assert_eq!(
            insert_sql::<Genre>(),
            "INSERT INTO fc_genres (gen_id, gen_name) VALUES (?1, ?2)"
        );
    }

    #[test]
    fn restaurant_flag_is_stored_as_integer() {
        let record = RestaurantRecord {
            restaurant_id: 1,
            location_id: 234,
            restaurant_name: Some("Joe's".into()),
            legal_business_name: None,
            doing_business_as_dba: None,
            seating_interest_sidewalk: Some("both".into()),
            landmarkdistrict_terms: true,
        };
        let values = record.values();
        assert_eq!(values.len(), RestaurantRecord::COLUMNS.len());
        assert_eq!(values[5], Value::Integer(1));
        assert_eq!(values[2], Value::Null);
    }
}

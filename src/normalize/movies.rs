use std::collections::{BTreeSet, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::errors::AppResult;
use crate::normalize::literal::parse_string_list;
use crate::records::{
    non_empty, Actor, Genre, Movie, MovieActorLink, MovieGenreLink, RawMovieRecord, RawTable,
};

const SOURCE: &str = "movie catalog";
const NO_RATING: &str = "no-rating";

static TITLE_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"/title/(tt\d+)/").unwrap());
static FOUR_DIGIT_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}\b").unwrap());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieTables {
    pub movies: Vec<Movie>,
    pub genres: Vec<Genre>,
    pub movie_genres: Vec<MovieGenreLink>,
    pub actors: Vec<Actor>,
    pub movie_actors: Vec<MovieActorLink>,
}

struct MovieColumns {
    path: usize,
    genres: usize,
    cast: usize,
    title: usize,
    year: usize,
    director: usize,
    writer: usize,
    overview: usize,
    rating: usize,
    user_rating: usize,
}

impl MovieColumns {
    fn resolve(table: &RawTable) -> AppResult<Self> {
        Ok(Self {
            path: table.column(SOURCE, "path")?,
            genres: table.column(SOURCE, "Generes")?,
            cast: table.column(SOURCE, "Top 5 Casts")?,
            title: table.column(SOURCE, "movie title")?,
            year: table.column(SOURCE, "year")?,
            director: table.column(SOURCE, "director")?,
            writer: table.column(SOURCE, "writer")?,
            overview: table.column(SOURCE, "overview")?,
            rating: table.column(SOURCE, "Rating")?,
            user_rating: table.column(SOURCE, "User Rating")?,
        })
    }
}

pub fn normalize_movies(table: &RawTable) -> AppResult<MovieTables> {
    let records = read_movie_records(table)?;
    let tables = build_movie_tables(records);
    info!(
        movies = tables.movies.len(),
        genres = tables.genres.len(),
        movie_genres = tables.movie_genres.len(),
        actors = tables.actors.len(),
        movie_actors = tables.movie_actors.len(),
        "normalized movie catalog"
    );
    Ok(tables)
}

/// Extracts ids, years and list columns. Rows without an IMDb id are kept
/// with a null id.
pub fn read_movie_records(table: &RawTable) -> AppResult<Vec<RawMovieRecord>> {
    let columns = MovieColumns::resolve(table)?;
    (0..table.len())
        .map(|row| {
            Ok(RawMovieRecord {
                imdb_id: extract_imdb_id(table.cell(row, columns.path)),
                title: non_empty(table.cell(row, columns.title)),
                year: extract_year(table.cell(row, columns.year)),
                director: non_empty(table.cell(row, columns.director)),
                writer: non_empty(table.cell(row, columns.writer)),
                overview: non_empty(table.cell(row, columns.overview)),
                rating: non_empty(table.cell(row, columns.rating)),
                nb_users_ratings: non_empty(table.cell(row, columns.user_rating)),
                genres: parse_string_list("Generes", table.cell(row, columns.genres))?,
                actors: parse_string_list("Top 5 Casts", table.cell(row, columns.cast))?,
            })
        })
        .collect()
}

/// Builds the movie table plus genre/actor lookups and links.
///
/// The genre lookup and links are built from every row, before duplicate
/// IMDb ids are collapsed; the actor lookup and links only see the
/// surviving rows. A movie can therefore be linked to a genre that only a
/// dropped duplicate row carried.
pub fn build_movie_tables(records: Vec<RawMovieRecord>) -> MovieTables {
    let genres = build_lookup(records.iter().map(|record| record.genres.as_slice()));
    let movie_genres = build_links(&records, &genres, |record| &record.genres)
        .into_iter()
        .map(|(imdb_id, genre_id)| MovieGenreLink { imdb_id, genre_id })
        .collect();

    let records = dedup_by_imdb_id(records);

    let actors = build_lookup(records.iter().map(|record| record.actors.as_slice()));
    let movie_actors = build_links(&records, &actors, |record| &record.actors)
        .into_iter()
        .map(|(imdb_id, actor_id)| MovieActorLink { imdb_id, actor_id })
        .collect();

    MovieTables {
        movies: records.into_iter().map(finalize_movie).collect(),
        genres: genres
            .iter()
            .map(|(name, genre_id)| Genre {
                genre_id: *genre_id,
                name: name.clone(),
            })
            .collect(),
        movie_genres,
        actors: actors
            .iter()
            .map(|(name, actor_id)| Actor {
                actor_id: *actor_id,
                name: name.clone(),
            })
            .collect(),
        movie_actors,
    }
}

pub fn extract_imdb_id(path: Option<&str>) -> Option<String> {
    path.and_then(|value| TITLE_PATH.captures(value))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn extract_year(value: Option<&str>) -> Option<i32> {
    value
        .and_then(|text| FOUR_DIGIT_YEAR.find(text))
        .and_then(|m| m.as_str().parse().ok())
}

fn parse_rating(value: Option<String>) -> Option<f64> {
    let value = value?;
    if value.eq_ignore_ascii_case(NO_RATING) {
        return None;
    }
    match value.parse::<f64>() {
        Ok(rating) => Some(rating),
        Err(_) => {
            debug!(rating = %value, "unparseable rating; storing null");
            None
        }
    }
}

fn finalize_movie(record: RawMovieRecord) -> Movie {
    Movie {
        imdb_id: record.imdb_id,
        title: record.title,
        year: record.year,
        director: record.director,
        writer: record.writer,
        overview: record.overview,
        rating: parse_rating(record.rating),
        nb_users_ratings: record.nb_users_ratings,
    }
}

/// Keeps the first row per IMDb id. Rows without an id collapse together.
fn dedup_by_imdb_id(records: Vec<RawMovieRecord>) -> Vec<RawMovieRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.imdb_id.clone()))
        .collect()
}

/// Unique values sorted, numbered from 1.
fn build_lookup<'a>(lists: impl Iterator<Item = &'a [String]>) -> Vec<(String, i64)> {
    lists
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .zip(1..)
        .collect()
}

fn build_links<F>(
    records: &[RawMovieRecord],
    lookup: &[(String, i64)],
    values: F,
) -> Vec<(Option<String>, i64)>
where
    F: Fn(&RawMovieRecord) -> &Vec<String>,
{
    let ids = lookup
        .iter()
        .map(|(name, id)| (name.as_str(), *id))
        .collect::<HashMap<_, _>>();
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for record in records {
        for value in values(record) {
            let Some(&id) = ids.get(value.as_str()) else {
                continue;
            };
            let link = (record.imdb_id.clone(), id);
            if seen.insert(link.clone()) {
                links.push(link);
            }
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: [&str; 12] = [
        "movie title",
        "Run Time",
        "Rating",
        "User Rating",
        "Generes",
        "Overview",
        "Plot Kyeword",
        "Director",
        "Top 5 Casts",
        "Writer",
        "year",
        "path",
    ];

    fn row(title: &str, rating: &str, genres: &str, cast: &str, year: &str, path: &str) -> Vec<Option<String>> {
        [
            title, "2h", rating, "1.2M", genres, "overview", "[]", "Michael Mann", cast,
            "Michael Mann", year, path,
        ]
        .iter()
        .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
        .collect()
    }

    fn table(rows: Vec<Vec<Option<String>>>) -> RawTable {
        RawTable::new(HEADERS.iter().map(|h| Some(h.to_string())).collect(), rows)
    }

    #[test]
    fn extracts_imdb_id_from_detail_path() {
        assert_eq!(
            extract_imdb_id(Some("/title/tt0113277/?ref_=adv_li_tt")),
            Some("tt0113277".to_string())
        );
        assert_eq!(extract_imdb_id(Some("/name/nm0000520/")), None);
        assert_eq!(extract_imdb_id(Some("tt0113277")), None);
        assert_eq!(extract_imdb_id(None), None);
    }

    #[test]
    fn keeps_first_four_digit_year() {
        assert_eq!(extract_year(Some("(1995)")), Some(1995));
        assert_eq!(extract_year(Some("2019–2021 (TV)")), Some(2019));
        assert_eq!(extract_year(Some("12345")), None);
        assert_eq!(extract_year(None), None);
    }

    #[test]
    fn lookups_are_unique_and_links_resolve() {
        let table = table(vec![
            row("Heat", "8.3", "['Crime', 'Drama']", "['Al Pacino', 'Robert De Niro']", "(1995)", "/title/tt0113277/"),
            row("Heat again", "no-rating", "['Drama', 'Drama', 'Action']", "['Al Pacino', 'Val Kilmer']", "(1995)", "/title/tt0113277/"),
            row("Collateral", "7.5", "['Crime']", "['Tom Cruise']", "2004", "/title/tt0369339/"),
        ]);
        let tables = normalize_movies(&table).unwrap();

        let genre_names = tables.genres.iter().map(|g| g.name.as_str()).collect::<Vec<_>>();
        assert_eq!(genre_names, vec!["Action", "Crime", "Drama"]);
        assert_eq!(
            tables.genres.iter().map(|g| g.genre_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let genre_ids = tables.genres.iter().map(|g| g.genre_id).collect::<HashSet<_>>();
        assert!(tables.movie_genres.iter().all(|l| genre_ids.contains(&l.genre_id)));
        let unique_links = tables.movie_genres.iter().cloned().collect::<HashSet<_>>();
        assert_eq!(unique_links.len(), tables.movie_genres.len());

        let actor_ids = tables.actors.iter().map(|a| a.actor_id).collect::<HashSet<_>>();
        assert!(tables.movie_actors.iter().all(|l| actor_ids.contains(&l.actor_id)));
    }

    #[test]
    fn genres_see_duplicate_rows_but_actors_do_not() {
        let table = table(vec![
            row("Heat", "8.3", "['Crime']", "['Al Pacino']", "1995", "/title/tt0113277/"),
            row("Heat dup", "8.0", "['Action']", "['Val Kilmer']", "1995", "/title/tt0113277/"),
        ]);
        let tables = normalize_movies(&table).unwrap();

        assert_eq!(tables.movies.len(), 1);
        assert_eq!(tables.movies[0].title.as_deref(), Some("Heat"));
        assert_eq!(tables.genres.len(), 2);
        assert_eq!(tables.movie_genres.len(), 2);
        assert_eq!(tables.actors.len(), 1);
        assert_eq!(tables.actors[0].name, "Al Pacino");
    }

    #[test]
    fn rating_sentinel_becomes_null_and_missing_id_is_kept() {
        let table = table(vec![row(
            "Unknown",
            "no-rating",
            "[]",
            "[]",
            "",
            "/search/?q=unknown",
        )]);
        let tables = normalize_movies(&table).unwrap();
        assert_eq!(tables.movies.len(), 1);
        assert_eq!(tables.movies[0].imdb_id, None);
        assert_eq!(tables.movies[0].rating, None);
        assert_eq!(tables.movies[0].year, None);
    }

    #[test]
    fn malformed_list_literal_is_fatal() {
        let table = table(vec![row("Heat", "8.3", "Crime, Drama", "[]", "1995", "/title/tt0113277/")]);
        assert!(matches!(
            normalize_movies(&table),
            Err(crate::errors::AppError::ListLiteral { .. })
        ));
    }

    #[test]
    fn missing_column_is_fatal() {
        let table = RawTable::new(vec![Some("path".into())], Vec::new());
        assert!(matches!(
            normalize_movies(&table),
            Err(crate::errors::AppError::MissingColumn { .. })
        ));
    }
}

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::geocode::{
    geocode_with_cache, GeocodeCache, GeocodeReconciler, GeocodeStats, Geocoder,
    NominatimClient, RetryPolicy,
};
use crate::journal::RunJournal;
use crate::loader::{BatchLoader, LoadReport};
use crate::locations::unify_locations;
use crate::normalize::{
    normalize_filming_locations, normalize_movies, normalize_restaurants, FilmingTables,
    MovieTables, RestaurantTables,
};
use crate::records::{RawTable, StandardizedLocation, UnifiedLocation};
use crate::schema::TableRow;
use crate::sources::{read_filming_locations, CatalogClient, OpenDataClient, OpenDataRecord};

/// Rows per insert transaction for each target table.
#[derive(Debug, Clone, Copy)]
pub struct BatchSizes {
    pub movies: usize,
    pub locations: usize,
    pub restaurants: usize,
    pub genres: usize,
    pub actors: usize,
    pub movie_genres: usize,
    pub movie_actors: usize,
    pub filming_locations: usize,
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            movies: 500,
            locations: 50,
            restaurants: 20,
            genres: 5,
            actors: 5000,
            movie_genres: 800,
            movie_actors: 8000,
            filming_locations: 50,
        }
    }
}

/// Raw rows exactly as the three readers return them.
#[derive(Debug, Clone)]
pub struct SourceData {
    pub restaurants: Vec<OpenDataRecord>,
    pub filming_locations: RawTable,
    pub movies: RawTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformedSources {
    pub movies: MovieTables,
    pub filming: FilmingTables,
    pub restaurants: RestaurantTables,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table: &'static str,
    pub inserted: usize,
    pub failed_batches: usize,
    pub reprocessed: usize,
    pub failed_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub tables: Vec<TableSummary>,
    pub locations_from_cache: bool,
    pub geocode: Option<GeocodeStats>,
    pub geography_updated: Option<usize>,
}

impl RunSummary {
    pub fn table(&self, name: &str) -> Option<&TableSummary> {
        self.tables.iter().find(|summary| summary.table == name)
    }
}

pub struct Pipeline {
    config: AppConfig,
    open_data: OpenDataClient,
    catalog: CatalogClient,
    reconciler: GeocodeReconciler,
    cache: GeocodeCache,
    journal: RunJournal,
    batch_sizes: BatchSizes,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let geocoder: Arc<dyn Geocoder> = Arc::new(NominatimClient::new(&config.geocoder)?);
        Self::with_geocoder(config, geocoder)
    }

    pub fn with_geocoder(config: AppConfig, geocoder: Arc<dyn Geocoder>) -> AppResult<Self> {
        let reconciler =
            GeocodeReconciler::new(geocoder, RetryPolicy::from_config(&config.geocoder));
        Ok(Self {
            open_data: OpenDataClient::new(&config.open_data)?,
            catalog: CatalogClient::new(&config.catalog)?,
            cache: GeocodeCache::new(&config.geocode_cache_path),
            journal: RunJournal::from_config(&config)?,
            reconciler,
            batch_sizes: BatchSizes::default(),
            config,
        })
    }

    pub fn with_batch_sizes(mut self, batch_sizes: BatchSizes) -> Self {
        self.batch_sizes = batch_sizes;
        self
    }

    pub fn journal(&self) -> &RunJournal {
        &self.journal
    }

    /// Runs every stage in order. Any fatal error aborts the run before the
    /// next stage starts.
    pub async fn run(&self) -> AppResult<RunSummary> {
        self.journal.record(
            "run_started",
            json!({ "version": env!("CARGO_PKG_VERSION") }),
        );
        self.flush_journal();

        let sources = self.extract().await?;
        self.stage_finished(
            "extract",
            json!({
                "restaurants": sources.restaurants.len(),
                "filming_locations": sources.filming_locations.len(),
                "movies": sources.movies.len(),
            }),
        );

        let transformed = transform_sources(&sources)?;
        self.stage_finished(
            "transform",
            json!({
                "movies": transformed.movies.movies.len(),
                "genres": transformed.movies.genres.len(),
                "actors": transformed.movies.actors.len(),
                "filming_locations": transformed.filming.locations.len(),
                "restaurants": transformed.restaurants.restaurants.len(),
            }),
        );

        let unified = unify(&transformed)?;
        self.stage_finished("unify", json!({ "locations": unified.len() }));

        let outcome = geocode_with_cache(&self.reconciler, &self.cache, &unified).await?;
        self.stage_finished(
            "geocode",
            json!({
                "locations": outcome.locations.len(),
                "from_cache": outcome.from_cache,
                "stats": outcome.stats,
            }),
        );

        let mut loader = BatchLoader::open(&self.config.database)?;
        let tables = load_tables(
            &mut loader,
            &transformed,
            &outcome.locations,
            &self.batch_sizes,
            self.config.reprocess_failed_batches,
            &self.journal,
        )?;
        self.flush_journal();

        let geography_updated = loader.materialize_geography();
        let summary = RunSummary {
            tables,
            locations_from_cache: outcome.from_cache,
            geocode: outcome.stats,
            geography_updated,
        };
        self.stage_finished(
            "load",
            serde_json::to_value(&summary).unwrap_or_default(),
        );
        Ok(summary)
    }

    /// Reads the three sources: restaurants, then filming locations, then
    /// movies.
    pub async fn extract(&self) -> AppResult<SourceData> {
        let restaurants = self.open_data.fetch_records().await?;
        let filming_locations = read_filming_locations(&self.config.filming_locations_xml)?;
        let movies = self.catalog.fetch_movies().await?;
        Ok(SourceData {
            restaurants,
            filming_locations,
            movies,
        })
    }

    fn stage_finished(&self, stage: &str, payload: Value) {
        info!(stage, %payload, "stage finished");
        self.journal
            .record("stage_finished", json!({ "stage": stage, "details": payload }));
        self.flush_journal();
    }

    fn flush_journal(&self) {
        if let Err(err) = self.journal.flush() {
            warn!(
                ?err,
                queued = self.journal.queue_depth(),
                "failed to flush run journal"
            );
        }
    }
}

/// Normalizes every source. Restaurant location ids are offset past the
/// filming range, so filming locations are normalized first.
pub fn transform_sources(sources: &SourceData) -> AppResult<TransformedSources> {
    let movies = normalize_movies(&sources.movies)?;
    let filming = normalize_filming_locations(&sources.filming_locations)?;
    let restaurants =
        normalize_restaurants(sources.restaurants.clone(), filming.locations.len());
    Ok(TransformedSources {
        movies,
        filming,
        restaurants,
    })
}

pub fn unify(transformed: &TransformedSources) -> AppResult<Vec<UnifiedLocation>> {
    unify_locations(
        &transformed.filming.locations,
        &transformed.restaurants.locations,
    )
}

/// Loads every table in dependency order: parents before the link tables
/// that reference them.
pub fn load_tables(
    loader: &mut BatchLoader,
    transformed: &TransformedSources,
    locations: &[StandardizedLocation],
    sizes: &BatchSizes,
    reprocess: bool,
    journal: &RunJournal,
) -> AppResult<Vec<TableSummary>> {
    let movies = &transformed.movies;
    Ok(vec![
        load_table(loader, &movies.movies, sizes.movies, reprocess, journal)?,
        load_table(loader, locations, sizes.locations, reprocess, journal)?,
        load_table(
            loader,
            &transformed.restaurants.restaurants,
            sizes.restaurants,
            reprocess,
            journal,
        )?,
        load_table(loader, &movies.genres, sizes.genres, reprocess, journal)?,
        load_table(loader, &movies.actors, sizes.actors, reprocess, journal)?,
        load_table(
            loader,
            &movies.movie_genres,
            sizes.movie_genres,
            reprocess,
            journal,
        )?,
        load_table(
            loader,
            &movies.movie_actors,
            sizes.movie_actors,
            reprocess,
            journal,
        )?,
        load_table(
            loader,
            &transformed.filming.links,
            sizes.filming_locations,
            reprocess,
            journal,
        )?,
    ])
}

fn load_table<R: TableRow>(
    loader: &mut BatchLoader,
    rows: &[R],
    batch_size: usize,
    reprocess: bool,
    journal: &RunJournal,
) -> AppResult<TableSummary> {
    let report = loader.load_batches(rows, batch_size)?;
    journal_failed_batches(journal, &report);

    let mut summary = TableSummary {
        table: report.table,
        inserted: report.inserted,
        failed_batches: report.failed_batches.len(),
        reprocessed: 0,
        failed_rows: 0,
    };
    if reprocess && !report.failed_batches.is_empty() {
        let retried = loader.reprocess_failed_batches(&report.failed_batches)?;
        for failed in &retried.failed_rows {
            journal.record_rejected_row(
                retried.table,
                failed.batch_index,
                &failed.error,
                &failed.row,
            );
        }
        summary.reprocessed = retried.inserted;
        summary.inserted += retried.inserted;
        summary.failed_rows = retried.failed_rows.len();
    }

    journal.record("table_loaded", json!(summary));
    Ok(summary)
}

fn journal_failed_batches<R: TableRow>(journal: &RunJournal, report: &LoadReport<R>) {
    for failed in &report.failed_batches {
        journal.record_rejected_batch(
            report.table,
            failed.batch_index,
            failed.rows.len(),
            &failed.error,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseSettings;
    use crate::records::{GeocodeStatus, SourceType};
    use tempfile::tempdir;

    const MOVIE_HEADERS: [&str; 10] = [
        "movie title",
        "year",
        "path",
        "Generes",
        "overview",
        "director",
        "writer",
        "Top 5 Casts",
        "Rating",
        "User Rating",
    ];

    const FILMING_HEADERS: [&str; 9] = [
        "Movie Title",
        "IMDB LINK",
        "Director/Filmmaker IMDB Link",
        "Location Display Text",
        "Client or book location indicator",
        "Latitude",
        "Longitude",
        "Borough",
        "Neighborhood",
    ];

    fn raw(headers: &[&str], rows: Vec<Vec<&str>>) -> RawTable {
        RawTable::new(
            headers.iter().map(|h| Some(h.to_string())).collect(),
            rows.into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|v| (!v.is_empty()).then(|| v.to_string()))
                        .collect()
                })
                .collect(),
        )
    }

    fn sources() -> SourceData {
        let movies = raw(
            &MOVIE_HEADERS,
            vec![
                vec![
                    "Heat",
                    "(1995)",
                    "/title/tt0113277/",
                    "['Crime', 'Drama']",
                    "A heist.",
                    "Michael Mann",
                    "Michael Mann",
                    "['Al Pacino', 'Robert De Niro']",
                    "8.3",
                    "700K",
                ],
                vec![
                    "Taxi Driver",
                    "1976",
                    "/title/tt0075314/",
                    "['Crime']",
                    "",
                    "Martin Scorsese",
                    "Paul Schrader",
                    "['Robert De Niro']",
                    "no-rating",
                    "",
                ],
            ],
        );
        let filming_locations = raw(
            &FILMING_HEADERS,
            vec![
                vec![
                    "Heat",
                    "https://www.imdb.com/title/tt0113277/",
                    "",
                    "Diner",
                    "",
                    "40.7",
                    "-74.0",
                    "Manhattan",
                    "Tribeca",
                ],
                vec![
                    "Taxi Driver",
                    "https://www.imdb.com/title/tt0075314/",
                    "",
                    "Corner",
                    "",
                    "",
                    "",
                    "Manhattan",
                    "Midtown",
                ],
                vec![
                    "Missing",
                    "https://www.imdb.com/title/tt9999999/",
                    "",
                    "Pier",
                    "",
                    "",
                    "",
                    "Brooklyn",
                    "",
                ],
            ],
        );
        let restaurants = vec![json!({
            "restaurant_name": "Joe's",
            "bulding_number": "7",
            "street": "Carmine St",
            "zip": 10014,
            "borough": "Manhattan",
            "landmarkdistrict_terms": "no",
        })]
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();

        SourceData {
            restaurants,
            filming_locations,
            movies,
        }
    }

    fn standardized(locations: &[UnifiedLocation]) -> Vec<StandardizedLocation> {
        locations
            .iter()
            .map(|location| StandardizedLocation {
                location_id: location.location_id,
                source_type: location.source_type,
                status: GeocodeStatus::Success,
                failure_reason: None,
                address_type: None,
                name: None,
                display_name: None,
                latitude: location.latitude,
                longitude: location.longitude,
                house_number: location.building_number.clone(),
                road: location.street.clone(),
                neighbourhood: None,
                suburb: location.borough.clone(),
                county: None,
                city: None,
                state: None,
                region_code: None,
                postcode: location.zip.clone(),
                country: None,
                country_code: None,
            })
            .collect()
    }

    #[test]
    fn transform_offsets_restaurant_locations_past_filming() {
        let transformed = transform_sources(&sources()).unwrap();
        assert_eq!(transformed.movies.movies.len(), 2);
        assert_eq!(transformed.filming.locations.len(), 3);
        assert_eq!(transformed.restaurants.restaurants[0].location_id, 234);

        let unified = unify(&transformed).unwrap();
        let ids = unified.iter().map(|l| l.location_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2, 3, 234]);
        assert_eq!(unified[3].source_type, SourceType::Restaurant);
        assert_eq!(unified[3].building_number.as_deref(), Some("7"));
    }

    #[test]
    fn loads_tables_and_journals_rejected_batches() {
        let dir = tempdir().unwrap();
        let mut loader = BatchLoader::open(&DatabaseSettings {
            dir: dir.path().to_path_buf(),
            name: "pipeline.db".into(),
        })
        .unwrap();
        let journal = RunJournal::new(dir.path(), 1024 * 1024, 2).unwrap();

        let transformed = transform_sources(&sources()).unwrap();
        let locations = standardized(&unify(&transformed).unwrap());
        let sizes = BatchSizes {
            filming_locations: 1,
            ..BatchSizes::default()
        };
        let tables =
            load_tables(&mut loader, &transformed, &locations, &sizes, false, &journal).unwrap();
        journal.flush().unwrap();

        let summary = |name: &str| tables.iter().find(|t| t.table == name).unwrap().clone();
        assert_eq!(summary("fc_movies").inserted, 2);
        assert_eq!(summary("fc_locations").inserted, 4);
        assert_eq!(summary("fc_restaurants").inserted, 1);
        assert_eq!(summary("fc_genres").inserted, 2);
        assert_eq!(summary("fc_actors").inserted, 2);
        // tt9999999 is not in the catalog, so its link violates the foreign key.
        let filming = summary("fc_filming_locations");
        assert_eq!(filming.inserted, 2);
        assert_eq!(filming.failed_batches, 1);

        let journal_text = std::fs::read_to_string(journal.path()).unwrap();
        assert!(journal_text.contains("batch_rejected"));
        assert!(journal_text.contains("fc_filming_locations"));
    }

    #[test]
    fn reprocessing_recovers_good_rows_from_rejected_batches() {
        let dir = tempdir().unwrap();
        let mut loader = BatchLoader::open(&DatabaseSettings {
            dir: dir.path().to_path_buf(),
            name: "pipeline.db".into(),
        })
        .unwrap();
        let journal = RunJournal::new(dir.path(), 1024 * 1024, 2).unwrap();

        let transformed = transform_sources(&sources()).unwrap();
        let locations = standardized(&unify(&transformed).unwrap());
        let tables = load_tables(
            &mut loader,
            &transformed,
            &locations,
            &BatchSizes::default(),
            true,
            &journal,
        )
        .unwrap();

        let filming = tables
            .iter()
            .find(|t| t.table == "fc_filming_locations")
            .unwrap();
        assert_eq!(filming.failed_batches, 1);
        assert_eq!(filming.reprocessed, 2);
        assert_eq!(filming.inserted, 2);
        assert_eq!(filming.failed_rows, 1);
    }
}

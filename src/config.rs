use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

const DEFAULT_JOURNAL_MAX_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_JOURNAL_MAX_FILES: usize = 5;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub open_data: OpenDataConfig,
    pub filming_locations_xml: PathBuf,
    pub catalog: CatalogConfig,
    pub geocoder: GeocoderConfig,
    pub geocode_cache_path: PathBuf,
    pub database: DatabaseSettings,
    pub reprocess_failed_batches: bool,
    pub journal_dir: PathBuf,
    pub journal_max_bytes: u64,
    pub journal_max_files: usize,
}

#[derive(Clone, Debug)]
pub struct OpenDataConfig {
    pub domain: String,
    pub app_token: Option<SecretString>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub dataset_id: String,
    pub row_limit: usize,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub api_base: String,
    pub dataset: String,
    pub version: Option<u32>,
    pub file_name: String,
    pub cache_dir: PathBuf,
    pub username: Option<String>,
    pub key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
    pub min_interval: Duration,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatabaseSettings {
    pub dir: PathBuf,
    pub name: String,
}

impl DatabaseSettings {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub open_data_domain: String,
    pub restaurant_dataset_id: String,
    pub restaurant_row_limit: usize,
    pub has_app_token: bool,
    pub has_open_data_credentials: bool,
    pub filming_locations_xml: PathBuf,
    pub movie_dataset: String,
    pub movie_dataset_version: Option<u32>,
    pub movie_dataset_file: String,
    pub has_catalog_credentials: bool,
    pub geocoder_base_url: String,
    pub geocoder_max_attempts: u32,
    pub geocode_cache_path: PathBuf,
    pub database_path: PathBuf,
    pub reprocess_failed_batches: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let output_dir = PathBuf::from(parse_string("OUTPUT_DIR", "outputs"));
        Self {
            open_data: OpenDataConfig {
                domain: parse_string("OPEN_DATA_DOMAIN", "data.cityofnewyork.us"),
                app_token: parse_secret("APP_TOKEN"),
                username: parse_optional("OPEN_DATA_NYC_USERNAME"),
                password: parse_secret("OPEN_DATA_NYC_PASSWORD"),
                dataset_id: parse_string("RESTAURANT_DATASET_ID", "pitm-atqc"),
                row_limit: parse_number("RESTAURANT_ROW_LIMIT", 1000_usize).max(1),
            },
            filming_locations_xml: PathBuf::from(parse_string(
                "FILMING_LOCATIONS_XML",
                "datasets/Interactive_Map_Data.xml",
            )),
            catalog: CatalogConfig {
                api_base: parse_string("KAGGLE_API_BASE", "https://www.kaggle.com/api/v1"),
                dataset: parse_string("MOVIE_DATASET", "utsh0dey/25k-movie-dataset"),
                version: parse_optional("MOVIE_DATASET_VERSION").and_then(|v| v.parse().ok()),
                file_name: parse_string("MOVIE_DATASET_FILE", "25k IMDb movie Dataset.csv"),
                cache_dir: PathBuf::from(parse_string("DATASET_CACHE_DIR", ".cache/datasets")),
                username: parse_optional("KAGGLE_USERNAME"),
                key: parse_secret("KAGGLE_KEY"),
            },
            geocoder: GeocoderConfig {
                base_url: parse_string(
                    "GEOCODER_BASE_URL",
                    "https://nominatim.openstreetmap.org",
                ),
                user_agent: parse_string("GEOCODER_USER_AGENT", "food-and-the-city"),
                timeout: Duration::from_secs(parse_number("GEOCODER_TIMEOUT_SECS", 10_u64).max(1)),
                max_attempts: parse_number("GEOCODER_MAX_ATTEMPTS", 1_u32).max(1),
                backoff: Duration::from_millis(parse_number("GEOCODER_BACKOFF_MS", 1_000_u64)),
                min_interval: Duration::from_millis(parse_number("GEOCODER_MIN_INTERVAL_MS", 1_000_u64)),
            },
            geocode_cache_path: env::var("GEOCODE_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| output_dir.join("standardized_locations.csv")),
            database: DatabaseSettings {
                dir: env::var("DB_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| output_dir.clone()),
                name: parse_string("DB_NAME", "food_and_the_city.db"),
            },
            reprocess_failed_batches: parse_bool("REPROCESS_FAILED_BATCHES", false),
            journal_dir: output_dir,
            journal_max_bytes: parse_number("JOURNAL_MAX_BYTES", DEFAULT_JOURNAL_MAX_BYTES),
            journal_max_files: parse_number("JOURNAL_MAX_FILES", DEFAULT_JOURNAL_MAX_FILES).max(1),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            open_data_domain: self.open_data.domain.clone(),
            restaurant_dataset_id: self.open_data.dataset_id.clone(),
            restaurant_row_limit: self.open_data.row_limit,
            has_app_token: self.open_data.app_token.is_some(),
            has_open_data_credentials: self.open_data.username.is_some()
                && self.open_data.password.is_some(),
            filming_locations_xml: self.filming_locations_xml.clone(),
            movie_dataset: self.catalog.dataset.clone(),
            movie_dataset_version: self.catalog.version,
            movie_dataset_file: self.catalog.file_name.clone(),
            has_catalog_credentials: self.catalog.username.is_some() && self.catalog.key.is_some(),
            geocoder_base_url: self.geocoder.base_url.clone(),
            geocoder_max_attempts: self.geocoder.max_attempts,
            geocode_cache_path: self.geocode_cache_path.clone(),
            database_path: self.database.path(),
            reprocess_failed_batches: self.reprocess_failed_batches,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    parse_optional(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn parse_string(key: &str, default: &str) -> String {
    parse_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_secret(key: &str) -> Option<SecretString> {
    parse_optional(key).map(|v| SecretString::new(v.into()))
}

/// Unset or unparsable values fall back to `default`.
fn parse_number<T: FromStr>(key: &str, default: T) -> T {
    match parse_optional(key).map(|v| v.parse::<T>()) {
        Some(Ok(value)) => value,
        Some(Err(_)) => {
            debug!(key, "ignoring non-numeric setting");
            default
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_public_profile_without_secrets() {
        env::set_var("APP_TOKEN", "token");
        env::set_var("OPEN_DATA_NYC_USERNAME", "someone@example.com");
        env::set_var("OPEN_DATA_NYC_PASSWORD", "secret");
        env::set_var("DB_NAME", "custom.db");
        env::set_var("RESTAURANT_ROW_LIMIT", "not-a-number");
        env::set_var("GEOCODER_MAX_ATTEMPTS", "3");

        let config = AppConfig::from_env();
        let public = config.public_profile();

        assert!(public.has_app_token);
        assert!(public.has_open_data_credentials);
        assert_eq!(public.restaurant_row_limit, 1000);
        assert_eq!(public.geocoder_max_attempts, 3);
        assert!(public.database_path.ends_with("custom.db"));

        let serialized = serde_json::to_string(&public).unwrap();
        assert!(!serialized.contains("secret"));
        assert!(!serialized.contains("someone@example.com"));
    }

    #[test]
    fn flags_and_numbers_tolerate_noise() {
        env::set_var("FOOD_CITY_TEST_FLAG", " Yes ");
        env::set_var("FOOD_CITY_TEST_COUNT", " 42 ");
        env::set_var("FOOD_CITY_TEST_BAD_COUNT", "-1");

        assert!(parse_bool("FOOD_CITY_TEST_FLAG", false));
        assert!(parse_bool("FOOD_CITY_TEST_UNSET_FLAG", true));
        assert_eq!(parse_number("FOOD_CITY_TEST_COUNT", 7_u32), 42);
        assert_eq!(parse_number("FOOD_CITY_TEST_BAD_COUNT", 7_usize), 7);
        assert_eq!(parse_number("FOOD_CITY_TEST_UNSET_COUNT", 7_u64), 7);
    }
}

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tracing::info;

use crate::config::DatabaseSettings;
use crate::errors::AppResult;

pub struct DatabaseContext {
    pub connection: Connection,
    pub path: PathBuf,
}

/// Opens the store, creating the directory and schema when needed.
pub fn open_database(settings: &DatabaseSettings) -> AppResult<DatabaseContext> {
    std::fs::create_dir_all(&settings.dir)?;
    let path = settings.path();
    let connection = open_connection(&path)?;
    run_migrations(&connection)?;
    info!(
        target: "database_bootstrap",
        path = %path.display(),
        "database ready"
    );
    Ok(DatabaseContext { connection, path })
}

/// Opens a fresh connection to an existing store.
pub fn open_connection(path: &Path) -> AppResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(path, flags)?;
    apply_pragmas(&connection)?;
    Ok(connection)
}

fn apply_pragmas(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        "#,
    )?;
    Ok(())
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS fc_movies (
            mov_imdb_id TEXT PRIMARY KEY NOT NULL,
            mov_title TEXT,
            mov_year INTEGER,
            mov_director TEXT,
            mov_writer TEXT,
            mov_overview TEXT,
            mov_rating REAL,
            mov_nb_users_ratings TEXT
        );

        CREATE TABLE IF NOT EXISTS fc_genres (
            gen_id INTEGER PRIMARY KEY,
            gen_name TEXT
        );

        CREATE TABLE IF NOT EXISTS fc_actors (
            act_id INTEGER PRIMARY KEY,
            act_name TEXT
        );

        CREATE TABLE IF NOT EXISTS fc_genres_movies (
            gm_genre_id INTEGER NOT NULL,
            gm_imdb_id TEXT NOT NULL,
            PRIMARY KEY (gm_genre_id, gm_imdb_id),
            FOREIGN KEY (gm_genre_id) REFERENCES fc_genres(gen_id),
            FOREIGN KEY (gm_imdb_id) REFERENCES fc_movies(mov_imdb_id)
        );

        CREATE TABLE IF NOT EXISTS fc_actors_movies (
            am_actor_id INTEGER NOT NULL,
            am_imdb_id TEXT NOT NULL,
            PRIMARY KEY (am_actor_id, am_imdb_id),
            FOREIGN KEY (am_actor_id) REFERENCES fc_actors(act_id),
            FOREIGN KEY (am_imdb_id) REFERENCES fc_movies(mov_imdb_id)
        );

        CREATE TABLE IF NOT EXISTS fc_locations (
            loc_id INTEGER PRIMARY KEY,
            loc_source_type TEXT,
            loc_status TEXT,
            loc_failure_reason TEXT,
            loc_address_type TEXT,
            loc_name TEXT,
            loc_display_name TEXT,
            loc_latitude REAL,
            loc_longitude REAL,
            loc_house_number TEXT,
            loc_road TEXT,
            loc_neighborhood TEXT,
            loc_suburb TEXT,
            loc_county TEXT,
            loc_city TEXT,
            loc_state TEXT,
            loc_iso3166_2_lvl4 TEXT,
            loc_postcode TEXT,
            loc_country TEXT,
            loc_country_code TEXT,
            loc_geography TEXT
        );

        CREATE TABLE IF NOT EXISTS fc_filming_locations (
            fl_location_id INTEGER NOT NULL,
            fl_imdb_id TEXT NOT NULL,
            PRIMARY KEY (fl_location_id, fl_imdb_id),
            FOREIGN KEY (fl_location_id) REFERENCES fc_locations(loc_id),
            FOREIGN KEY (fl_imdb_id) REFERENCES fc_movies(mov_imdb_id)
        );

        CREATE TABLE IF NOT EXISTS fc_restaurants (
            res_id INTEGER PRIMARY KEY,
            res_name TEXT,
            res_legal_business_name TEXT,
            res_doing_business_as_dba TEXT,
            res_seating_interest_sidewalk TEXT,
            res_landmarkdistrict_terms INTEGER CHECK (res_landmarkdistrict_terms IN (0, 1)),
            res_location_id INTEGER REFERENCES fc_locations(loc_id)
        );

        CREATE INDEX IF NOT EXISTS idx_movies_title ON fc_movies(mov_title);
        CREATE INDEX IF NOT EXISTS idx_locations_name ON fc_locations(loc_name);
        CREATE INDEX IF NOT EXISTS idx_locations_lat_lng ON fc_locations(loc_latitude, loc_longitude);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn settings(dir: &Path) -> DatabaseSettings {
        DatabaseSettings {
            dir: dir.join("nested"),
            name: "test.db".into(),
        }
    }

    #[test]
    fn runs_migrations_and_creates_tables() {
        let dir = tempdir().unwrap();
        let ctx = open_database(&settings(dir.path())).unwrap();

        let tables = ctx
            .connection
            .prepare("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name LIKE 'fc_%'")
            .unwrap()
            .query_row([], |row| row.get::<_, i64>(0))
            .unwrap();
        assert_eq!(tables, 8);
        assert!(ctx.path.ends_with("nested/test.db"));
        let geography_columns: i64 = ctx
            .connection
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('fc_locations') WHERE name = 'loc_geography'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(geography_columns, 1);
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        let first = open_database(&settings(dir.path())).unwrap();
        drop(first);
        let second = open_database(&settings(dir.path())).unwrap();
        let foreign_keys: i64 = second
            .connection
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }
}

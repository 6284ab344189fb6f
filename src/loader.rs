use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::DatabaseSettings;
use crate::db::{open_connection, open_database};
use crate::errors::{AppError, AppResult};
use crate::schema::{insert_sql, TableRow};

const MATERIALIZE_GEOGRAPHY_SQL: &str = "UPDATE fc_locations
    SET loc_geography = 'SRID=4326;POINT(' || loc_longitude || ' ' || loc_latitude || ')'
    WHERE loc_latitude IS NOT NULL
      AND loc_longitude IS NOT NULL";

/// A batch rejected by a constraint, kept for row-by-row reprocessing.
#[derive(Debug, Clone, Serialize)]
pub struct FailedBatch<R> {
    pub batch_index: usize,
    pub rows: Vec<R>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedRow<R> {
    pub row: R,
    pub batch_index: usize,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct LoadReport<R> {
    pub table: &'static str,
    pub batches: usize,
    pub inserted: usize,
    pub failed_batches: Vec<FailedBatch<R>>,
}

#[derive(Debug, Clone)]
pub struct ReprocessReport<R> {
    pub table: &'static str,
    pub inserted: usize,
    pub failed_rows: Vec<FailedRow<R>>,
}

/// Inserts record sets into the store in fixed-size batches, isolating
/// batches that violate a constraint.
pub struct BatchLoader {
    path: PathBuf,
    connection: Connection,
}

impl BatchLoader {
    pub fn open(settings: &DatabaseSettings) -> AppResult<Self> {
        let context = open_database(settings)?;
        Ok(Self {
            path: context.path,
            connection: context.connection,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Splits `rows` into contiguous batches of `batch_size` and inserts each
    /// in its own transaction.
    ///
    /// A constraint violation rolls the batch back, reopens the connection and
    /// records the batch; loading continues with the next one. Any other
    /// database error is returned.
    pub fn load_batches<R: TableRow>(
        &mut self,
        rows: &[R],
        batch_size: usize,
    ) -> AppResult<LoadReport<R>> {
        if batch_size == 0 {
            return Err(AppError::Config(format!(
                "batch size for {} must be positive",
                R::TABLE
            )));
        }

        let mut report = LoadReport {
            table: R::TABLE,
            batches: 0,
            inserted: 0,
            failed_batches: Vec::new(),
        };
        for (batch_index, batch) in rows.chunks(batch_size).enumerate() {
            report.batches += 1;
            match insert_rows(&mut self.connection, batch) {
                Ok(()) => report.inserted += batch.len(),
                Err(err) if err.is_constraint_violation() => {
                    warn!(
                        table = R::TABLE,
                        batch_index,
                        rows = batch.len(),
                        error = %err,
                        "batch rejected"
                    );
                    self.reset_connection()?;
                    report.failed_batches.push(FailedBatch {
                        batch_index,
                        rows: batch.to_vec(),
                        error: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            table = R::TABLE,
            inserted = report.inserted,
            failed_batches = report.failed_batches.len(),
            "table loaded"
        );
        Ok(report)
    }

    /// Retries every row of the given failed batches in its own transaction
    /// and keeps only the rows that still fail.
    pub fn reprocess_failed_batches<R: TableRow>(
        &mut self,
        failed: &[FailedBatch<R>],
    ) -> AppResult<ReprocessReport<R>> {
        let mut report = ReprocessReport {
            table: R::TABLE,
            inserted: 0,
            failed_rows: Vec::new(),
        };
        for batch in failed {
            debug!(
                table = R::TABLE,
                batch_index = batch.batch_index,
                "retrying failed batch row by row"
            );
            for row in &batch.rows {
                match insert_rows(&mut self.connection, std::slice::from_ref(row)) {
                    Ok(()) => report.inserted += 1,
                    Err(err) if err.is_constraint_violation() => {
                        self.reset_connection()?;
                        report.failed_rows.push(FailedRow {
                            row: row.clone(),
                            batch_index: batch.batch_index,
                            error: err.to_string(),
                        });
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        info!(
            table = R::TABLE,
            inserted = report.inserted,
            failed_rows = report.failed_rows.len(),
            "reprocessed failed batches"
        );
        Ok(report)
    }

    /// Fills `loc_geography` with an SRID 4326 point for every location that
    /// has both coordinates. Failures are logged and otherwise ignored.
    pub fn materialize_geography(&mut self) -> Option<usize> {
        match materialize(&mut self.connection) {
            Ok(updated) => {
                info!(updated, "materialized location geography");
                Some(updated)
            }
            Err(err) => {
                error!(%err, "failed to materialize location geography");
                None
            }
        }
    }

    fn reset_connection(&mut self) -> AppResult<()> {
        self.connection = open_connection(&self.path)?;
        Ok(())
    }
}

fn insert_rows<R: TableRow>(connection: &mut Connection, rows: &[R]) -> AppResult<()> {
    let tx = connection.transaction()?;
    {
        let mut stmt = tx.prepare_cached(&insert_sql::<R>())?;
        for row in rows {
            stmt.execute(params_from_iter(row.values()))?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn materialize(connection: &mut Connection) -> AppResult<usize> {
    let tx = connection.transaction()?;
    let updated = tx.execute(MATERIALIZE_GEOGRAPHY_SQL, [])?;
    tx.commit()?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Genre, GeocodeStatus, SourceType, StandardizedLocation};
    use tempfile::tempdir;

    fn loader(dir: &Path) -> BatchLoader {
        BatchLoader::open(&DatabaseSettings {
            dir: dir.to_path_buf(),
            name: "load.db".into(),
        })
        .unwrap()
    }

    fn genres(ids: impl IntoIterator<Item = i64>) -> Vec<Genre> {
        ids.into_iter()
            .map(|genre_id| Genre {
                genre_id,
                name: format!("genre-{genre_id}"),
            })
            .collect()
    }

    fn count(loader: &BatchLoader, table: &str) -> i64 {
        loader
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn splits_rows_into_ceil_batches() {
        let dir = tempdir().unwrap();
        let mut loader = loader(dir.path());
        let report = loader.load_batches(&genres(1..=11), 5).unwrap();
        assert_eq!(report.batches, 3);
        assert_eq!(report.inserted, 11);
        assert!(report.failed_batches.is_empty());
        assert_eq!(count(&loader, "fc_genres"), 11);
    }

    #[test]
    fn isolates_the_one_bad_batch() {
        let dir = tempdir().unwrap();
        let mut loader = loader(dir.path());
        loader.load_batches(&genres([7]), 1).unwrap();

        // id 7 already exists, so the second batch (5..=8) is rejected.
        let rows = genres(1..=12);
        let report = loader.load_batches(&rows, 4).unwrap();
        assert_eq!(report.batches, 3);
        assert_eq!(report.inserted, 8);
        assert_eq!(report.failed_batches.len(), 1);
        let failed = &report.failed_batches[0];
        assert_eq!(failed.batch_index, 1);
        assert_eq!(failed.rows, rows[4..8].to_vec());
        assert!(failed.error.contains("UNIQUE"));
        assert_eq!(count(&loader, "fc_genres"), 9);
    }

    #[test]
    fn reprocessing_keeps_only_rows_that_still_fail() {
        let dir = tempdir().unwrap();
        let mut loader = loader(dir.path());
        loader.load_batches(&genres([3]), 1).unwrap();

        let report = loader.load_batches(&genres(1..=4), 4).unwrap();
        assert_eq!(report.inserted, 0);

        let retried = loader.reprocess_failed_batches(&report.failed_batches).unwrap();
        assert_eq!(retried.inserted, 3);
        assert_eq!(retried.failed_rows.len(), 1);
        assert_eq!(retried.failed_rows[0].row.genre_id, 3);
        assert_eq!(retried.failed_rows[0].batch_index, 0);
        assert_eq!(count(&loader, "fc_genres"), 4);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let dir = tempdir().unwrap();
        let mut loader = loader(dir.path());
        assert!(matches!(
            loader.load_batches(&genres([1]), 0),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn materializes_points_for_located_rows_only() {
        let dir = tempdir().unwrap();
        let mut loader = loader(dir.path());
        let located = StandardizedLocation {
            location_id: 1,
            source_type: SourceType::Filming,
            status: GeocodeStatus::Success,
            failure_reason: None,
            address_type: None,
            name: None,
            display_name: None,
            latitude: Some(40.5),
            longitude: Some(-73.25),
            house_number: None,
            road: None,
            neighbourhood: None,
            suburb: None,
            county: None,
            city: None,
            state: None,
            region_code: None,
            postcode: None,
            country: None,
            country_code: None,
        };
        let unlocated = StandardizedLocation {
            location_id: 2,
            status: GeocodeStatus::Failed,
            latitude: None,
            ..located.clone()
        };
        loader.load_batches(&[located, unlocated], 50).unwrap();

        assert_eq!(loader.materialize_geography(), Some(1));
        let geography: Option<String> = loader
            .connection()
            .query_row(
                "SELECT loc_geography FROM fc_locations WHERE loc_id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(geography.as_deref(), Some("SRID=4326;POINT(-73.25 40.5)"));
    }
}

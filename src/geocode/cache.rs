use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::errors::AppResult;
use crate::records::{StandardizedLocation, UnifiedLocation};

/// Bumped whenever the cached row shape changes.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub schema_version: u32,
    pub input_digest: String,
    pub rows: usize,
    pub written_at: DateTime<Utc>,
}

/// CSV of standardized locations plus a JSON manifest describing which
/// input set produced it.
#[derive(Debug, Clone)]
pub struct GeocodeCache {
    path: PathBuf,
}

impl GeocodeCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "geocode-cache".into());
        name.push(".manifest.json");
        self.path.with_file_name(name)
    }

    /// Returns the cached rows when the manifest matches the current schema
    /// and input digest.
    pub fn load(&self, input_digest: &str) -> AppResult<Option<Vec<StandardizedLocation>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let manifest = match self.read_manifest() {
            Ok(Some(manifest)) => manifest,
            Ok(None) => {
                warn!(path = %self.path.display(), "geocode cache has no manifest; regenerating");
                return Ok(None);
            }
            Err(err) => {
                warn!(%err, path = %self.path.display(), "unreadable geocode cache manifest; regenerating");
                return Ok(None);
            }
        };
        if manifest.schema_version != CACHE_SCHEMA_VERSION {
            warn!(
                cached = manifest.schema_version,
                current = CACHE_SCHEMA_VERSION,
                "geocode cache schema changed; regenerating"
            );
            return Ok(None);
        }
        if manifest.input_digest != input_digest {
            warn!("unified locations changed since the geocode cache was written; regenerating");
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let rows = reader
            .deserialize()
            .collect::<Result<Vec<StandardizedLocation>, _>>()?;
        info!(path = %self.path.display(), rows = rows.len(), "loaded geocode cache");
        Ok(Some(rows))
    }

    pub fn store(&self, input_digest: &str, rows: &[StandardizedLocation]) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&self.path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        let manifest = CacheManifest {
            schema_version: CACHE_SCHEMA_VERSION,
            input_digest: input_digest.to_string(),
            rows: rows.len(),
            written_at: Utc::now(),
        };
        fs::write(self.manifest_path(), serde_json::to_vec_pretty(&manifest)?)?;
        info!(path = %self.path.display(), rows = rows.len(), "wrote geocode cache");
        Ok(())
    }

    fn read_manifest(&self) -> AppResult<Option<CacheManifest>> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

/// SHA-256 over the serialized unified location set.
pub fn input_digest(locations: &[UnifiedLocation]) -> AppResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(CACHE_SCHEMA_VERSION.to_le_bytes());
    for location in locations {
        hasher.update(serde_json::to_vec(location)?);
        hasher.update(b"\n");
    }
    Ok(base64::engine::general_purpose::STANDARD_NO_PAD.encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{GeocodeStatus, SourceType};
    use tempfile::tempdir;

    fn standardized(id: i64) -> StandardizedLocation {
        StandardizedLocation {
            location_id: id,
            source_type: SourceType::Restaurant,
            status: GeocodeStatus::Success,
            failure_reason: None,
            address_type: Some("house".into()),
            name: None,
            display_name: Some("12, Main Street, New York".into()),
            latitude: Some(40.712_345_6),
            longitude: Some(-74.006_1),
            house_number: Some("12".into()),
            road: Some("Main Street".into()),
            neighbourhood: None,
            suburb: Some("Manhattan".into()),
            county: None,
            city: Some("New York".into()),
            state: Some("New York".into()),
            region_code: Some("US-NY".into()),
            postcode: Some("10013".into()),
            country: Some("United States".into()),
            country_code: Some("us".into()),
        }
    }

    #[test]
    fn round_trips_rows_with_region_code_header() {
        let dir = tempdir().unwrap();
        let cache = GeocodeCache::new(dir.path().join("outputs/standardized_locations.csv"));
        let rows = vec![standardized(1), standardized(234)];
        cache.store("digest", &rows).unwrap();

        let header = fs::read_to_string(cache.path()).unwrap();
        assert!(header.lines().next().unwrap().contains("ISO3166-2-lvl4"));
        assert!(cache.manifest_path().ends_with("standardized_locations.csv.manifest.json"));
        assert_eq!(cache.load("digest").unwrap(), Some(rows));
    }

    #[test]
    fn mismatched_digest_or_missing_manifest_invalidates() {
        let dir = tempdir().unwrap();
        let cache = GeocodeCache::new(dir.path().join("cache.csv"));
        assert_eq!(cache.load("digest").unwrap(), None);

        cache.store("digest", &[standardized(1)]).unwrap();
        assert_eq!(cache.load("other").unwrap(), None);

        fs::remove_file(cache.manifest_path()).unwrap();
        assert_eq!(cache.load("digest").unwrap(), None);
    }

    #[test]
    fn digest_tracks_input_content() {
        let mut location = crate::geocode::reconciler::tests::location(1);
        let first = input_digest(std::slice::from_ref(&location)).unwrap();
        assert_eq!(first, input_digest(std::slice::from_ref(&location)).unwrap());
        location.street = Some("Main St".into());
        assert_ne!(first, input_digest(&[location]).unwrap());
    }
}

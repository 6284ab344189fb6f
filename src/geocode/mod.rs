//! Geocoding of unified locations: client, retry policy, reconciliation and
//! the on-disk result cache.

pub mod cache;
pub mod client;
pub mod reconciler;
pub mod retry;

pub use cache::{input_digest, GeocodeCache};
pub use client::{GeocodeError, GeocodeHit, Geocoder, NominatimClient};
pub use reconciler::{GeocodeReconciler, GeocodeStats};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};

use crate::errors::AppResult;
use crate::records::{StandardizedLocation, UnifiedLocation};

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeOutcome {
    pub locations: Vec<StandardizedLocation>,
    pub from_cache: bool,
    pub stats: Option<GeocodeStats>,
}

/// Serves the cached result for this input set, or geocodes everything and
/// rewrites the cache.
pub async fn geocode_with_cache(
    reconciler: &GeocodeReconciler,
    cache: &GeocodeCache,
    locations: &[UnifiedLocation],
) -> AppResult<GeocodeOutcome> {
    let digest = input_digest(locations)?;
    if let Some(cached) = cache.load(&digest)? {
        return Ok(GeocodeOutcome {
            locations: cached,
            from_cache: true,
            stats: None,
        });
    }

    let (standardized, stats) = reconciler.standardize_all(locations).await;
    cache.store(&digest, &standardized)?;
    Ok(GeocodeOutcome {
        locations: standardized,
        from_cache: false,
        stats: Some(stats),
    })
}

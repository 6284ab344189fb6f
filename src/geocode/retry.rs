use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::GeocoderConfig;
use crate::geocode::client::{GeocodeError, GeocodeHit};

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Attempt budget with linear backoff: the pause after attempt `n` is
/// `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &GeocoderConfig) -> Self {
        Self::new(config.max_attempts, config.backoff)
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Runs `call` until it produces an answer or the budget runs out.
    ///
    /// A hit or an explicit "no match" ends the loop immediately. Retryable
    /// errors back off and try again; anything else, or an exhausted budget,
    /// is reported as a miss.
    pub async fn run<F, Fut>(&self, sleeper: &dyn Sleeper, label: &str, mut call: F) -> Option<GeocodeHit>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<GeocodeHit>, GeocodeError>>,
    {
        for attempt in 1..=self.max_attempts {
            match call().await {
                Ok(result) => return result,
                Err(err) if err.is_retryable() => {
                    warn!(
                        %err,
                        call = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        "geocoder call failed"
                    );
                    if attempt < self.max_attempts {
                        sleeper.sleep(self.delay_after(attempt)).await;
                    }
                }
                Err(err) => {
                    warn!(%err, call = label, attempt, "geocoder call failed; not retrying");
                    return None;
                }
            }
        }
        None
    }
}

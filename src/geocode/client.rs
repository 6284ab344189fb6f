use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::config::GeocoderConfig;
use crate::errors::AppResult;

/// Failure of a single geocoder call. Only timeouts and quota errors are
/// worth retrying.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeocodeError {
    #[error("geocoder timed out")]
    Timeout,
    #[error("geocoder quota exceeded")]
    QuotaExceeded,
    #[error("geocoder service error: {0}")]
    Service(String),
}

impl GeocodeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GeocodeError::Timeout | GeocodeError::QuotaExceeded)
    }
}

pub type GeocodeResult = Result<Option<GeocodeHit>, GeocodeError>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeocodeHit {
    #[serde(rename = "type")]
    pub address_type: Option<String>,
    pub name: Option<String>,
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub lon: Option<f64>,
    #[serde(default)]
    pub address: AddressDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AddressDetails {
    pub house_number: Option<String>,
    pub road: Option<String>,
    pub neighbourhood: Option<String>,
    pub suburb: Option<String>,
    pub county: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "ISO3166-2-lvl4")]
    pub region_code: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, latitude: f64, longitude: f64) -> GeocodeResult;
    async fn search(&self, query: &str) -> GeocodeResult;
}

/// Nominatim-compatible HTTP geocoder.
pub struct NominatimClient {
    http: Client,
    base_url: String,
    throttle: Throttle,
}

impl NominatimClient {
    pub fn new(config: &GeocoderConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            throttle: Throttle::new(config.min_interval),
        })
    }

    async fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value, GeocodeError> {
        self.throttle.wait().await;
        let url = format!("{}/{endpoint}", self.base_url);
        trace!(%url, "geocoder request");
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::QuotaExceeded);
        }
        if !status.is_success() {
            return Err(GeocodeError::Service(format!("{endpoint} returned HTTP {status}")));
        }
        response.json().await.map_err(classify_transport_error)
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn reverse(&self, latitude: f64, longitude: f64) -> GeocodeResult {
        let body = self
            .get_json(
                "reverse",
                &[
                    ("format", "json".to_string()),
                    ("lat", latitude.to_string()),
                    ("lon", longitude.to_string()),
                    ("addressdetails", "1".to_string()),
                ],
            )
            .await?;
        if body.get("error").is_some() {
            return Ok(None);
        }
        parse_hit(body).map(Some)
    }

    async fn search(&self, query: &str) -> GeocodeResult {
        let body = self
            .get_json(
                "search",
                &[
                    ("format", "json".to_string()),
                    ("q", query.to_string()),
                    ("addressdetails", "1".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        match body {
            Value::Array(mut hits) if !hits.is_empty() => parse_hit(hits.swap_remove(0)).map(Some),
            Value::Array(_) => Ok(None),
            other => Err(GeocodeError::Service(format!(
                "unexpected search payload: {other}"
            ))),
        }
    }
}

fn parse_hit(value: Value) -> Result<GeocodeHit, GeocodeError> {
    serde_json::from_value(value)
        .map_err(|err| GeocodeError::Service(format!("invalid geocoder payload: {err}")))
}

fn classify_transport_error(err: reqwest::Error) -> GeocodeError {
    if err.is_timeout() {
        GeocodeError::Timeout
    } else {
        GeocodeError::Service(err.to_string())
    }
}

fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => text.trim().parse().ok(),
        Some(Value::Number(number)) => number.as_f64(),
        _ => None,
    })
}

/// Spaces consecutive calls at least `min_interval` apart.
struct Throttle {
    min_interval: Duration,
    last_call: AsyncMutex<Option<Instant>>,
}

impl Throttle {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: AsyncMutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut guard = self.last_call.lock().await;
        if let Some(previous) = *guard {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

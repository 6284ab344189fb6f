use std::time::Duration;

use reqwest::{Client, Url};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::OpenDataConfig;
use crate::errors::{AppError, AppResult};

pub type OpenDataRecord = Map<String, Value>;

/// Client for the key/value open-data API that serves the restaurant feed.
#[derive(Clone)]
pub struct OpenDataClient {
    http: Client,
    config: OpenDataConfig,
}

impl OpenDataClient {
    pub fn new(config: &OpenDataConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("food-city-ingest/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Fetches up to `row_limit` records in a single request. Records are
    /// returned as-is; the API omits null fields per record.
    pub async fn fetch_records(&self) -> AppResult<Vec<OpenDataRecord>> {
        let url = self.dataset_url()?;
        let mut request = self
            .http
            .get(url)
            .query(&[("$limit", self.config.row_limit.to_string())]);

        if let Some(token) = &self.config.app_token {
            request = request.header("X-App-Token", token.expose_secret());
        }
        if let Some(username) = &self.config.username {
            request = request.basic_auth(
                username,
                self.config
                    .password
                    .as_ref()
                    .map(|password| password.expose_secret().to_string()),
            );
        }

        let response = request.send().await?.error_for_status()?;
        let records: Vec<OpenDataRecord> = response.json().await?;
        info!(
            dataset = %self.config.dataset_id,
            rows = records.len(),
            "fetched open-data records"
        );
        Ok(records)
    }

    fn dataset_url(&self) -> AppResult<Url> {
        let base = if self.config.domain.contains("://") {
            self.config.domain.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.config.domain.trim_end_matches('/'))
        };
        let mut url = Url::parse(&base)
            .map_err(|err| AppError::Config(format!("invalid open-data domain: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Config("invalid open-data domain".into()))?
            .pop_if_empty()
            .push("resource")
            .push(&format!("{}.json", self.config.dataset_id));
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(domain: &str) -> OpenDataConfig {
        OpenDataConfig {
            domain: domain.to_string(),
            app_token: None,
            username: None,
            password: None,
            dataset_id: "pitm-atqc".into(),
            row_limit: 10,
        }
    }

    #[test]
    fn builds_resource_url_from_bare_domain() {
        let client = OpenDataClient::new(&config("data.cityofnewyork.us")).unwrap();
        assert_eq!(
            client.dataset_url().unwrap().as_str(),
            "https://data.cityofnewyork.us/resource/pitm-atqc.json"
        );
    }

    #[test]
    fn keeps_explicit_scheme_and_prefix() {
        let client = OpenDataClient::new(&config("http://127.0.0.1:9000/api/")).unwrap();
        assert_eq!(
            client.dataset_url().unwrap().as_str(),
            "http://127.0.0.1:9000/api/resource/pitm-atqc.json"
        );
    }
}

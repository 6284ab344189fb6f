use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, Url};
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::config::CatalogConfig;
use crate::errors::{AppError, AppResult};
use crate::records::RawTable;

const PACKAGE_ARCHIVE_NAME: &str = ".package.zip";

/// Downloads a versioned dataset package and loads one CSV file out of it.
#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    config: CatalogConfig,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("food-city-ingest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// `{cache}/{owner}/{dataset}/versions/{version|latest}`
    pub fn package_dir(&self) -> AppResult<PathBuf> {
        let (owner, dataset) = self.dataset_parts()?;
        let version = self
            .config
            .version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "latest".to_string());
        Ok(self
            .config
            .cache_dir
            .join(owner)
            .join(dataset)
            .join("versions")
            .join(version))
    }

    pub async fn fetch_movies(&self) -> AppResult<RawTable> {
        let dir = self.package_dir()?;
        let csv_path = dir.join(&self.config.file_name);
        if csv_path.exists() {
            debug!(path = %csv_path.display(), "dataset package already cached");
        } else {
            self.download_package(&dir).await?;
        }
        if !csv_path.exists() {
            return Err(AppError::Config(format!(
                "dataset package {} has no file named '{}'",
                self.config.dataset, self.config.file_name
            )));
        }
        let table = read_csv_table(&csv_path)?;
        info!(
            dataset = %self.config.dataset,
            rows = table.len(),
            "loaded catalog file"
        );
        Ok(table)
    }

    async fn download_package(&self, dir: &Path) -> AppResult<()> {
        fs::create_dir_all(dir)?;
        let mut request = self.http.get(self.download_url()?);
        if let (Some(username), Some(key)) = (&self.config.username, &self.config.key) {
            request = request.basic_auth(username, Some(key.expose_secret()));
        }
        let response = request.send().await?.error_for_status()?;

        let archive_path = dir.join(PACKAGE_ARCHIVE_NAME);
        let mut file = File::create(&archive_path)?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0_u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            downloaded += chunk.len() as u64;
            file.write_all(&chunk)?;
        }
        file.flush()?;
        drop(file);
        info!(
            dataset = %self.config.dataset,
            bytes = downloaded,
            "downloaded dataset package"
        );

        let extracted = extract_package(&archive_path, dir)?;
        fs::remove_file(&archive_path)?;
        debug!(files = extracted, dir = %dir.display(), "extracted dataset package");
        Ok(())
    }

    fn download_url(&self) -> AppResult<Url> {
        let (owner, dataset) = self.dataset_parts()?;
        let mut url = Url::parse(self.config.api_base.trim_end_matches('/'))
            .map_err(|err| AppError::Config(format!("invalid catalog API base: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Config("invalid catalog API base".into()))?
            .pop_if_empty()
            .push("datasets")
            .push("download")
            .push(owner)
            .push(dataset);
        if let Some(version) = self.config.version {
            url.query_pairs_mut()
                .append_pair("datasetVersionNumber", &version.to_string());
        }
        Ok(url)
    }

    fn dataset_parts(&self) -> AppResult<(&str, &str)> {
        match self.config.dataset.split_once('/') {
            Some((owner, dataset))
                if !owner.is_empty() && !dataset.is_empty() && !dataset.contains('/') =>
            {
                Ok((owner, dataset))
            }
            _ => Err(AppError::Config(format!(
                "dataset reference must look like owner/name, got '{}'",
                self.config.dataset
            ))),
        }
    }
}

pub fn extract_package(archive_path: &Path, dest: &Path) -> AppResult<usize> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let target = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        extracted += 1;
    }
    Ok(extracted)
}

/// Loads a headed CSV file; empty fields become nulls.
pub fn read_csv_table(path: &Path) -> AppResult<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = reader
        .headers()?
        .iter()
        .map(|h| Some(h.trim().to_string()))
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = (0..headers.len())
            .map(|i| {
                record
                    .get(i)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
            })
            .collect();
        rows.push(row);
    }
    Ok(RawTable::new(headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn config(cache_dir: &Path) -> CatalogConfig {
        CatalogConfig {
            api_base: "http://127.0.0.1:1/api/v1".into(),
            dataset: "utsh0dey/25k-movie-dataset".into(),
            version: Some(1),
            file_name: "movies.csv".into(),
            cache_dir: cache_dir.to_path_buf(),
            username: None,
            key: None,
        }
    }

    #[test]
    fn resolves_versioned_package_dir_and_url() {
        let dir = tempdir().unwrap();
        let client = CatalogClient::new(&config(dir.path())).unwrap();
        assert!(client
            .package_dir()
            .unwrap()
            .ends_with("utsh0dey/25k-movie-dataset/versions/1"));
        assert_eq!(
            client.download_url().unwrap().as_str(),
            "http://127.0.0.1:1/api/v1/datasets/download/utsh0dey/25k-movie-dataset?datasetVersionNumber=1"
        );
    }

    #[test]
    fn rejects_malformed_dataset_reference() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.dataset = "no-owner".into();
        let client = CatalogClient::new(&cfg).unwrap();
        assert!(matches!(client.package_dir(), Err(AppError::Config(_))));
    }

    #[test]
    fn reads_csv_with_nulls_for_empty_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("movies.csv");
        fs::write(&path, "movie title,year,Rating\nHeat,(1995),8.3\n\"Up, Again\",,no-rating\n")
            .unwrap();
        let table = read_csv_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, 0), Some("Up, Again"));
        assert_eq!(table.cell(1, 1), None);
        assert_eq!(table.cell(1, 2), Some("no-rating"));
    }

    #[tokio::test]
    async fn uses_cached_package_without_network() {
        let dir = tempdir().unwrap();
        let client = CatalogClient::new(&config(dir.path())).unwrap();
        let package = client.package_dir().unwrap();
        fs::create_dir_all(&package).unwrap();
        fs::write(package.join("movies.csv"), "movie title\nHeat\n").unwrap();

        let table = client.fetch_movies().await.unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn extracts_package_entries() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("package.zip");
        {
            let file = File::create(&archive_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            writer
                .start_file("movies.csv", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"movie title\nHeat\n").unwrap();
            writer.finish().unwrap();
        }
        let out = dir.path().join("out");
        assert_eq!(extract_package(&archive_path, &out).unwrap(), 1);
        assert!(out.join("movies.csv").exists());
    }
}

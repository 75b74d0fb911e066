//! Daily bulk ID exports
//!
//! The service publishes one gzip-compressed JSON-lines file per item kind
//! and day, named `{prefix}MM_DD_YYYY.json.gz`. Today's file may not be out
//! yet, so the locator checks backwards a few days with `HEAD` requests and
//! downloads the newest one it finds.

use crate::config::ExportConfig;
use crate::storage::ItemKind;
use crate::SyncError;
use chrono::{Days, NaiveDate};
use reqwest::Client;
use std::path::PathBuf;

/// File name of the export for `kind` published on `date`
pub fn export_file_name(kind: ItemKind, date: NaiveDate) -> String {
    let prefix = match kind {
        ItemKind::Movie => "movie_ids_",
        ItemKind::Tv => "tv_series_ids_",
    };
    format!("{}{}.json.gz", prefix, date.format("%m_%d_%Y"))
}

/// Finds and downloads published exports
pub struct ExportLocator {
    client: Client,
    base_url: String,
    download_dir: PathBuf,
    lookback_days: u32,
}

impl ExportLocator {
    pub fn new(client: Client, config: &ExportConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            download_dir: PathBuf::from(&config.download_dir),
            lookback_days: config.lookback_days.max(1),
        }
    }

    fn url(&self, file_name: &str) -> String {
        format!("{}/{}", self.base_url, file_name)
    }

    /// Name of the newest export published within the lookback window
    ///
    /// Request failures of any kind count as "not published".
    pub async fn find_latest(&self, kind: ItemKind, today: NaiveDate) -> Option<String> {
        for days_back in 0..self.lookback_days {
            let Some(date) = today.checked_sub_days(Days::new(u64::from(days_back))) else {
                break;
            };
            let file_name = export_file_name(kind, date);

            match self.client.head(self.url(&file_name)).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!("Export found: {}", file_name);
                    return Some(file_name);
                }
                Ok(response) => {
                    tracing::debug!("Export {} not available: {}", file_name, response.status())
                }
                Err(e) => tracing::debug!("HEAD {} failed: {}", file_name, e),
            }
        }

        tracing::warn!(
            "No {} export published in the last {} days",
            kind,
            self.lookback_days
        );
        None
    }

    /// Downloads an export into the download directory
    ///
    /// A non-empty local copy is reused. The body is written to a `.part`
    /// file first and renamed once complete.
    pub async fn download(&self, file_name: &str) -> Result<PathBuf, SyncError> {
        let local = self.download_dir.join(file_name);
        if let Ok(meta) = tokio::fs::metadata(&local).await {
            if meta.len() > 0 {
                tracing::debug!("Using cached export {}", local.display());
                return Ok(local);
            }
        }

        tokio::fs::create_dir_all(&self.download_dir).await?;

        let url = self.url(file_name);
        tracing::info!("Downloading export: {}", url);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let partial = self.download_dir.join(format!("{}.part", file_name));
        tokio::fs::write(&partial, &body).await?;
        tokio::fs::rename(&partial, &local).await?;

        tracing::info!("Saved {} ({} bytes)", local.display(), body.len());
        Ok(local)
    }

    /// Locates and downloads the newest export for `kind`
    pub async fn fetch_latest(
        &self,
        kind: ItemKind,
        today: NaiveDate,
    ) -> Result<Option<PathBuf>, SyncError> {
        match self.find_latest(kind, today).await {
            Some(file_name) => self.download(&file_name).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_file_names() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        assert_eq!(
            export_file_name(ItemKind::Movie, date),
            "movie_ids_01_07_2025.json.gz"
        );
        assert_eq!(
            export_file_name(ItemKind::Tv, date),
            "tv_series_ids_01_07_2025.json.gz"
        );
    }

    #[test]
    fn test_locator_trims_base_url() {
        let config = ExportConfig {
            base_url: "https://files.example.org/p/exports/".to_string(),
            ..ExportConfig::default()
        };
        let locator = ExportLocator::new(Client::new(), &config);
        assert_eq!(
            locator.url("movie_ids_01_07_2025.json.gz"),
            "https://files.example.org/p/exports/movie_ids_01_07_2025.json.gz"
        );
    }
}

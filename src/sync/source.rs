//! Record sources
//!
//! A [`RecordSource`] performs exactly one network attempt and classifies the
//! response; retrying and rate limiting live in
//! [`RetryingFetcher`](crate::sync::RetryingFetcher). The REST implementation
//! speaks the TMDB-style detail endpoint
//! (`GET {base}/{kind}/{id}?append_to_response=translations,alternative_titles`).

use crate::config::ApiConfig;
use crate::storage::{ItemKind, WorkItem};
use crate::sync::fetcher::FetchOutcome;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// A translation of the record's display fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LanguageVariant {
    /// ISO 639-1 code
    pub lang_code: String,
    pub title: String,
    pub overview: String,
    pub tagline: String,
}

/// An alternative title registered for a country or language
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AltTitle {
    /// ISO 3166-1 code
    pub country: String,
    /// ISO 639-1 code, when the service provides one
    pub lang: String,
    pub title: String,
}

/// A release listing attached to the record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseListing {
    pub label: String,
    pub size_text: String,
    pub magnet: Option<String>,
    pub seeders: Option<i64>,
    pub leechers: Option<i64>,
}

/// A record as returned by the remote service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub external_id: i64,
    pub kind: ItemKind,
    /// Primary label; the original title unless the payload names one
    pub label: String,
    pub size_text: String,
    /// Path of the attached image, relative to the image base URL
    pub asset_ref: Option<String>,
    /// Title in the requested language, as served
    pub title: String,
    pub original_title: String,
    pub overview: String,
    pub tagline: String,
    pub language_variants: Vec<LanguageVariant>,
    pub alt_titles: Vec<AltTitle>,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub production_countries: Vec<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub runtime_minutes: Option<i64>,
    pub releases: Vec<ReleaseListing>,
}

/// One-attempt access to the remote service
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetches and decodes the record for a work item
    async fn fetch_record_once(&self, item: &WorkItem) -> FetchOutcome<RawRecord>;

    /// Downloads the bytes of an attached asset
    async fn fetch_asset_once(&self, asset_ref: &str) -> FetchOutcome<Vec<u8>>;
}

/// Builds the HTTP client shared by every fetch of a run
///
/// # Example
///
/// ```no_run
/// use catalog_sync::sync::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client("catalog-sync/1.0", Duration::from_secs(20)).unwrap();
/// ```
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// REST implementation of [`RecordSource`]
pub struct RestCatalogSource {
    client: Client,
    base_url: String,
    image_base_url: String,
    api_key: String,
    language: String,
}

impl RestCatalogSource {
    pub fn new(client: Client, config: &ApiConfig, api_key: String) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            image_base_url: config.image_base_url.trim_end_matches('/').to_string(),
            api_key,
            language: config.language.clone(),
        }
    }

    fn asset_url(&self, asset_ref: &str) -> String {
        if asset_ref.starts_with("http://") || asset_ref.starts_with("https://") {
            asset_ref.to_string()
        } else {
            format!("{}/{}", self.image_base_url, asset_ref.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl RecordSource for RestCatalogSource {
    async fn fetch_record_once(&self, item: &WorkItem) -> FetchOutcome<RawRecord> {
        let url = format!("{}/{}", self.base_url, item.query_key.trim_start_matches('/'));

        let response = match self
            .client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("language", self.language.as_str()),
                ("append_to_response", "translations,alternative_titles"),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return classify_request_error(&e),
        };

        if let Some(outcome) = classify_status(&response) {
            return outcome;
        }

        match response.bytes().await {
            Ok(body) => match parse_record(&body, item) {
                Ok(record) => FetchOutcome::Success(record),
                Err(cause) => FetchOutcome::Malformed { cause },
            },
            Err(e) => classify_request_error(&e),
        }
    }

    async fn fetch_asset_once(&self, asset_ref: &str) -> FetchOutcome<Vec<u8>> {
        let response = match self.client.get(self.asset_url(asset_ref)).send().await {
            Ok(response) => response,
            Err(e) => return classify_request_error(&e),
        };

        if let Some(outcome) = classify_status(&response) {
            return outcome;
        }

        match response.bytes().await {
            Ok(body) if body.is_empty() => FetchOutcome::Malformed {
                cause: "empty asset body".to_string(),
            },
            Ok(body) => FetchOutcome::Success(body.to_vec()),
            Err(e) => classify_request_error(&e),
        }
    }
}

/// Maps a non-success status to its outcome; `None` for 2xx
fn classify_status<T>(response: &Response) -> Option<FetchOutcome<T>> {
    let status = response.status();

    if status.is_success() {
        return None;
    }

    if status == StatusCode::NOT_FOUND {
        return Some(FetchOutcome::NotFound);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Some(FetchOutcome::RateLimited { retry_after });
    }

    Some(FetchOutcome::Transient {
        cause: format!("HTTP {}", status.as_u16()),
    })
}

fn classify_request_error<T>(error: &reqwest::Error) -> FetchOutcome<T> {
    let cause = if error.is_timeout() {
        "request timeout".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    };
    FetchOutcome::Transient { cause }
}

/// Longest Retry-After the service is allowed to impose on a single wait
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(600);

/// Parses a Retry-After value given in (possibly fractional) seconds,
/// capped at [`MAX_RETRY_AFTER`]
fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    let wait = Duration::try_from_secs_f64(secs).unwrap_or(MAX_RETRY_AFTER);
    Some(wait.min(MAX_RETRY_AFTER))
}

#[derive(Debug, Deserialize)]
struct RecordPayload {
    id: Option<i64>,
    title: Option<String>,
    name: Option<String>,
    original_title: Option<String>,
    original_name: Option<String>,
    overview: Option<String>,
    tagline: Option<String>,
    label: Option<String>,
    size: Option<String>,
    poster_path: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    genres: Option<Vec<NamedPayload>>,
    production_countries: Option<Vec<CountryPayload>>,
    vote_average: Option<f64>,
    vote_count: Option<i64>,
    runtime: Option<i64>,
    episode_run_time: Option<Vec<i64>>,
    translations: Option<TranslationsPayload>,
    alternative_titles: Option<AltTitlesPayload>,
    releases: Option<Vec<ReleasePayload>>,
}

#[derive(Debug, Deserialize)]
struct NamedPayload {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountryPayload {
    iso_3166_1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslationsPayload {
    translations: Option<Vec<TranslationPayload>>,
}

#[derive(Debug, Deserialize)]
struct TranslationPayload {
    iso_639_1: Option<String>,
    data: Option<TranslationDataPayload>,
}

#[derive(Debug, Deserialize)]
struct TranslationDataPayload {
    title: Option<String>,
    name: Option<String>,
    overview: Option<String>,
    tagline: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AltTitlesPayload {
    titles: Option<Vec<AltTitlePayload>>,
    results: Option<Vec<AltTitlePayload>>,
}

#[derive(Debug, Deserialize)]
struct AltTitlePayload {
    iso_3166_1: Option<String>,
    iso_639_1: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleasePayload {
    title: Option<String>,
    size: Option<String>,
    magnet: Option<String>,
    seeders: Option<i64>,
    leechers: Option<i64>,
}

/// Decodes and validates a detail payload
///
/// The payload must carry an `id` equal to the requested one.
fn parse_record(body: &[u8], item: &WorkItem) -> Result<RawRecord, String> {
    let payload: RecordPayload =
        serde_json::from_slice(body).map_err(|e| format!("undecodable payload: {}", e))?;

    match payload.id {
        Some(id) if id == item.external_id => {}
        Some(id) => {
            return Err(format!(
                "payload id {} does not match requested {}",
                id, item.external_id
            ))
        }
        None => return Err("payload has no id".to_string()),
    }

    let title = payload.title.or(payload.name).unwrap_or_default();
    let original_title = payload
        .original_title
        .or(payload.original_name)
        .unwrap_or_default();

    let language_variants = payload
        .translations
        .and_then(|t| t.translations)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| {
            let data = t.data?;
            Some(LanguageVariant {
                lang_code: t.iso_639_1.unwrap_or_default(),
                title: data.title.or(data.name).unwrap_or_default(),
                overview: data.overview.unwrap_or_default(),
                tagline: data.tagline.unwrap_or_default(),
            })
        })
        .collect();

    let alt_titles = payload
        .alternative_titles
        .and_then(|a| a.titles.or(a.results))
        .unwrap_or_default()
        .into_iter()
        .map(|a| AltTitle {
            country: a.iso_3166_1.unwrap_or_default(),
            lang: a.iso_639_1.unwrap_or_default(),
            title: a.title.unwrap_or_default(),
        })
        .collect();

    let year = payload
        .release_date
        .or(payload.first_air_date)
        .as_deref()
        .and_then(parse_year);

    let runtime_minutes = payload.runtime.filter(|r| *r > 0).or_else(|| {
        payload
            .episode_run_time
            .and_then(|times| times.into_iter().find(|r| *r > 0))
    });

    let releases = payload
        .releases
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| {
            let label = r.title.filter(|t| !t.trim().is_empty())?;
            Some(ReleaseListing {
                label,
                size_text: r.size.unwrap_or_default(),
                magnet: r.magnet,
                seeders: r.seeders,
                leechers: r.leechers,
            })
        })
        .collect();

    Ok(RawRecord {
        external_id: item.external_id,
        kind: item.kind,
        label: payload
            .label
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| original_title.clone()),
        size_text: payload.size.unwrap_or_default(),
        asset_ref: payload.poster_path.filter(|p| !p.is_empty()),
        title,
        original_title,
        overview: payload.overview.unwrap_or_default(),
        tagline: payload.tagline.unwrap_or_default(),
        language_variants,
        alt_titles,
        year,
        genres: payload
            .genres
            .unwrap_or_default()
            .into_iter()
            .filter_map(|g| g.name.filter(|n| !n.is_empty()))
            .collect(),
        production_countries: payload
            .production_countries
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| c.iso_3166_1.filter(|c| !c.is_empty()))
            .collect(),
        vote_average: payload.vote_average,
        vote_count: payload.vote_count,
        runtime_minutes,
        releases,
    })
}

fn parse_year(date: &str) -> Option<i32> {
    let (year, _) = date.split_once('-')?;
    year.parse().ok()
}

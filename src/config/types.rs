use serde::Deserialize;

/// Main configuration structure for Catalog-Sync
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub sync: SyncConfig,
    #[serde(rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,
    pub assets: AssetConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub exports: ExportConfig,
}

/// Remote record service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the record endpoint (e.g. "https://api.themoviedb.org/3")
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Base URL that asset references are appended to
    #[serde(rename = "image-base-url")]
    pub image_base_url: String,

    /// API key given inline; takes precedence over `api-key-env`
    #[serde(rename = "api-key", default)]
    pub api_key: Option<String>,

    /// Environment variable consulted when `api-key` is absent
    #[serde(rename = "api-key-env", default = "default_api_key_env")]
    pub api_key_env: String,

    /// Language requested from the service
    #[serde(default = "default_language")]
    pub language: String,

    /// ISO 639-1 code of the preferred display language
    #[serde(rename = "target-language", default = "default_target_language")]
    pub target_language: String,

    /// ISO 3166-1 code used when picking alternative titles
    #[serde(rename = "target-country", default = "default_target_country")]
    pub target_country: String,

    /// Script a display title must be written in ("cyrillic", "latin" or "any")
    #[serde(rename = "target-script", default = "default_target_script")]
    pub target_script: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Orchestrator behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Maximum number of in-flight fetches across the whole run
    pub concurrency: u32,

    /// Number of items committed together
    #[serde(rename = "batch-size")]
    pub batch_size: u32,

    /// Attempts allowed for a record fetch that fails transiently
    #[serde(rename = "request-retries", default = "default_retries")]
    pub request_retries: u32,

    /// Attempts allowed for an asset download that fails transiently
    #[serde(rename = "download-retries", default = "default_retries")]
    pub download_retries: u32,

    /// Per-call timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Fixed delay between transient retries (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Wait applied to a 429 that carries no Retry-After hint (seconds)
    #[serde(rename = "rate-limit-fallback-secs", default = "default_rate_limit_fallback")]
    pub rate_limit_fallback_secs: u64,

    /// Padding added on top of every 429 wait (milliseconds)
    #[serde(rename = "rate-limit-padding-ms", default = "default_rate_limit_padding")]
    pub rate_limit_padding_ms: u64,

    /// Upper bound on items attempted per run; the whole backlog when absent
    #[serde(rename = "items-per-run", default)]
    pub items_per_run: Option<u32>,
}

/// Sliding-window rate limit
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Grants allowed inside one window
    #[serde(rename = "max-calls")]
    pub max_calls: u32,

    /// Window length (milliseconds)
    #[serde(rename = "window-ms")]
    pub window_ms: u64,
}

/// Asset download and transform configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    /// Whether assets are downloaded at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for downloaded, not yet transformed files
    #[serde(rename = "temp-dir")]
    pub temp_dir: String,

    /// Directory transformed assets are written to
    #[serde(rename = "output-dir")]
    pub output_dir: String,

    /// Number of transform workers
    #[serde(rename = "transform-workers", default = "default_transform_workers")]
    pub transform_workers: u32,

    /// Capacity of the queue between fetchers and transform workers
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: u32,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Daily bulk ID exports used to seed the backlog
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Directory URL the dated `*.json.gz` exports are published under
    #[serde(rename = "base-url", default = "default_export_base_url")]
    pub base_url: String,

    /// Where downloaded exports are cached
    #[serde(rename = "download-dir", default = "default_export_dir")]
    pub download_dir: String,

    /// How many days back to look for a published export, today included
    #[serde(rename = "lookback-days", default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Timeout for a whole export download (seconds)
    #[serde(rename = "download-timeout-secs", default = "default_export_timeout")]
    pub download_timeout_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base_url: default_export_base_url(),
            download_dir: default_export_dir(),
            lookback_days: default_lookback_days(),
            download_timeout_secs: default_export_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "TMDB_API_KEY".to_string()
}

fn default_language() -> String {
    "ru-RU".to_string()
}

fn default_target_language() -> String {
    "ru".to_string()
}

fn default_target_country() -> String {
    "RU".to_string()
}

fn default_target_script() -> String {
    "cyrillic".to_string()
}

fn default_user_agent() -> String {
    format!("catalog-sync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    20
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_rate_limit_fallback() -> u64 {
    5
}

fn default_rate_limit_padding() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_transform_workers() -> u32 {
    8
}

fn default_queue_capacity() -> u32 {
    64
}

fn default_export_base_url() -> String {
    "https://files.tmdb.org/p/exports".to_string()
}

fn default_export_dir() -> String {
    "./data".to_string()
}

fn default_lookback_days() -> u32 {
    3
}

fn default_export_timeout() -> u64 {
    120
}

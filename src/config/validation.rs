use crate::config::types::{
    ApiConfig, AssetConfig, Config, ExportConfig, OutputConfig, RateLimitConfig, SyncConfig,
};
use crate::ConfigError;
use std::path::Path;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_sync_config(&config.sync)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_asset_config(&config.assets)?;
    validate_output_config(&config.output)?;
    validate_export_config(&config.exports)?;
    Ok(())
}

/// Validates the remote service configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    validate_http_url("base-url", &config.base_url)?;
    validate_http_url("image-base-url", &config.image_base_url)?;

    if config.api_key.as_deref().is_some_and(str::is_empty) {
        return Err(ConfigError::Validation(
            "api-key cannot be empty when given".to_string(),
        ));
    }

    if config.api_key_env.is_empty() {
        return Err(ConfigError::Validation(
            "api-key-env cannot be empty".to_string(),
        ));
    }

    if config.target_language.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "target-language must be a two-letter ISO 639-1 code, got '{}'",
            config.target_language
        )));
    }

    if config.target_country.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "target-country must be a two-letter ISO 3166-1 code, got '{}'",
            config.target_country
        )));
    }

    if crate::sync::Script::parse(&config.target_script).is_none() {
        return Err(ConfigError::Validation(format!(
            "target-script must be one of cyrillic, latin, any; got '{}'",
            config.target_script
        )));
    }

    Ok(())
}

/// Validates orchestrator configuration
fn validate_sync_config(config: &SyncConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 512 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 512, got {}",
            config.concurrency
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.request_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "request-retries must be >= 1, got {}",
            config.request_retries
        )));
    }

    if config.download_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "download-retries must be >= 1, got {}",
            config.download_retries
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    if config.items_per_run == Some(0) {
        return Err(ConfigError::Validation(
            "items-per-run must be >= 1 when given".to_string(),
        ));
    }

    Ok(())
}

/// Validates the sliding-window rate limit
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.max_calls < 1 {
        return Err(ConfigError::Validation(format!(
            "max-calls must be >= 1, got {}",
            config.max_calls
        )));
    }

    if config.window_ms < 1 {
        return Err(ConfigError::Validation(format!(
            "window-ms must be >= 1, got {}",
            config.window_ms
        )));
    }

    Ok(())
}

/// Validates asset configuration
fn validate_asset_config(config: &AssetConfig) -> Result<(), ConfigError> {
    if config.temp_dir.is_empty() {
        return Err(ConfigError::Validation(
            "temp-dir cannot be empty".to_string(),
        ));
    }

    if config.output_dir.is_empty() {
        return Err(ConfigError::Validation(
            "output-dir cannot be empty".to_string(),
        ));
    }

    if Path::new(&config.temp_dir) == Path::new(&config.output_dir) {
        return Err(ConfigError::Validation(format!(
            "temp-dir and output-dir must differ, both are '{}'",
            config.output_dir
        )));
    }

    if config.transform_workers < 1 || config.transform_workers > 64 {
        return Err(ConfigError::Validation(format!(
            "transform-workers must be between 1 and 64, got {}",
            config.transform_workers
        )));
    }

    if config.queue_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "queue-capacity must be >= 1, got {}",
            config.queue_capacity
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the bulk export settings
fn validate_export_config(config: &ExportConfig) -> Result<(), ConfigError> {
    validate_http_url("exports base-url", &config.base_url)?;

    if config.download_dir.is_empty() {
        return Err(ConfigError::Validation(
            "exports download-dir cannot be empty".to_string(),
        ));
    }

    if config.lookback_days < 1 || config.lookback_days > 30 {
        return Err(ConfigError::Validation(format!(
            "lookback-days must be between 1 and 30, got {}",
            config.lookback_days
        )));
    }

    Ok(())
}

/// Validates that a configured endpoint is an absolute http(s) URL
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", field, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} must use http or https, got '{}'",
            field, value
        )));
    }

    Ok(())
}

//! Sync module for the ingestion pipeline
//!
//! This module contains the fetch side of catalog synchronization:
//! - A sliding-window rate limiter shared by every request
//! - Record sources and the retrying fetcher with outcome classification
//! - Display-language resolution
//! - Discovery and download of the daily bulk ID exports
//! - The bounded asset transform pipeline
//! - Overall run coordination

mod coordinator;
mod exports;
mod fetcher;
mod language;
mod rate_limiter;
mod source;
mod transform;

pub use coordinator::{run_sync, Coordinator, RunSummary};
pub use exports::{export_file_name, ExportLocator};
pub use fetcher::{FetchOutcome, RetryPolicy, RetryingFetcher};
pub use language::{resolve_display, DisplayText, LanguagePreference, Script};
pub use rate_limiter::RateLimiter;
pub use source::{
    build_http_client, AltTitle, LanguageVariant, RawRecord, RecordSource, ReleaseListing,
    RestCatalogSource, MAX_RETRY_AFTER,
};
pub use transform::{
    AssetTransform, Relocation, TransformError, TransformPipeline, TransformQueue, TransformStats,
    TransformTask, WebpTransform,
};

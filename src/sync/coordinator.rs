//! Sync coordinator - main ingestion orchestration logic
//!
//! This module contains the run loop that ties the pipeline together:
//! - Loading the due backlog from the sync cursor
//! - Admitting items through a run-wide semaphore
//! - Fetching records and assets through the retrying fetcher
//! - Handing assets to the transform pipeline
//! - Classifying release labels
//! - Committing each batch atomically and advancing the cursor
//! - Handling interrupts

use crate::classify::{classify, content_hash};
use crate::config::{resolve_api_key, Config};
use crate::storage::{
    CatalogStore, ClassifiedEntry, ItemKey, PersistedRecord, RunCounters, RunStatus,
    SqliteStorage, WorkItem,
};
use crate::sync::fetcher::{FetchOutcome, RetryingFetcher};
use crate::sync::language::{resolve_display, LanguagePreference};
use crate::sync::rate_limiter::RateLimiter;
use crate::sync::source::{build_http_client, RawRecord, RecordSource, RestCatalogSource};
use crate::sync::transform::{
    AssetTransform, Relocation, TransformPipeline, TransformQueue, TransformStats, TransformTask,
    WebpTransform,
};
use crate::SyncError;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Outcome counts of a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub run_id: i64,
    pub attempted: u64,
    pub succeeded: u64,
    pub not_found: u64,
    pub transient_failures: u64,
    pub malformed: u64,
    pub assets_queued: u64,
    pub rate_limited_hits: u64,
    pub batches_committed: u64,
    pub transform: TransformStats,
    /// Set when the run stopped on a cancellation signal
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Counters as recorded on the run row
    pub fn counters(&self) -> RunCounters {
        RunCounters {
            attempted: self.attempted,
            succeeded: self.succeeded,
            not_found: self.not_found,
            failed: self.transient_failures + self.malformed,
        }
    }

    fn record(&mut self, result: &ItemResult) {
        self.attempted += 1;
        match &result.outcome {
            ItemOutcome::Succeeded { asset_queued, .. } => {
                self.succeeded += 1;
                if *asset_queued {
                    self.assets_queued += 1;
                }
            }
            ItemOutcome::NotFound => self.not_found += 1,
            ItemOutcome::Transient => self.transient_failures += 1,
            ItemOutcome::Malformed => self.malformed += 1,
        }
    }
}

/// Main sync coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    storage: SqliteStorage,
    fetcher: Arc<RetryingFetcher>,
    prefs: Arc<LanguagePreference>,
    transform: Arc<dyn AssetTransform>,
    run_id: i64,
    cancel: CancellationToken,
    /// Child of `cancel`; also tripped when a batch fails to persist
    admission: CancellationToken,
}

impl Coordinator {
    /// Creates a coordinator talking to the configured REST service
    ///
    /// # Arguments
    ///
    /// * `config` - A validated configuration
    /// * `config_hash` - Digest recorded on the run row
    /// * `cancel` - Stops admission when triggered
    pub fn new(
        config: Config,
        config_hash: &str,
        cancel: CancellationToken,
    ) -> Result<Self, SyncError> {
        let api_key = resolve_api_key(&config.api)?;
        let client = build_http_client(
            &config.api.user_agent,
            Duration::from_secs(config.sync.request_timeout_secs),
        )?;
        let source = RestCatalogSource::new(client, &config.api, api_key);

        Self::with_source(
            config,
            config_hash,
            Arc::new(source),
            Arc::new(WebpTransform),
            cancel,
        )
    }

    /// Creates a coordinator over an arbitrary source and transform
    pub fn with_source(
        config: Config,
        config_hash: &str,
        source: Arc<dyn RecordSource>,
        transform: Arc<dyn AssetTransform>,
        cancel: CancellationToken,
    ) -> Result<Self, SyncError> {
        let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

        if config.assets.enabled {
            std::fs::create_dir_all(&config.assets.temp_dir)?;
            std::fs::create_dir_all(&config.assets.output_dir)?;
        }

        let admission = cancel.child_token();
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let fetcher = Arc::new(RetryingFetcher::from_config(
            source,
            limiter,
            &config.sync,
            admission.clone(),
        ));
        let prefs = Arc::new(LanguagePreference::from_config(&config.api));

        let run_id = storage.create_run(config_hash)?;
        tracing::info!("Created sync run {}", run_id);

        Ok(Self {
            config: Arc::new(config),
            storage,
            fetcher,
            prefs,
            transform,
            run_id,
            cancel,
            admission,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Runs one pass over the due backlog
    ///
    /// Items are admitted in cursor order through a semaphore that spans the
    /// whole run. Once every admitted item of a batch has reported, the
    /// batch's records and classified entries are committed in one
    /// transaction and every attempted item's cursor is advanced.
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run completed or was interrupted cleanly
    /// * `Err(SyncError::Persistence)` - A batch could not be committed
    pub async fn run(&mut self) -> Result<RunSummary, SyncError> {
        let start_time = Instant::now();
        let sync = &self.config.sync;

        let limit = sync.items_per_run.map(|n| n as usize);
        let backlog = self.storage.next_batch(limit)?;
        let batch_size = sync.batch_size.max(1) as usize;
        let batches: Vec<Vec<WorkItem>> = backlog
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        tracing::info!(
            "Starting sync run {}: {} items due in {} batches",
            self.run_id,
            backlog.len(),
            batches.len()
        );

        let pipeline = self.config.assets.enabled.then(|| {
            TransformPipeline::start(
                self.transform.clone(),
                self.config.assets.transform_workers as usize,
                self.config.assets.queue_capacity as usize,
            )
        });

        let context = ItemContext {
            fetcher: self.fetcher.clone(),
            prefs: self.prefs.clone(),
            assets: pipeline.as_ref().map(|p| {
                Arc::new(AssetContext {
                    queue: p.queue(),
                    temp_dir: PathBuf::from(&self.config.assets.temp_dir),
                    output_dir: PathBuf::from(&self.config.assets.output_dir),
                })
            }),
        };

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(sync.concurrency.max(1) as usize));
        let producer = tokio::spawn(admit_batches(
            batches,
            semaphore,
            self.admission.clone(),
            context,
            events_tx,
        ));

        let mut summary = RunSummary {
            run_id: self.run_id,
            ..RunSummary::default()
        };
        let mut progress: HashMap<usize, BatchProgress> = HashMap::new();
        let mut failure: Option<SyncError> = None;

        while let Some(event) = events_rx.recv().await {
            let batch = match event {
                Event::Admitted { batch } => {
                    progress.entry(batch).or_default().admitted += 1;
                    continue;
                }
                Event::Finished { batch, result } => {
                    summary.record(&result);
                    progress.entry(batch).or_default().results.push(result);
                    batch
                }
                Event::Sealed { batch } => {
                    progress.entry(batch).or_default().sealed = true;
                    batch
                }
            };

            // after a persistence failure, only wait for in-flight items
            if failure.is_some() {
                continue;
            }

            if !progress.get(&batch).is_some_and(BatchProgress::is_complete) {
                continue;
            }

            if let Some(done) = progress.remove(&batch) {
                if done.admitted == 0 {
                    continue;
                }
                match self.commit(batch, done) {
                    Ok(()) => {
                        summary.batches_committed += 1;
                        let elapsed = start_time.elapsed().as_secs_f64().max(f64::EPSILON);
                        tracing::info!(
                            "Progress: {} items attempted, {} succeeded, {:.2} items/sec",
                            summary.attempted,
                            summary.succeeded,
                            summary.attempted as f64 / elapsed
                        );
                    }
                    Err(e) => {
                        tracing::error!("{}", e);
                        self.admission.cancel();
                        failure = Some(e);
                    }
                }
            }
        }

        producer.await?;

        if let Some(pipeline) = pipeline {
            summary.transform = pipeline.shutdown().await;
            self.repoint_relocated_assets(&summary.transform.relocations);
        }
        summary.rate_limited_hits = self.fetcher.rate_limited_hits();
        summary.interrupted = self.cancel.is_cancelled();
        summary.elapsed = start_time.elapsed();

        if let Some(e) = failure {
            if let Err(status_err) =
                self.storage
                    .complete_run(self.run_id, RunStatus::Failed, &summary.counters())
            {
                tracing::warn!("Failed to mark run {} as failed: {}", self.run_id, status_err);
            }
            return Err(e);
        }

        let status = if summary.interrupted {
            tracing::warn!("Sync run {} interrupted", self.run_id);
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        self.storage
            .complete_run(self.run_id, status, &summary.counters())?;

        tracing::info!(
            "Sync run {} finished: {} attempted, {} succeeded, {} not found, {} failed in {:?}",
            self.run_id,
            summary.attempted,
            summary.succeeded,
            summary.not_found,
            summary.transient_failures + summary.malformed,
            summary.elapsed
        );

        Ok(summary)
    }

    /// Points records at the originals kept for assets that failed to convert
    fn repoint_relocated_assets(&mut self, relocations: &[Relocation]) {
        for relocation in relocations {
            if relocation.kept_at == relocation.destination {
                continue;
            }
            let from = relocation.destination.to_string_lossy();
            let to = relocation.kept_at.to_string_lossy();
            match self.storage.update_asset_path(&from, &to) {
                Ok(updated) => {
                    tracing::debug!("Asset {} kept as {} ({} records)", from, to, updated)
                }
                Err(e) => tracing::warn!("Failed to repoint asset {} to {}: {}", from, to, e),
            }
        }
    }

    /// Commits a batch, then advances the cursor of every attempted item
    fn commit(&mut self, batch: usize, progress: BatchProgress) -> Result<(), SyncError> {
        let mut keys = Vec::with_capacity(progress.results.len());
        let mut records = Vec::new();
        let mut classified = Vec::new();

        for result in progress.results {
            keys.push(result.key);
            if let ItemOutcome::Succeeded {
                record, entries, ..
            } = result.outcome
            {
                classified.push((result.key, entries));
                records.push(*record);
            }
        }

        self.storage
            .commit_batch(&records, &classified)
            .map_err(|source| SyncError::Persistence { batch, source })?;

        self.storage
            .mark_attempted(&keys, Utc::now())
            .map_err(|source| SyncError::Persistence { batch, source })?;

        tracing::debug!(
            "Committed batch {}: {} records, {} attempted",
            batch,
            records.len(),
            keys.len()
        );
        Ok(())
    }
}

/// Runs a single sync pass with the REST source
///
/// # Example
///
/// ```no_run
/// use catalog_sync::config::load_config_with_hash;
/// use catalog_sync::sync::run_sync;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let summary = run_sync(config, &hash, CancellationToken::new()).await?;
/// println!("{} items attempted", summary.attempted);
/// # Ok(())
/// # }
/// ```
pub async fn run_sync(
    config: Config,
    config_hash: &str,
    cancel: CancellationToken,
) -> Result<RunSummary, SyncError> {
    let mut coordinator = Coordinator::new(config, config_hash, cancel)?;
    coordinator.run().await
}

enum Event {
    Admitted { batch: usize },
    Finished { batch: usize, result: ItemResult },
    /// No further items of the batch will be admitted
    Sealed { batch: usize },
}

#[derive(Default)]
struct BatchProgress {
    admitted: usize,
    sealed: bool,
    results: Vec<ItemResult>,
}

impl BatchProgress {
    fn is_complete(&self) -> bool {
        self.sealed && self.results.len() == self.admitted
    }
}

struct ItemResult {
    key: ItemKey,
    outcome: ItemOutcome,
}

enum ItemOutcome {
    Succeeded {
        record: Box<PersistedRecord>,
        entries: Vec<ClassifiedEntry>,
        asset_queued: bool,
    },
    NotFound,
    Transient,
    Malformed,
}

struct AssetContext {
    queue: TransformQueue,
    temp_dir: PathBuf,
    output_dir: PathBuf,
}

/// Everything an item task needs, shared across tasks
#[derive(Clone)]
struct ItemContext {
    fetcher: Arc<RetryingFetcher>,
    prefs: Arc<LanguagePreference>,
    assets: Option<Arc<AssetContext>>,
}

async fn admit_batches(
    batches: Vec<Vec<WorkItem>>,
    semaphore: Arc<Semaphore>,
    admission: CancellationToken,
    context: ItemContext,
    events: mpsc::UnboundedSender<Event>,
) {
    'batches: for (batch, items) in batches.into_iter().enumerate() {
        if admission.is_cancelled() {
            break;
        }

        for item in items {
            let permit = tokio::select! {
                biased;
                _ = admission.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                tracing::info!("Admission stopped during batch {}", batch);
                let _ = events.send(Event::Sealed { batch });
                break 'batches;
            };

            let _ = events.send(Event::Admitted { batch });
            tokio::spawn(run_item(
                context.clone(),
                item,
                batch,
                permit,
                events.clone(),
            ));
        }

        let _ = events.send(Event::Sealed { batch });
    }
}

async fn run_item(
    context: ItemContext,
    item: WorkItem,
    batch: usize,
    _permit: OwnedSemaphorePermit,
    events: mpsc::UnboundedSender<Event>,
) {
    let key = item.key();

    // a panicking item must still report, or its batch never completes
    let task = tokio::spawn(async move { context.process(item).await });
    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Item task for {} failed: {}", key, e);
            ItemResult {
                key,
                outcome: ItemOutcome::Transient,
            }
        }
    };

    let _ = events.send(Event::Finished { batch, result });
}

impl ItemContext {
    async fn process(&self, item: WorkItem) -> ItemResult {
        let key = item.key();
        tracing::debug!("Fetching {}", key);

        let outcome = match self.fetcher.fetch_record(&item).await {
            FetchOutcome::Success(raw) => {
                let asset_path = self.stage_asset(&raw).await;
                let asset_queued = asset_path.is_some();
                let entries = classify_releases(&raw);
                let record = build_record(&item, &raw, &self.prefs, asset_path);
                ItemOutcome::Succeeded {
                    record: Box::new(record),
                    entries,
                    asset_queued,
                }
            }
            FetchOutcome::NotFound => {
                tracing::debug!("{} not found", key);
                ItemOutcome::NotFound
            }
            FetchOutcome::Malformed { cause } => {
                tracing::warn!("Malformed payload for {}: {}", key, cause);
                ItemOutcome::Malformed
            }
            FetchOutcome::Transient { cause } => {
                tracing::warn!("Failed to fetch {}: {}", key, cause);
                ItemOutcome::Transient
            }
            FetchOutcome::RateLimited { .. } => ItemOutcome::Transient,
        };

        ItemResult { key, outcome }
    }

    /// Downloads the record's asset to a temp file and queues its transform
    ///
    /// Returns the destination path once the task is queued.
    async fn stage_asset(&self, raw: &RawRecord) -> Option<String> {
        let assets = self.assets.as_ref()?;
        let asset_ref = raw.asset_ref.as_deref()?;

        let bytes = match self.fetcher.fetch_asset(asset_ref).await {
            FetchOutcome::Success(bytes) => bytes,
            other => {
                tracing::warn!(
                    "No asset for {}/{} ({}): {}",
                    raw.kind,
                    raw.external_id,
                    asset_ref,
                    other.kind()
                );
                return None;
            }
        };

        let stem = format!("{}_{}", raw.kind, raw.external_id);
        let extension = Path::new(asset_ref)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .unwrap_or("jpg");
        // the suffix keeps a download apart from any finished output
        let source = assets
            .temp_dir
            .join(format!("{}.{}.part", stem, extension));
        let destination = assets.output_dir.join(format!("{}.webp", stem));
        let fallback = assets.output_dir.join(format!("{}.{}", stem, extension));

        if let Err(e) = tokio::fs::write(&source, &bytes).await {
            tracing::warn!("Failed to write {}: {}", source.display(), e);
            return None;
        }

        let task = TransformTask {
            source: source.clone(),
            destination: destination.clone(),
            fallback,
        };
        match assets.queue.enqueue(task).await {
            Ok(()) => Some(destination.to_string_lossy().into_owned()),
            Err(e) => {
                tracing::warn!("Could not queue {}: {}", source.display(), e);
                let _ = tokio::fs::remove_file(&source).await;
                None
            }
        }
    }
}

/// Builds the stored row for a fetched record
fn build_record(
    item: &WorkItem,
    raw: &RawRecord,
    prefs: &LanguagePreference,
    asset_path: Option<String>,
) -> PersistedRecord {
    let display = resolve_display(raw, prefs);

    PersistedRecord {
        external_id: item.external_id,
        kind: item.kind,
        query_key: item.query_key.clone(),
        title: display.title,
        overview: display.overview,
        original_title: raw.original_title.clone(),
        label: raw.label.clone(),
        size_text: raw.size_text.clone(),
        year: raw.year,
        genres: raw.genres.clone(),
        production_countries: raw.production_countries.clone(),
        vote_average: raw.vote_average,
        vote_count: raw.vote_count,
        runtime_minutes: raw.runtime_minutes,
        asset_path,
    }
}

/// Classifies every release listing of a record
///
/// A record without listings contributes its primary label, if it has one.
/// Listings that resolve to the same content hash are kept once.
fn classify_releases(raw: &RawRecord) -> Vec<ClassifiedEntry> {
    let key = ItemKey::new(raw.external_id, raw.kind);
    let kind = raw.kind.to_db_string();
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    let mut push = |label: &str, size_text: &str, magnet: Option<&str>, peers: (Option<i64>, Option<i64>)| {
        let hash = content_hash(raw.external_id, kind, label, size_text, magnet);
        if !seen.insert(hash.clone()) {
            return;
        }
        entries.push(ClassifiedEntry {
            content_hash: hash,
            key,
            label: label.to_string(),
            size_text: size_text.to_string(),
            magnet: magnet.map(str::to_string),
            seeders: peers.0,
            leechers: peers.1,
            metadata: classify(label, size_text, raw.runtime_minutes),
        });
    };

    if raw.releases.is_empty() {
        if !raw.label.trim().is_empty() {
            push(&raw.label, &raw.size_text, None, (None, None));
        }
    } else {
        for release in &raw.releases {
            push(
                &release.label,
                &release.size_text,
                release.magnet.as_deref(),
                (release.seeders, release.leechers),
            );
        }
    }

    entries
}

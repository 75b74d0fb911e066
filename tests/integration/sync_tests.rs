//! Integration tests for the sync pipeline
//!
//! These tests use wiremock to stand in for the remote record service and
//! exercise outcome classification and full runs end-to-end. Runs that need
//! faults the HTTP layer cannot produce use a scripted in-process source.

use async_trait::async_trait;
use catalog_sync::config::{
    ApiConfig, AssetConfig, Config, ExportConfig, OutputConfig, RateLimitConfig, SyncConfig,
};
use catalog_sync::storage::{
    read_id_dump, seed_from_snapshot, CatalogStore, ItemKey, ItemKind, RunStatus, SqliteStorage,
    WorkItem,
};
use catalog_sync::sync::{
    build_http_client, Coordinator, ExportLocator, FetchOutcome, RateLimiter, RawRecord,
    RecordSource, RestCatalogSource, RetryingFetcher, WebpTransform,
};
use catalog_sync::SyncError;
use chrono::NaiveDate;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, dir: &Path, assets: bool) -> Config {
    Config {
        api: ApiConfig {
            base_url: base_url.to_string(),
            image_base_url: format!("{}/images", base_url),
            api_key: Some("test-key".to_string()),
            api_key_env: "CATALOG_SYNC_TEST_KEY".to_string(),
            language: "en-US".to_string(),
            target_language: "ru".to_string(),
            target_country: "RU".to_string(),
            target_script: "cyrillic".to_string(),
            user_agent: "catalog-sync-tests/1.0".to_string(),
        },
        sync: SyncConfig {
            concurrency: 4,
            batch_size: 2,
            request_retries: 3,
            download_retries: 2,
            request_timeout_secs: 5,
            retry_delay_ms: 10,
            rate_limit_fallback_secs: 1,
            rate_limit_padding_ms: 10,
            items_per_run: None,
        },
        rate_limit: RateLimitConfig {
            max_calls: 100,
            window_ms: 1000,
        },
        assets: AssetConfig {
            enabled: assets,
            temp_dir: dir.join("tmp").to_string_lossy().into_owned(),
            output_dir: dir.join("posters").to_string_lossy().into_owned(),
            transform_workers: 2,
            queue_capacity: 4,
        },
        output: OutputConfig {
            database_path: dir.join("catalog.db").to_string_lossy().into_owned(),
        },
        exports: ExportConfig {
            base_url: format!("{}/exports", base_url),
            download_dir: dir.join("exports").to_string_lossy().into_owned(),
            lookback_days: 3,
            download_timeout_secs: 5,
        },
    }
}

fn create_fetcher(config: &Config) -> RetryingFetcher {
    let client = build_http_client(&config.api.user_agent, Duration::from_secs(5)).unwrap();
    let source = RestCatalogSource::new(client, &config.api, "test-key".to_string());
    RetryingFetcher::from_config(
        Arc::new(source),
        Arc::new(RateLimiter::from_config(&config.rate_limit)),
        &config.sync,
        CancellationToken::new(),
    )
}

fn seed(config: &Config, items: &[WorkItem]) {
    let mut storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    storage.insert_work_items(items).unwrap();
}

fn open(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.output.database_path)).unwrap()
}

/// In-process source serving a minimal record for every item
///
/// Each hook injects one fault: a panic for one item, cancellation once a
/// number of records have been served, or a fixed asset payload.
#[derive(Default)]
struct ScriptedSource {
    asset: Option<(String, Vec<u8>)>,
    panic_on: Option<i64>,
    cancel_after: Option<(usize, CancellationToken)>,
    served: AtomicUsize,
}

#[async_trait]
impl RecordSource for ScriptedSource {
    async fn fetch_record_once(&self, item: &WorkItem) -> FetchOutcome<RawRecord> {
        if self.panic_on == Some(item.external_id) {
            panic!("decoder blew up on {}", item.key());
        }

        let served = self.served.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, cancel)) = &self.cancel_after {
            if served >= *limit {
                cancel.cancel();
            }
        }

        FetchOutcome::Success(RawRecord {
            external_id: item.external_id,
            kind: item.kind,
            label: format!("Film {} 1080p", item.external_id),
            title: format!("Film {}", item.external_id),
            original_title: format!("Film {}", item.external_id),
            asset_ref: self.asset.as_ref().map(|(name, _)| name.clone()),
            ..RawRecord::default()
        })
    }

    async fn fetch_asset_once(&self, _asset_ref: &str) -> FetchOutcome<Vec<u8>> {
        match &self.asset {
            Some((_, bytes)) => FetchOutcome::Success(bytes.clone()),
            None => FetchOutcome::NotFound,
        }
    }
}

fn scripted_coordinator(
    config: &Config,
    source: ScriptedSource,
    cancel: CancellationToken,
) -> Coordinator {
    Coordinator::with_source(
        config.clone(),
        "test-hash",
        Arc::new(source),
        Arc::new(WebpTransform),
        cancel,
    )
    .unwrap()
}

fn movies(ids: &[i64]) -> Vec<WorkItem> {
    ids.iter().map(|&id| WorkItem::new(id, ItemKind::Movie)).collect()
}

fn gzip_lines(lines: &[&str]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    for line in lines {
        writeln!(encoder, "{}", line).unwrap();
    }
    encoder.finish().unwrap()
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(6, 9, image::Rgba([10, 120, 200, 255]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

#[tokio::test]
async fn test_not_found_outcome() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), false);

    Mock::given(method("GET"))
        .and(path("/movie/404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher(&config);
    let outcome = fetcher
        .fetch_record(&WorkItem::new(404, ItemKind::Movie))
        .await;

    assert_eq!(outcome, FetchOutcome::NotFound);
}

#[tokio::test]
async fn test_rate_limited_then_success() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), false);

    Mock::given(method("GET"))
        .and(path("/movie/550"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/movie/550"))
        .and(query_param("api_key", "test-key"))
        .and(query_param("language", "en-US"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"id": 550, "title": "Fight Club", "original_title": "Fight Club"}"#),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher(&config);
    let outcome = fetcher
        .fetch_record(&WorkItem::new(550, ItemKind::Movie))
        .await;

    match outcome {
        FetchOutcome::Success(record) => assert_eq!(record.title, "Fight Club"),
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(fetcher.rate_limited_hits(), 1);
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), false);

    Mock::given(method("GET"))
        .and(path("/tv/7"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher(&config);
    let outcome = fetcher.fetch_record(&WorkItem::new(7, ItemKind::Tv)).await;

    assert_eq!(
        outcome,
        FetchOutcome::Transient {
            cause: "HTTP 503".to_string()
        }
    );
}

#[tokio::test]
async fn test_malformed_payload_is_not_retried() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), false);

    Mock::given(method("GET"))
        .and(path("/movie/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id": 2, "title": "Wrong"}"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher(&config);
    let outcome = fetcher.fetch_record(&WorkItem::new(1, ItemKind::Movie)).await;

    assert!(matches!(outcome, FetchOutcome::Malformed { .. }));
}

#[tokio::test]
async fn test_full_sync_run() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), true);

    Mock::given(method("GET"))
        .and(path("/movie/550"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{
                "id": 550,
                "title": "Fight Club",
                "original_title": "Fight Club",
                "overview": "An insomniac office worker...",
                "poster_path": "/fight.png",
                "release_date": "1999-10-15",
                "genres": [{"id": 18, "name": "Drama"}],
                "vote_average": 8.4,
                "vote_count": 26280,
                "runtime": 139,
                "translations": {"translations": [
                    {"iso_639_1": "ru", "data": {"title": "Бойцовский клуб", "overview": "Сотрудник страховой компании...", "tagline": ""}}
                ]},
                "releases": [
                    {"title": "Fight Club 2160p HDR10 HEVC", "size": "40 GB", "seeders": 12},
                    {"title": "Fight Club 1080p x264 DUB", "size": "8 GB"}
                ]
            }"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/images/fight.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/movie/13"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tv/1399"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{
                "id": 1399,
                "name": "Game of Thrones",
                "original_name": "Game of Thrones",
                "overview": "",
                "tagline": "Winter is coming",
                "episode_run_time": [60],
                "alternative_titles": {"results": [{"iso_3166_1": "RU", "title": "Игра престолов"}]}
            }"#,
        ))
        .mount(&mock_server)
        .await;

    seed(
        &config,
        &[
            WorkItem::new(550, ItemKind::Movie),
            WorkItem::new(13, ItemKind::Movie),
            WorkItem::new(1399, ItemKind::Tv),
        ],
    );

    let mut coordinator = Coordinator::with_source(
        config.clone(),
        "test-hash",
        Arc::new(RestCatalogSource::new(
            build_http_client(&config.api.user_agent, Duration::from_secs(5)).unwrap(),
            &config.api,
            "test-key".to_string(),
        )),
        Arc::new(WebpTransform),
        CancellationToken::new(),
    )
    .unwrap();

    let summary = coordinator.run().await.unwrap();
    drop(coordinator);

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.transient_failures + summary.malformed, 0);
    assert_eq!(summary.assets_queued, 1);
    assert_eq!(summary.transform.converted, 1);
    assert_eq!(summary.batches_committed, 2);
    assert!(!summary.interrupted);

    let storage = open(&config);
    let movie = ItemKey::new(550, ItemKind::Movie);

    let record = storage.get_record(movie).unwrap().unwrap();
    assert_eq!(record.title, "Бойцовский клуб");
    assert_eq!(record.overview, "Сотрудник страховой компании...");
    assert_eq!(record.year, Some(1999));
    assert_eq!(record.genres, vec!["Drama"]);

    let poster = record.asset_path.expect("asset path recorded");
    assert!(poster.ends_with("movie_550.webp"));
    assert!(Path::new(&poster).exists());
    assert_eq!(
        std::fs::read_dir(dir.path().join("tmp")).unwrap().count(),
        0,
        "temp files should be cleaned up"
    );

    let releases = storage.classified_for(movie).unwrap();
    assert_eq!(releases.len(), 2);
    let resolutions: Vec<_> = releases
        .iter()
        .map(|e| e.metadata.resolution.as_str())
        .collect();
    assert!(resolutions.contains(&"2160p"));
    assert!(resolutions.contains(&"1080p"));

    let show = storage
        .get_record(ItemKey::new(1399, ItemKind::Tv))
        .unwrap()
        .unwrap();
    assert_eq!(show.title, "Игра престолов");
    assert_eq!(show.overview, "");
    assert_eq!(show.runtime_minutes, Some(60));

    // the missing item is attempted but has no record
    let missing = ItemKey::new(13, ItemKind::Movie);
    assert!(storage.get_record(missing).unwrap().is_none());
    assert!(storage
        .get_work_item(missing)
        .unwrap()
        .unwrap()
        .last_synced_at
        .is_some());
    assert_eq!(storage.count_never_synced().unwrap(), 0);

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!(run.counters.attempted, 3);
    assert_eq!(run.counters.not_found, 1);
}

#[tokio::test]
async fn test_cancelled_run_leaves_backlog_untouched() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), false);

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&mock_server)
        .await;

    seed(
        &config,
        &[
            WorkItem::new(1, ItemKind::Movie),
            WorkItem::new(2, ItemKind::Movie),
        ],
    );

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut coordinator = Coordinator::new(config.clone(), "test-hash", cancel).unwrap();
    let summary = coordinator.run().await.unwrap();
    drop(coordinator);

    assert_eq!(summary.attempted, 0);
    assert!(summary.interrupted);

    let storage = open(&config);
    assert_eq!(storage.count_never_synced().unwrap(), 2);
    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::Interrupted
    );
}

#[tokio::test]
async fn test_runs_cycle_through_backlog() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&mock_server.uri(), dir.path(), false);
    config.sync.items_per_run = Some(1);

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    seed(
        &config,
        &[
            WorkItem::new(20, ItemKind::Movie),
            WorkItem::new(10, ItemKind::Movie),
        ],
    );

    for _ in 0..2 {
        let mut coordinator =
            Coordinator::new(config.clone(), "test-hash", CancellationToken::new()).unwrap();
        let summary = coordinator.run().await.unwrap();
        assert_eq!(summary.attempted, 1);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // both items attempted once; the earliest attempt is due next
    let storage = open(&config);
    assert_eq!(storage.count_never_synced().unwrap(), 0);
    let next = storage.next_batch(Some(1)).unwrap();
    assert_eq!(next[0].key(), ItemKey::new(10, ItemKind::Movie));
}

#[tokio::test]
async fn test_panicking_item_does_not_lose_its_batch() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("http://127.0.0.1:9", dir.path(), false);
    seed(&config, &movies(&[1, 2, 3]));

    let source = ScriptedSource {
        panic_on: Some(2),
        ..ScriptedSource::default()
    };
    let mut coordinator = scripted_coordinator(&config, source, CancellationToken::new());
    let summary = coordinator.run().await.unwrap();
    drop(coordinator);

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.transient_failures, 1);
    assert_eq!(summary.batches_committed, 2);

    // the item sharing a batch with the panicking one is still persisted
    let storage = open(&config);
    assert!(storage
        .get_record(ItemKey::new(1, ItemKind::Movie))
        .unwrap()
        .is_some());
    assert!(storage
        .get_record(ItemKey::new(2, ItemKind::Movie))
        .unwrap()
        .is_none());
    assert_eq!(storage.count_never_synced().unwrap(), 0);
    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn test_persistence_failure_fails_run() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("http://127.0.0.1:9", dir.path(), false);
    seed(&config, &movies(&[1, 2]));

    // every write of classified metadata is refused
    let conn = rusqlite::Connection::open(&config.output.database_path).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER refuse_classified BEFORE INSERT ON classified_metadata
         BEGIN SELECT RAISE(ABORT, 'database or disk is full'); END;",
    )
    .unwrap();
    drop(conn);

    let mut coordinator =
        scripted_coordinator(&config, ScriptedSource::default(), CancellationToken::new());
    let result = coordinator.run().await;
    drop(coordinator);

    assert!(matches!(
        result,
        Err(SyncError::Persistence { batch: 0, .. })
    ));

    let storage = open(&config);
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.counters.attempted, 2);

    // the failed batch is neither persisted nor marked attempted
    assert_eq!(storage.count_never_synced().unwrap(), 2);
    assert_eq!(storage.count_records().unwrap(), 0);
}

#[tokio::test]
async fn test_cancel_mid_run_flushes_completed_batches() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config("http://127.0.0.1:9", dir.path(), false);
    config.sync.concurrency = 1;
    seed(&config, &movies(&[1, 2, 3, 4, 5, 6]));

    let cancel = CancellationToken::new();
    let source = ScriptedSource {
        cancel_after: Some((2, cancel.clone())),
        ..ScriptedSource::default()
    };
    let mut coordinator = scripted_coordinator(&config, source, cancel);
    let summary = coordinator.run().await.unwrap();
    drop(coordinator);

    assert!(summary.interrupted);
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.batches_committed, 1);

    let storage = open(&config);
    for id in [1, 2] {
        let key = ItemKey::new(id, ItemKind::Movie);
        assert!(storage.get_record(key).unwrap().is_some());
        assert!(storage
            .get_work_item(key)
            .unwrap()
            .unwrap()
            .last_synced_at
            .is_some());
    }
    assert_eq!(storage.count_never_synced().unwrap(), 4);
    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::Interrupted
    );
}

#[tokio::test]
async fn test_shared_asset_directory_keeps_converted_poster() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config("http://127.0.0.1:9", dir.path(), true);
    config.assets.temp_dir = config.assets.output_dir.clone();
    seed(&config, &movies(&[1]));

    let source = ScriptedSource {
        asset: Some(("/poster.webp".to_string(), png_bytes())),
        ..ScriptedSource::default()
    };
    let mut coordinator = scripted_coordinator(&config, source, CancellationToken::new());
    let summary = coordinator.run().await.unwrap();
    drop(coordinator);

    assert_eq!(summary.transform.converted, 1);

    let storage = open(&config);
    let record = storage
        .get_record(ItemKey::new(1, ItemKind::Movie))
        .unwrap()
        .unwrap();
    let poster = record.asset_path.expect("asset path recorded");
    assert!(poster.ends_with("movie_1.webp"));
    assert!(Path::new(&poster).exists());
    assert!(!dir.path().join("posters").join("movie_1.webp.part").exists());
}

#[tokio::test]
async fn test_unconvertible_poster_keeps_original_extension() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("http://127.0.0.1:9", dir.path(), true);
    seed(&config, &movies(&[7]));

    let source = ScriptedSource {
        asset: Some(("/poster.jpg".to_string(), b"not really a jpeg".to_vec())),
        ..ScriptedSource::default()
    };
    let mut coordinator = scripted_coordinator(&config, source, CancellationToken::new());
    let summary = coordinator.run().await.unwrap();
    drop(coordinator);

    assert_eq!(summary.transform.relocated, 1);
    assert_eq!(summary.transform.converted, 0);

    let posters = dir.path().join("posters");
    assert!(!posters.join("movie_7.webp").exists());
    assert_eq!(
        std::fs::read(posters.join("movie_7.jpg")).unwrap(),
        b"not really a jpeg"
    );

    let storage = open(&config);
    let record = storage
        .get_record(ItemKey::new(7, ItemKind::Movie))
        .unwrap()
        .unwrap();
    let poster = record.asset_path.expect("asset path recorded");
    assert!(poster.ends_with("movie_7.jpg"));
    assert!(Path::new(&poster).exists());
}

#[tokio::test]
async fn test_fetch_latest_export_looks_back() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), false);
    let today = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();

    Mock::given(method("HEAD"))
        .and(path("/exports/movie_ids_03_02_2025.json.gz"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/exports/movie_ids_03_01_2025.json.gz"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/exports/movie_ids_03_01_2025.json.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_lines(&[
            r#"{"adult":false,"id":550,"original_title":"Fight Club","popularity":61.4}"#,
            r#"{"adult":false,"id":603,"original_title":"The Matrix","popularity":80.1}"#,
            r#"{"adult":false,"id":13,"original_title":"Forrest Gump","popularity":55.0}"#,
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    seed(&config, &movies(&[550]));

    let client = build_http_client(&config.api.user_agent, Duration::from_secs(5)).unwrap();
    let locator = ExportLocator::new(client, &config.exports);
    let local = locator
        .fetch_latest(ItemKind::Movie, today)
        .await
        .unwrap()
        .expect("yesterday's export should be found");
    assert!(local.ends_with("movie_ids_03_01_2025.json.gz"));

    let remote = read_id_dump(&local).unwrap();
    let mut storage = open(&config);
    let added = seed_from_snapshot(&mut storage, ItemKind::Movie, &remote).unwrap();
    assert_eq!(added, 2);
    assert_eq!(storage.count_items().unwrap(), 3);

    // a second call reuses the cached file instead of downloading again
    let again = locator.download("movie_ids_03_01_2025.json.gz").await.unwrap();
    assert_eq!(again, local);
}

#[tokio::test]
async fn test_no_export_within_lookback() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path(), false);

    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = build_http_client(&config.api.user_agent, Duration::from_secs(5)).unwrap();
    let locator = ExportLocator::new(client, &config.exports);
    let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

    let found = locator.fetch_latest(ItemKind::Tv, today).await.unwrap();
    assert!(found.is_none());
}

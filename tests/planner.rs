//! End-to-end planner runs against an in-memory catalog and a mock file server

mod common;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

use hb_fetcher::app::{
    Catalog, ChecksumPolicy, ChecksumStore, ClientConfig, DownloadPlanner, EventKind, HttpHandler,
    IntegrityChecker, ItemOutcome, Md5Hash, Order, PlannerConfig, PlatformSelection, ProgressBus,
    ProgressEvent, ResumableFetcher, TransferPolicy, create_shutdown_channel,
};
use hb_fetcher::errors::{CatalogError, CatalogResult};

use common::{Ending, Reply, ScriptedServer};

/// Catalog serving canned order documents
///
/// Each key maps to a list of versions; the n-th call to `order` returns the
/// n-th version, and the last one once the list is exhausted.
#[derive(Default)]
struct FakeCatalog {
    keys: Vec<String>,
    versions: HashMap<String, Vec<Value>>,
    calls: Mutex<HashMap<String, usize>>,
    order_calls: AtomicUsize,
}

impl FakeCatalog {
    fn with_order(mut self, key: &str, versions: Vec<Value>) -> Self {
        self.keys.push(key.to_string());
        self.versions.insert(key.to_string(), versions);
        self
    }

    fn with_missing_order(mut self, key: &str) -> Self {
        self.keys.push(key.to_string());
        self
    }
}

impl Catalog for FakeCatalog {
    async fn order_keys(&self) -> CatalogResult<Vec<String>> {
        Ok(self.keys.clone())
    }

    async fn order(&self, key: &str) -> CatalogResult<Order> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        let versions = self
            .versions
            .get(key)
            .ok_or_else(|| CatalogError::OrderNotFound {
                key: key.to_string(),
            })?;

        let index = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(key.to_string()).or_insert(0);
            let index = (*count).min(versions.len() - 1);
            *count += 1;
            index
        };
        Ok(serde_json::from_value(versions[index].clone()).unwrap())
    }
}

fn file_entry(url: &str, body: &[u8], platform: &str) -> Value {
    json!({
        "platform": platform,
        "machine_name": format!("game_{}", platform),
        "download_struct": [{
            "name": "Download",
            "md5": Md5Hash::of(body).to_hex(),
            "file_size": body.len(),
            "human_size": "small",
            "url": {"web": url}
        }]
    })
}

fn order_json(key: &str, downloads: Vec<Value>) -> Value {
    json!({
        "gamekey": key,
        "product": {"human_name": "Test Bundle", "machine_name": "testbundle"},
        "subproducts": [{
            "machine_name": "game",
            "human_name": "Game",
            "downloads": downloads
        }]
    })
}

fn linux_only() -> PlatformSelection {
    PlatformSelection::from_pairs([("linux", true), ("windows", false)])
}

struct Harness {
    bus: ProgressBus,
    policy: TransferPolicy,
    config: PlannerConfig,
}

impl Harness {
    fn new(root: &Path) -> Self {
        let mut config = PlannerConfig::new(root);
        config.platforms = linux_only();
        Self {
            bus: ProgressBus::new(),
            policy: TransferPolicy {
                resume: true,
                max_attempts: 1,
                retry_base_delay: Duration::from_millis(1),
            },
            config,
        }
    }

    fn build(self, catalog: FakeCatalog) -> (DownloadPlanner<FakeCatalog>, Arc<ChecksumStore>) {
        let bus = Arc::new(self.bus);
        let store = Arc::new(ChecksumStore::new(ChecksumPolicy::default(), Arc::clone(&bus)));
        let client = ClientConfig::default().build_http_client().unwrap();
        let http = HttpHandler::new(client, 1, Duration::ZERO);
        let fetcher = ResumableFetcher::new(http, Arc::clone(&store), Arc::clone(&bus), self.policy);
        let planner = DownloadPlanner::new(
            catalog,
            IntegrityChecker::new(Arc::clone(&store)),
            fetcher,
            bus,
            self.config,
        );
        (planner, store)
    }
}

async fn place(root: &Path, relative: &str, bytes: &[u8]) {
    let path = root.join(relative);
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(path, bytes).await.unwrap();
}

#[tokio::test]
async fn test_dry_run_fetches_nothing() {
    let body = b"linux build".to_vec();
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/files/game.tgz");
            then.status(200).body(&body);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with_order(
        "K1",
        vec![order_json("K1", vec![file_entry(&server.url("/files/game.tgz"), &body, "linux")])],
    );

    let mut harness = Harness::new(temp_dir.path());
    harness.config.dry_run = true;
    let (planner, _) = harness.build(catalog);
    let summary = planner.run().await.unwrap();

    assert_eq!(summary.pending, 1);
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.bytes_planned, body.len() as u64);
    assert!(matches!(
        summary.reports[0].outcome,
        ItemOutcome::WouldFetch { .. }
    ));
    mock.assert_hits_async(0).await;
    assert!(!temp_dir.path().join("game/linux/files_game.tgz").exists());
}

#[tokio::test]
async fn test_fetches_missing_file_and_verifies_it() {
    let body = vec![42u8; 30_000];
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/files/game.tgz");
            then.status(200).body(&body);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with_order(
        "K1",
        vec![order_json("K1", vec![file_entry(&server.url("/files/game.tgz"), &body, "linux")])],
    );

    let (planner, store) = Harness::new(temp_dir.path()).build(catalog);
    let summary = planner.run().await.unwrap();

    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.bytes_fetched, 30_000);
    assert!(summary.is_successful());
    assert_eq!(summary.reports[0].attempts, 1);
    mock.assert_async().await;

    let path = temp_dir.path().join("game/linux/files_game.tgz");
    assert_eq!(tokio::fs::read(&path).await.unwrap(), body);
    // Hashed once for the post-fetch check, which also wrote the sidecar
    assert_eq!(store.computations(), 1);
    assert!(temp_dir.path().join("game/linux/files_game.tgz.md5").exists());
}

#[tokio::test]
async fn test_second_run_is_satisfied_without_hashing() {
    let body = b"already here".to_vec();
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/files/game.tgz");
            then.status(200).body(&body);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    place(temp_dir.path(), "game/linux/files_game.tgz", &body).await;
    let url = server.url("/files/game.tgz");
    let catalog = || {
        FakeCatalog::default().with_order(
            "K1",
            vec![order_json("K1", vec![file_entry(&url, &body, "linux")])],
        )
    };

    let (first, first_store) = Harness::new(temp_dir.path()).build(catalog());
    let summary = first.run().await.unwrap();
    assert_eq!(summary.satisfied, 1);
    assert_eq!(first_store.computations(), 1);

    let (second, second_store) = Harness::new(temp_dir.path()).build(catalog());
    let summary = second.run().await.unwrap();
    assert_eq!(summary.satisfied, 1);
    assert_eq!(second_store.computations(), 0);

    mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_skipped_platforms_and_invalid_entries_are_counted_apart() {
    let body = b"payload".to_vec();
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/files/game.tgz");
            then.status(200).body(&body);
        })
        .await;

    let mut broken = file_entry(&server.url("/files/broken.tgz"), &body, "linux");
    broken["download_struct"][0]
        .as_object_mut()
        .unwrap()
        .remove("md5");

    let temp_dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with_order(
        "K1",
        vec![order_json(
            "K1",
            vec![
                file_entry(&server.url("/files/game.tgz"), &body, "linux"),
                file_entry(&server.url("/files/game.exe"), &body, "windows"),
                broken,
            ],
        )],
    );

    let (planner, _) = Harness::new(temp_dir.path()).build(catalog);
    let summary = planner.run().await.unwrap();

    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.platform_skipped, 1);
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.satisfied, 0);
    assert!(!summary.is_successful());

    let invalid: Vec<_> = summary
        .reports_where(|outcome| matches!(outcome, ItemOutcome::Invalid { .. }))
        .collect();
    assert_eq!(invalid[0].label, "game/linux/files_broken.tgz");
    assert_eq!(
        invalid[0].outcome,
        ItemOutcome::Invalid {
            reason: "missing md5".to_string()
        }
    );
}

#[tokio::test]
async fn test_unreadable_order_does_not_stop_the_run() {
    let body = b"second order".to_vec();
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/files/game.tgz");
            then.status(200).body(&body);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with_missing_order("GONE").with_order(
        "K2",
        vec![order_json("K2", vec![file_entry(&server.url("/files/game.tgz"), &body, "linux")])],
    );

    let (planner, _) = Harness::new(temp_dir.path()).build(catalog);
    let summary = planner.run().await.unwrap();

    assert_eq!(summary.orders_skipped, 1);
    assert_eq!(summary.fetched, 1);
    assert!(!summary.is_successful());
}

#[tokio::test]
async fn test_order_key_filter_limits_the_run() {
    let temp_dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default()
        .with_order("K1", vec![order_json("K1", vec![])])
        .with_order("K2", vec![order_json("K2", vec![])]);

    let mut harness = Harness::new(temp_dir.path());
    harness.config.order_keys = Some(vec!["K2".to_string()]);
    harness.config.dry_run = true;
    let (planner, _) = harness.build(catalog);
    let summary = planner.run().await.unwrap();

    assert_eq!(summary.items(), 0);
    assert!(summary.is_successful());
}

#[tokio::test]
async fn test_expired_url_is_refreshed_before_fetching() {
    let body = b"fresh token content".to_vec();
    let server = MockServer::start_async().await;
    let stale = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/files/game.tgz")
                .query_param("token", "old");
            then.status(403);
        })
        .await;
    let fresh = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/files/game.tgz")
                .query_param("token", "new");
            then.status(200).body(&body);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let old_url = format!("{}?token=old", server.url("/files/game.tgz"));
    let new_url = format!("{}?token=new", server.url("/files/game.tgz"));
    let catalog = FakeCatalog::default().with_order(
        "K1",
        vec![
            order_json("K1", vec![file_entry(&old_url, &body, "linux")]),
            order_json("K1", vec![file_entry(&new_url, &body, "linux")]),
        ],
    );

    let (planner, _) = Harness::new(temp_dir.path()).build(catalog);
    let summary = planner.run().await.unwrap();

    assert_eq!(summary.fetched, 1);
    stale.assert_hits_async(0).await;
    fresh.assert_async().await;
    assert_eq!(
        tokio::fs::read(temp_dir.path().join("game/linux/files_game.tgz"))
            .await
            .unwrap(),
        body
    );
}

#[tokio::test]
async fn test_urls_refreshed_once_per_order() {
    let first = b"first file".to_vec();
    let second = b"second file".to_vec();
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/files/a.tgz");
            then.status(200).body(&first);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/files/b.tgz");
            then.status(200).body(&second);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with_order(
        "K1",
        vec![order_json(
            "K1",
            vec![
                file_entry(&server.url("/files/a.tgz"), &first, "linux"),
                file_entry(&server.url("/files/b.tgz"), &second, "linux"),
            ],
        )],
    );

    let (planner, _) = Harness::new(temp_dir.path()).build(catalog);
    let summary = planner.run().await.unwrap();

    assert_eq!(summary.fetched, 2);
    // One read while enumerating, one refresh before the first fetch
    assert_eq!(planner.catalog().order_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_server_errors_are_retried_up_to_the_limit() {
    let body = b"never delivered".to_vec();
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/files/game.tgz");
            then.status(500);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with_order(
        "K1",
        vec![order_json("K1", vec![file_entry(&server.url("/files/game.tgz"), &body, "linux")])],
    );

    let mut harness = Harness::new(temp_dir.path());
    harness.policy.max_attempts = 3;
    let (planner, _) = harness.build(catalog);
    let summary = planner.run().await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.reports[0].attempts, 3);
    mock.assert_hits_async(3).await;
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let body = b"gone".to_vec();
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/files/game.tgz");
            then.status(404);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with_order(
        "K1",
        vec![order_json("K1", vec![file_entry(&server.url("/files/game.tgz"), &body, "linux")])],
    );

    let mut harness = Harness::new(temp_dir.path());
    harness.policy.max_attempts = 3;
    let (planner, _) = harness.build(catalog);
    let summary = planner.run().await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.reports[0].attempts, 1);
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_wrong_content_fails_verification_after_fetch() {
    let advertised = vec![1u8; 4096];
    let served = vec![2u8; 4096];
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/files/game.tgz");
            then.status(200).body(&served);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with_order(
        "K1",
        vec![order_json(
            "K1",
            vec![file_entry(&server.url("/files/game.tgz"), &advertised, "linux")],
        )],
    );

    let mut harness = Harness::new(temp_dir.path());
    harness.policy.max_attempts = 3;
    let (planner, _) = harness.build(catalog);
    let summary = planner.run().await.unwrap();

    assert_eq!(summary.failed, 1);
    match &summary.reports[0].outcome {
        ItemOutcome::Failed { error } => {
            assert!(error.starts_with("verification after fetch failed"), "{}", error);
            assert!(error.contains(&Md5Hash::of(&advertised).to_hex()), "{}", error);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_partial_file_is_resumed() {
    let body: Vec<u8> = (0..20_000u32).map(|i| (i % 97) as u8).collect();
    let server = MockServer::start_async().await;
    let ranged = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/files/game.tgz")
                .header("range", "bytes=8000-");
            then.status(206)
                .header("content-range", "bytes 8000-19999/20000")
                .body(&body[8000..]);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    place(temp_dir.path(), "game/linux/files_game.tgz", &body[..8000]).await;
    let catalog = FakeCatalog::default().with_order(
        "K1",
        vec![order_json("K1", vec![file_entry(&server.url("/files/game.tgz"), &body, "linux")])],
    );

    let (planner, _) = Harness::new(temp_dir.path()).build(catalog);
    let summary = planner.run().await.unwrap();

    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.resumed, 1);
    assert_eq!(summary.bytes_fetched, 12_000);
    ranged.assert_async().await;
    assert_eq!(
        tokio::fs::read(temp_dir.path().join("game/linux/files_game.tgz"))
            .await
            .unwrap(),
        body
    );
}

#[tokio::test]
async fn test_retry_after_dropped_connection_resumes_from_prefix() {
    let body: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let server = ScriptedServer::start(vec![
        Reply::full(100_000, &body[..40_000], Ending::Close),
        Reply::partial(40_000, 100_000, &body[40_000..]),
    ])
    .await;

    let temp_dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with_order(
        "K1",
        vec![order_json("K1", vec![file_entry(&server.url("/files/game.tgz"), &body, "linux")])],
    );

    let mut harness = Harness::new(temp_dir.path());
    harness.policy.max_attempts = 2;
    let (planner, _) = harness.build(catalog);
    let summary = planner.run().await.unwrap();

    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.resumed, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.reports[0].attempts, 2);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].contains("range:"));
    assert!(requests[1].contains("range: bytes=40000-"));
    assert_eq!(
        tokio::fs::read(temp_dir.path().join("game/linux/files_game.tgz"))
            .await
            .unwrap(),
        body
    );
}

#[tokio::test]
async fn test_shutdown_cancels_remaining_items() {
    let body = b"not fetched".to_vec();
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/files/game.tgz");
            then.status(200).body(&body);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with_order(
        "K1",
        vec![order_json("K1", vec![file_entry(&server.url("/files/game.tgz"), &body, "linux")])],
    );

    let (trigger, signal) = create_shutdown_channel();
    trigger.trigger();

    let (planner, _) = Harness::new(temp_dir.path()).build(catalog);
    let summary = planner.with_shutdown(signal).run().await.unwrap();

    assert_eq!(summary.cancelled, 1);
    assert_eq!(summary.fetched, 0);
    assert!(!summary.is_successful());
    mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_classification_events_are_published() {
    let body = b"classified".to_vec();
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/files/game.tgz");
            then.status(200).body(&body);
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with_order(
        "K1",
        vec![order_json("K1", vec![file_entry(&server.url("/files/game.tgz"), &body, "linux")])],
    );

    let seen = Arc::new(Mutex::new(Vec::<bool>::new()));
    let mut harness = Harness::new(temp_dir.path());
    let sink = Arc::clone(&seen);
    harness.bus.subscribe(EventKind::Classified, move |event| {
        if let ProgressEvent::Classified { needs_fetch, .. } = event {
            sink.lock().unwrap().push(*needs_fetch);
        }
    });

    let (planner, _) = harness.build(catalog);
    planner.run().await.unwrap();

    // Missing before the fetch, verified after it
    assert_eq!(*seen.lock().unwrap(), vec![true, false]);
}

//! End-to-end tests for the ingest loop.
//!
//! The upstream API is replaced with a scripted [`Fetcher`]; persistence uses
//! either the real SQLite repository or an in-memory recording store.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use pokespider::models::{Outcome, RowUpsert, StoredRow, Summary};
use pokespider::repository::{
    create_diesel_pool, DieselPokemonRepository, PokemonStore, StoreError,
};
use pokespider::spider::{
    FetchError, FetchResponse, Fetcher, IdRange, Ingestor, RateLimit, RetryPolicy, UrlTemplate,
};

const TEMPLATE: &str = "https://pokeapi.test/api/v2/pokemon/{id}/";

type Scripted = Result<FetchResponse, FetchError>;

/// Fetcher that replays queued responses per URL, falling back to a generated payload.
#[derive(Default)]
struct ScriptedFetcher {
    queued: Mutex<HashMap<String, VecDeque<Scripted>>>,
    always_fail: Mutex<Vec<String>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedFetcher {
    fn queue(&self, url: &str, response: Scripted) {
        self.queued
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    fn fail_always(&self, url: &str) {
        self.always_fail.lock().unwrap().push(url.to_string());
    }

    fn calls_for(&self, url: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, at)| *at)
            .collect()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn pokemon_body(url: &str) -> String {
    let id: i64 = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    json!({
        "id": id,
        "name": format!("mon-{}", id),
        "height": id * 2,
        "weight": id * 10,
        "abilities": [{"ability": {"name": "overgrow"}}],
        "types": [{"type": {"name": "grass"}}, {"type": {"name": "poison"}}],
        "species": {"name": format!("mon-{}", id)}
    })
    .to_string()
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        if self.always_fail.lock().unwrap().iter().any(|u| u == url) {
            return Err(FetchError::Transport("connection refused".to_string()));
        }
        if let Some(next) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
        {
            return next;
        }
        Ok(FetchResponse::new(200, pokemon_body(url)))
    }
}

/// In-memory store that records every upsert.
#[derive(Default)]
struct RecordingStore {
    upserts: Mutex<Vec<RowUpsert>>,
    fail_writes: bool,
}

impl RecordingStore {
    fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    fn upserts(&self) -> Vec<RowUpsert> {
        self.upserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PokemonStore for RecordingStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert(&self, row: &RowUpsert) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Pool("database unreachable".to_string()));
        }
        self.upserts.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn find_by_url(&self, _url: &str) -> Result<Option<StoredRow>, StoreError> {
        Ok(None)
    }

    async fn summary(&self) -> Result<Summary, StoreError> {
        let mut latest: HashMap<String, i32> = HashMap::new();
        for row in self.upserts.lock().unwrap().iter() {
            latest.insert(row.url.clone(), row.status);
        }
        Ok(Summary {
            total: latest.len() as i64,
            null_status: 0,
            status_200: latest.values().filter(|s| **s == 200).count() as i64,
            non_200: latest.values().filter(|s| **s != 200).count() as i64,
        })
    }
}

async fn sqlite_store() -> (Arc<DieselPokemonRepository>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let pool = create_diesel_pool(&dir.path().join("test.db")).expect("Failed to create pool");
    let repo = DieselPokemonRepository::new(pool);
    repo.ensure_schema().await.expect("Failed to create table");
    (Arc::new(repo), dir)
}

fn template() -> UrlTemplate {
    UrlTemplate::parse(TEMPLATE).unwrap()
}

fn retry(max_attempts: u32, backoff_ms: u64) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(backoff_ms)).unwrap()
}

// ============================================================================
// Full runs against SQLite
// ============================================================================

#[tokio::test]
async fn run_stores_one_row_per_id() {
    let (store, _dir) = sqlite_store().await;
    let fetcher = Arc::new(ScriptedFetcher::default());
    let ingestor = Ingestor::new(fetcher.clone(), store.clone());

    let range = IdRange::new(1, 5).unwrap();
    let report = ingestor
        .run(&range, &template(), &retry(3, 1), RateLimit::default())
        .await
        .unwrap();

    assert_eq!(report.processed(), 5);
    assert_eq!(report.stored, 5);
    assert_eq!(report.summary.total, 5);
    assert_eq!(report.summary.null_status, 0);

    let rows = store.get_all().await.unwrap();
    let urls: Vec<_> = rows.iter().map(|r| r.url.clone()).collect();
    let expected: Vec<_> = (1..=5).map(|id| template().render(id)).collect();
    assert_eq!(urls, expected);
    assert!(rows.iter().all(|r| r.status.is_some()));

    let third = store.find_by_url(&template().render(3)).await.unwrap().unwrap();
    assert_eq!(third.name.as_deref(), Some("mon-3"));
    assert_eq!(
        third.body,
        Some(json!({
            "pokemon_id": 3,
            "pokemon_name": "mon-3",
            "height": 6,
            "weight": 30,
            "abilities": [{"name": "overgrow"}],
            "types": [{"name": "grass"}, {"name": "poison"}],
            "species": {"name": "mon-3"}
        }))
    );
}

#[tokio::test]
async fn rerunning_a_range_updates_instead_of_duplicating() {
    let (store, _dir) = sqlite_store().await;
    let fetcher = Arc::new(ScriptedFetcher::default());
    let ingestor = Ingestor::new(fetcher.clone(), store.clone());
    let range = IdRange::new(1, 4).unwrap();

    // First pass: ID 2 is missing upstream.
    fetcher.queue(&template().render(2), Ok(FetchResponse::new(404, "Not Found")));
    ingestor
        .run(&range, &template(), &retry(3, 1), RateLimit::default())
        .await
        .unwrap();
    let before = store.find_by_url(&template().render(2)).await.unwrap().unwrap();
    assert_eq!(before.status, Some(404));

    // Second pass over an overlapping range succeeds for every ID.
    let overlap = IdRange::new(2, 4).unwrap();
    let report = ingestor
        .run(&overlap, &template(), &retry(3, 1), RateLimit::default())
        .await
        .unwrap();

    assert_eq!(report.summary.total, 4);
    assert_eq!(report.summary.status_200, 4);
    assert_eq!(report.summary.non_200, 0);

    let after = store.find_by_url(&template().render(2)).await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.status, Some(200));
    assert!(after.body.is_some());
}

#[tokio::test]
async fn mixed_outcomes_are_summarized() {
    let (store, _dir) = sqlite_store().await;
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.queue(&template().render(3), Ok(FetchResponse::new(404, "")));
    fetcher.fail_always(&template().render(4));
    let ingestor = Ingestor::new(fetcher.clone(), store.clone());

    let report = ingestor
        .run(
            &IdRange::new(1, 4).unwrap(),
            &template(),
            &retry(2, 1),
            RateLimit::default(),
        )
        .await
        .unwrap();

    assert_eq!(
        report.summary,
        Summary {
            total: 4,
            null_status: 0,
            status_200: 2,
            non_200: 2,
        }
    );
    assert_eq!(report.exhausted, 1);
    assert_eq!(report.http_status, 1);

    let failed = store.find_by_url(&template().render(4)).await.unwrap().unwrap();
    assert_eq!(failed.status, Some(-1));
    assert_eq!(failed.name, None);
    assert_eq!(failed.body, None);
}

#[tokio::test]
async fn invalid_json_is_stored_without_body_and_not_retried() {
    let (store, _dir) = sqlite_store().await;
    let fetcher = Arc::new(ScriptedFetcher::default());
    let url = template().render(1);
    fetcher.queue(&url, Ok(FetchResponse::new(200, "<!doctype html>")));
    let ingestor = Ingestor::new(fetcher.clone(), store.clone());

    let outcome = ingestor.process(1, &url, &retry(3, 1)).await.unwrap();

    assert_eq!(outcome, Outcome::EmptyBody);
    assert_eq!(fetcher.total_calls(), 1);
    let row = store.find_by_url(&url).await.unwrap().unwrap();
    assert_eq!(row.status, Some(200));
    assert_eq!(row.name, None);
    assert_eq!(row.body, None);
}

// ============================================================================
// Retry behaviour
// ============================================================================

#[tokio::test(start_paused = true)]
async fn exhausted_retries_write_failure_marker() {
    let store = Arc::new(RecordingStore::default());
    let fetcher = Arc::new(ScriptedFetcher::default());
    let url = template().render(7);
    fetcher.fail_always(&url);
    let ingestor = Ingestor::new(fetcher.clone(), store.clone());

    let outcome = ingestor.process(7, &url, &retry(3, 1000)).await.unwrap();

    assert_eq!(outcome, Outcome::Exhausted { attempts: 3 });
    let calls = fetcher.calls_for(&url);
    assert_eq!(calls.len(), 3);
    assert!(calls[1] - calls[0] >= Duration::from_millis(1000));
    assert!(calls[2] - calls[1] >= Duration::from_millis(2000));

    let upserts = store.upserts();
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].status, -1);
    assert_eq!(upserts[0].body, None);
}

#[tokio::test(start_paused = true)]
async fn transient_error_then_success() {
    let store = Arc::new(RecordingStore::default());
    let fetcher = Arc::new(ScriptedFetcher::default());
    let url = template().render(1);
    fetcher.queue(&url, Err(FetchError::Transport("timed out".to_string())));
    let ingestor = Ingestor::new(fetcher.clone(), store.clone());

    let outcome = ingestor.process(1, &url, &retry(3, 500)).await.unwrap();

    assert!(matches!(outcome, Outcome::Stored(_)));
    assert_eq!(fetcher.calls_for(&url).len(), 2);
    let upserts = store.upserts();
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].status, 200);
    assert_eq!(upserts[0].name.as_deref(), Some("mon-1"));
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let store = Arc::new(RecordingStore::default());
    let fetcher = Arc::new(ScriptedFetcher::default());
    let url = template().render(9999);
    fetcher.queue(&url, Ok(FetchResponse::new(404, "Not Found")));
    let ingestor = Ingestor::new(fetcher.clone(), store.clone());

    let outcome = ingestor.process(9999, &url, &retry(3, 1)).await.unwrap();

    assert_eq!(outcome, Outcome::HttpStatus(404));
    assert_eq!(fetcher.calls_for(&url).len(), 1);
    assert_eq!(store.upserts().len(), 1);
    assert_eq!(store.upserts()[0].status, 404);
}

#[tokio::test]
async fn server_errors_are_not_retried() {
    let store = Arc::new(RecordingStore::default());
    let fetcher = Arc::new(ScriptedFetcher::default());
    let url = template().render(5);
    fetcher.queue(&url, Ok(FetchResponse::new(503, "unavailable")));
    let ingestor = Ingestor::new(fetcher.clone(), store.clone());

    let outcome = ingestor.process(5, &url, &retry(3, 1)).await.unwrap();

    assert_eq!(outcome, Outcome::HttpStatus(503));
    assert_eq!(fetcher.total_calls(), 1);
}

// ============================================================================
// Pacing and failure propagation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn rate_limit_pauses_after_every_id() {
    let store = Arc::new(RecordingStore::default());
    let fetcher = Arc::new(ScriptedFetcher::default());
    let ingestor = Ingestor::new(fetcher.clone(), store.clone());

    let start = Instant::now();
    ingestor
        .run(
            &IdRange::new(1, 3).unwrap(),
            &template(),
            &retry(3, 1),
            RateLimit::from_millis(300),
        )
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(900));
    let calls = fetcher.calls.lock().unwrap().clone();
    assert!(calls[1].1 - calls[0].1 >= Duration::from_millis(300));
    assert!(calls[2].1 - calls[1].1 >= Duration::from_millis(300));
}

#[tokio::test]
async fn store_failure_halts_the_run() {
    let store = Arc::new(RecordingStore::failing());
    let fetcher = Arc::new(ScriptedFetcher::default());
    let ingestor = Ingestor::new(fetcher.clone(), store.clone());

    let result = ingestor
        .run(
            &IdRange::new(1, 10).unwrap(),
            &template(),
            &retry(3, 1),
            RateLimit::default(),
        )
        .await;

    assert!(matches!(result, Err(StoreError::Pool(_))));
    assert_eq!(fetcher.total_calls(), 1);
}

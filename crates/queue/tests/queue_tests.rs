//! Integration tests for [`DuelQueueService`] against a scripted
//! gateway mock: dedup, budget enforcement, single-flight preload,
//! advance/backfill, zero-budget short-circuit, and token
//! refresh-or-evict.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use pinduel_core::PhotoRecord;
use pinduel_gateway::{
    DuelGateway, FetchedDuel, GatewayError, ImagePrefetcher, RefreshedToken, VoteOutcome,
    VoteRequest,
};
use pinduel_queue::{DuelQueueService, QueueConfig};

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

/// One scripted `fetch_duel` response.
enum Script {
    Pair(FetchedDuel),
    Empty,
    Fail,
}

/// Gateway mock that pops scripted responses and counts calls.
struct MockGateway {
    script: Mutex<VecDeque<Script>>,
    fetch_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    /// When true, every `refresh_token` call rejects.
    refresh_fails: bool,
    /// Artificial latency per fetch, to force call overlap.
    fetch_delay: Option<Duration>,
}

impl MockGateway {
    fn new(script: Vec<Script>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fetch_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            refresh_fails: false,
            fetch_delay: None,
        }
    }

    fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DuelGateway for MockGateway {
    async fn fetch_duel(&self) -> Result<Option<FetchedDuel>, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Pair(duel)) => Ok(Some(duel)),
            Some(Script::Empty) | None => Ok(None),
            Some(Script::Fail) => Err(GatewayError::Api {
                status: 500,
                body: "boom".into(),
            }),
        }
    }

    async fn refresh_token(
        &self,
        _photo_a: &str,
        _photo_b: &str,
        _old_token: &str,
    ) -> Result<RefreshedToken, GatewayError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.refresh_fails {
            return Err(GatewayError::Api {
                status: 403,
                body: "invalid_vote_token".into(),
            });
        }
        Ok(RefreshedToken {
            vote_token: "refreshed-token".into(),
            expires_at: Some(far_future()),
        })
    }

    async fn submit_vote(&self, _vote: VoteRequest) -> VoteOutcome {
        VoteOutcome::ok()
    }
}

/// Prefetcher mock recording every warmed URI.
struct MockPrefetcher {
    warmed: Mutex<Vec<String>>,
}

impl MockPrefetcher {
    fn new() -> Self {
        Self {
            warmed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ImagePrefetcher for MockPrefetcher {
    async fn prefetch(&self, uri: &str) -> bool {
        self.warmed.lock().unwrap().push(uri.to_string());
        true
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn far_future() -> String {
    (Utc::now() + ChronoDuration::hours(1)).to_rfc3339()
}

fn nearly_expired() -> String {
    (Utc::now() + ChronoDuration::seconds(5)).to_rfc3339()
}

fn photo(id: &str) -> PhotoRecord {
    PhotoRecord {
        id: id.to_string(),
        image_url: format!("https://cdn.example.com/{id}.jpg"),
        rating: 1500.0,
        wins: 3,
        losses: 1,
        uploader_handle: "tester".to_string(),
    }
}

fn pair(a: &str, b: &str) -> Script {
    pair_with(a, b, None, far_future())
}

fn pair_with(a: &str, b: &str, remaining: Option<u32>, expires_at: String) -> Script {
    Script::Pair(FetchedDuel {
        photos: vec![photo(a), photo(b)],
        vote_token: Some(format!("tok-{a}-{b}")),
        expires_at: Some(expires_at),
        remaining_votes: remaining,
        bucket_type: Some("global".into()),
        pin_prompt: None,
        pin_id: None,
    })
}

fn service(
    script: Vec<Script>,
    target: usize,
) -> (
    DuelQueueService<MockGateway, MockPrefetcher>,
    Arc<MockGateway>,
) {
    let gateway = Arc::new(MockGateway::new(script));
    let prefetcher = Arc::new(MockPrefetcher::new());
    let queue = DuelQueueService::new(
        Arc::clone(&gateway),
        prefetcher,
        QueueConfig {
            target_count: target,
        },
    );
    (queue, gateway)
}

// ---------------------------------------------------------------------------
// Dedup invariant
// ---------------------------------------------------------------------------

/// Two consecutive identical pairs collapse into one queue entry; the
/// duplicate still burns a fill attempt.
#[tokio::test]
async fn duplicate_pair_is_not_queued_twice() {
    let (queue, gateway) = service(vec![pair("a", "b"), pair("b", "a"), Script::Empty], 2);

    let len = queue.ensure_preloaded(2).await;

    assert_eq!(len, 1);
    // Both scripted responses were consumed (plus one empty attempt).
    assert!(gateway.fetch_count() >= 2);
    let head = queue.current().await.expect("one entry queued");
    assert_eq!(head.pair_key, "a:b");
}

/// A backend stuck reissuing the same pair exhausts the `target * 2`
/// attempt budget instead of looping forever.
#[tokio::test]
async fn duplicate_storm_stops_at_attempt_budget() {
    let mut script = vec![pair("a", "b")];
    for _ in 0..10 {
        script.push(pair("a", "b"));
    }
    let (queue, gateway) = service(script, 3);

    let len = queue.ensure_preloaded(3).await;

    assert_eq!(len, 1);
    assert_eq!(gateway.fetch_count(), 6); // target 3 -> budget 6
}

// ---------------------------------------------------------------------------
// Budget ceiling
// ---------------------------------------------------------------------------

/// `set_remaining_votes` trims the queue tail down to the budget.
#[tokio::test]
async fn budget_update_trims_queue_from_tail() {
    let (queue, _gateway) = service(
        vec![
            pair("a", "b"),
            pair("c", "d"),
            pair("e", "f"),
            pair("g", "h"),
            pair("i", "j"),
        ],
        7,
    );

    assert_eq!(queue.ensure_preloaded(5).await, 5);

    queue.set_remaining_votes(3).await;

    assert_eq!(queue.len().await, 3);
    // Head untouched; eviction happened at the tail.
    assert_eq!(queue.current().await.unwrap().pair_key, "a:b");
}

/// A budget observed on a fetch response caps the same fill pass.
#[tokio::test]
async fn server_reported_budget_caps_fill() {
    let (queue, gateway) = service(
        vec![
            pair_with("a", "b", Some(1), far_future()),
            pair("c", "d"),
            pair("e", "f"),
        ],
        5,
    );

    let len = queue.ensure_preloaded(5).await;

    assert_eq!(len, 1);
    assert_eq!(queue.remaining_votes().await, Some(1));
    // Fill stopped at the ceiling, not the script's end.
    assert_eq!(gateway.fetch_count(), 1);
}

// ---------------------------------------------------------------------------
// Single-flight preload
// ---------------------------------------------------------------------------

/// Concurrent preload callers join one fill pass instead of doubling
/// the gateway traffic.
#[tokio::test]
async fn concurrent_preloads_share_one_fill_pass() {
    let gateway = Arc::new(MockGateway {
        fetch_delay: Some(Duration::from_millis(5)),
        ..MockGateway::new(vec![pair("a", "b"), pair("c", "d"), pair("e", "f")])
    });
    let queue = DuelQueueService::new(
        Arc::clone(&gateway),
        Arc::new(MockPrefetcher::new()),
        QueueConfig { target_count: 3 },
    );

    let (len_a, len_b) = tokio::join!(queue.ensure_preloaded(3), queue.ensure_preloaded(3));

    assert_eq!(len_a, 3);
    assert_eq!(len_b, 3);
    assert_eq!(gateway.fetch_count(), 3);
}

// ---------------------------------------------------------------------------
// Advance
// ---------------------------------------------------------------------------

/// Advancing pops the head, returns the new head, and kicks off a
/// background backfill.
#[tokio::test]
async fn advance_pops_head_and_backfills() {
    let (queue, gateway) = service(vec![pair("a", "b"), pair("c", "d"), pair("e", "f")], 2);

    assert_eq!(queue.ensure_preloaded(2).await, 2);
    let calls_before = gateway.fetch_count();

    let new_head = queue.advance(2).await.expect("second entry promoted");
    assert_eq!(new_head.pair_key, "c:d");

    queue.wait_for_backfill().await;
    assert!(gateway.fetch_count() > calls_before, "backfill fetched");
    assert_eq!(queue.len().await, 2);
    assert_eq!(queue.current().await.unwrap().pair_key, "c:d");
}

/// Advancing an exhausted queue yields `None` without panicking.
#[tokio::test]
async fn advance_on_empty_queue_returns_none() {
    let (queue, _gateway) = service(vec![], 2);
    assert_matches!(queue.advance(2).await, None);
    queue.wait_for_backfill().await;
}

// ---------------------------------------------------------------------------
// get_or_load_first
// ---------------------------------------------------------------------------

/// An empty queue loads one pair synchronously, then backfills in the
/// background.
#[tokio::test]
async fn get_or_load_first_loads_when_empty() {
    let (queue, _gateway) = service(vec![pair("a", "b"), pair("c", "d")], 2);

    let head = queue.get_or_load_first(2).await.expect("loaded a pair");
    assert_eq!(head.pair_key, "a:b");

    queue.wait_for_backfill().await;
    assert_eq!(queue.len().await, 2);
}

/// A populated head is returned immediately (the backfill is not
/// awaited on the fast path).
#[tokio::test]
async fn get_or_load_first_fast_path_returns_existing_head() {
    let (queue, gateway) = service(vec![pair("a", "b")], 1);
    queue.ensure_preloaded(1).await;
    let calls_before = gateway.fetch_count();

    let head = queue.get_or_load_first(1).await.expect("existing head");
    assert_eq!(head.pair_key, "a:b");
    // The fast path itself issued no synchronous fetch.
    assert_eq!(gateway.fetch_count(), calls_before);
    queue.wait_for_backfill().await;
}

/// A known budget of zero short-circuits without any gateway call.
#[tokio::test]
async fn zero_budget_short_circuits_without_gateway_call() {
    let (queue, gateway) = service(vec![pair("a", "b")], 5);

    queue.set_remaining_votes(0).await;
    let head = queue.get_or_load_first(5).await;

    assert!(head.is_none());
    assert_eq!(gateway.fetch_count(), 0);
}

// ---------------------------------------------------------------------------
// Failure semantics
// ---------------------------------------------------------------------------

/// A gateway error stops the fill pass; already-queued entries survive.
#[tokio::test]
async fn fetch_error_stops_fill_without_surfacing() {
    let (queue, gateway) = service(vec![pair("a", "b"), Script::Fail, pair("c", "d")], 3);

    let len = queue.ensure_preloaded(3).await;

    assert_eq!(len, 1);
    assert_eq!(gateway.fetch_count(), 2);
}

/// A pair served without a token is discarded, never queued.
#[tokio::test]
async fn tokenless_pair_is_discarded() {
    let tokenless = Script::Pair(FetchedDuel {
        photos: vec![photo("a"), photo("b")],
        vote_token: None,
        expires_at: Some(far_future()),
        remaining_votes: None,
        bucket_type: None,
        pin_prompt: None,
        pin_id: None,
    });
    let (queue, _gateway) = service(vec![tokenless, pair("c", "d")], 1);

    assert_eq!(queue.ensure_preloaded(1).await, 1);
    assert_eq!(queue.current().await.unwrap().pair_key, "c:d");
}

// ---------------------------------------------------------------------------
// Token refresh-or-evict
// ---------------------------------------------------------------------------

/// Entries close to expiry get a replacement token in place.
#[tokio::test]
async fn near_expiry_tokens_are_refreshed_in_place() {
    let (queue, gateway) = service(
        vec![
            pair_with("a", "b", None, nearly_expired()),
            pair_with("c", "d", None, far_future()),
        ],
        2,
    );
    queue.ensure_preloaded(2).await;

    queue.ensure_fresh_tokens().await;

    assert_eq!(gateway.refresh_count(), 1);
    assert_eq!(queue.len().await, 2);
    let head = queue.current().await.unwrap();
    assert_eq!(head.vote_token.as_deref(), Some("refreshed-token"));
}

/// A failed refresh evicts the entry and triggers a backfill.
#[tokio::test]
async fn failed_refresh_evicts_and_backfills() {
    let gateway = Arc::new(MockGateway {
        refresh_fails: true,
        ..MockGateway::new(vec![
            pair_with("a", "b", None, nearly_expired()),
            pair("c", "d"),
        ])
    });
    let queue = DuelQueueService::new(
        Arc::clone(&gateway),
        Arc::new(MockPrefetcher::new()),
        QueueConfig { target_count: 1 },
    );
    queue.ensure_preloaded(1).await;
    assert_eq!(queue.len().await, 1);

    queue.ensure_fresh_tokens().await;

    assert_eq!(gateway.refresh_count(), 1);
    // The stale entry is gone; the backfill pulled the next pair.
    assert_eq!(queue.len().await, 1);
    assert_eq!(queue.current().await.unwrap().pair_key, "c:d");
}

// ---------------------------------------------------------------------------
// Session reset
// ---------------------------------------------------------------------------

/// `clear` empties everything and forgets the previous session's budget.
#[tokio::test]
async fn clear_resets_queue_and_budget() {
    let (queue, _gateway) = service(vec![pair("a", "b"), pair("c", "d")], 2);
    queue.ensure_preloaded(2).await;
    queue.set_remaining_votes(2).await;

    queue.clear().await;

    assert_eq!(queue.len().await, 0);
    assert!(queue.current().await.is_none());
    assert_eq!(queue.remaining_votes().await, None);
}

//! The global duel queue service.
//!
//! One [`DuelQueueService`] is created per app session; the handle is
//! cheap to clone into every screen that shows duels. All queue
//! mutations happen in synchronous sections between awaits, so the
//! state mutex is only ever held across pure list manipulation — never
//! across a network call.
//!
//! Concurrency guards:
//!
//! - Preload is *single-flight*: concurrent `ensure_preloaded` callers
//!   join one shared fill pass instead of issuing parallel fetch storms.
//! - `advance` / `get_or_load_first` spawn their backfill as a tracked
//!   background task and return as soon as a usable head exists.
//! - Refresh results are applied by pair key, so an entry popped while
//!   a refresh was in flight is simply not resurrected.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use pinduel_core::{is_token_fresh, DuelEntry};
use pinduel_gateway::{DuelGateway, FetchedDuel, ImagePrefetcher};

use crate::config::{QueueConfig, DEFAULT_TARGET_COUNT};

/// Outcome of one fill-loop attempt.
enum FetchStep {
    /// A usable pair was appended to the queue.
    Queued,
    /// The fetch succeeded but the pair was unusable or a duplicate;
    /// the attempt still counts against the budget.
    Discarded,
    /// The gateway failed, served nothing, or the vote budget is
    /// exhausted — the fill loop should stop.
    Unavailable,
}

/// Mutable queue state. Held behind one mutex; every critical section
/// is synchronous.
struct QueueState {
    /// FIFO of prefetched pairs — the head is "current".
    entries: VecDeque<DuelEntry>,
    /// Image URIs already warmed, so re-fills skip them.
    prefetched_uris: HashSet<String>,
    /// How many pairs to keep ready. Raised by `ensure_preloaded`,
    /// reset by `clear`.
    target_count: usize,
    /// Server-reported vote budget; `None` until first observed.
    remaining_votes: Option<u32>,
    /// Most recent fire-and-forget backfill task.
    backfill: Option<JoinHandle<()>>,
}

impl QueueState {
    /// Queue length ceiling: the target, capped by the vote budget when
    /// one is known.
    fn desired_size(&self) -> usize {
        match self.remaining_votes {
            Some(remaining) => self.target_count.min(remaining as usize),
            None => self.target_count,
        }
    }

    /// Drop entries from the tail until the queue fits `desired_size`.
    fn trim_to_desired(&mut self) {
        let desired = self.desired_size();
        while self.entries.len() > desired {
            if let Some(evicted) = self.entries.pop_back() {
                tracing::info!(pair_key = %evicted.pair_key, "Evicting queued duel over budget");
            }
        }
    }

    /// Adopt a server-reported budget and enforce the new ceiling.
    fn adopt_remaining(&mut self, remaining: u32) {
        self.remaining_votes = Some(remaining);
        self.trim_to_desired();
    }
}

/// Shared handle to the per-session global duel queue.
///
/// Clones share one underlying queue, so a single instance created at
/// sign-in behaves as the session singleton without module-level state.
pub struct DuelQueueService<G, P> {
    inner: Arc<QueueInner<G, P>>,
}

impl<G, P> Clone for DuelQueueService<G, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct QueueInner<G, P> {
    gateway: Arc<G>,
    prefetcher: Arc<P>,
    state: Mutex<QueueState>,
    /// Single-flight guard: the in-flight preload pass, if any.
    /// Concurrent callers clone and await the same shared future.
    inflight_preload: Mutex<Option<Shared<BoxFuture<'static, usize>>>>,
}

impl<G: DuelGateway, P: ImagePrefetcher> DuelQueueService<G, P> {
    /// Create a queue service with injected collaborators.
    pub fn new(gateway: Arc<G>, prefetcher: Arc<P>, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                gateway,
                prefetcher,
                state: Mutex::new(QueueState {
                    entries: VecDeque::new(),
                    prefetched_uris: HashSet::new(),
                    target_count: config.target_count,
                    remaining_votes: None,
                    backfill: None,
                }),
                inflight_preload: Mutex::new(None),
            }),
        }
    }

    /// Fill the queue up to `count` pairs (or the vote budget, whichever
    /// is smaller) and warm their images. Returns the resulting length.
    ///
    /// Raises the target to `max(target, count)`. If a preload pass is
    /// already running, joins it instead of starting another.
    pub async fn ensure_preloaded(&self, count: usize) -> usize {
        QueueInner::ensure_preloaded(Arc::clone(&self.inner), count).await
    }

    /// The head entry, or `None` when the queue is empty. Pure read.
    pub async fn current(&self) -> Option<DuelEntry> {
        self.inner.state.lock().await.entries.front().cloned()
    }

    /// Current queue length.
    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.entries.len()
    }

    /// Pop the head (its vote has been consumed) and return the new
    /// head. Spawns a background backfill toward `count` pairs and
    /// best-effort re-primes the new head's images; neither is awaited.
    pub async fn advance(&self, count: usize) -> Option<DuelEntry> {
        let new_head = {
            let mut state = self.inner.state.lock().await;
            state.entries.pop_front();
            state.entries.front().cloned()
        };

        QueueInner::spawn_backfill(Arc::clone(&self.inner), count, new_head.clone()).await;

        new_head
    }

    /// Return the current pair, loading one synchronously if the queue
    /// is empty.
    ///
    /// Fast path: a populated head is returned immediately with a
    /// background refill. A known budget of zero short-circuits to
    /// `None` without touching the gateway.
    pub async fn get_or_load_first(&self, count: usize) -> Option<DuelEntry> {
        {
            let state = self.inner.state.lock().await;
            if let Some(head) = state.entries.front() {
                let head = head.clone();
                drop(state);
                QueueInner::spawn_backfill(Arc::clone(&self.inner), count, None).await;
                return Some(head);
            }
            if state.remaining_votes == Some(0) {
                return None;
            }
        }

        self.inner.fetch_until_nonempty().await;
        QueueInner::spawn_backfill(Arc::clone(&self.inner), count, None).await;
        self.inner.state.lock().await.entries.front().cloned()
    }

    /// Full session reset (e.g. sign-out): empty the queue, forget
    /// every prefetched URI and the previous user's vote budget, and
    /// restore the default target size.
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;
        state.entries.clear();
        state.prefetched_uris.clear();
        state.target_count = DEFAULT_TARGET_COUNT;
        state.remaining_votes = None;
        tracing::info!("Duel queue cleared");
    }

    /// Record a server-reported vote budget and immediately trim the
    /// queue tail down to the new ceiling. A budget of zero makes every
    /// subsequent fetch attempt short-circuit without a gateway call.
    pub async fn set_remaining_votes(&self, remaining: u32) {
        let mut state = self.inner.state.lock().await;
        state.adopt_remaining(remaining);
        tracing::info!(remaining, queue_len = state.entries.len(), "Vote budget updated");
    }

    /// The last server-reported vote budget, if any has been observed.
    pub async fn remaining_votes(&self) -> Option<u32> {
        self.inner.state.lock().await.remaining_votes
    }

    /// Refresh-or-evict pass over every queued entry.
    ///
    /// Entries whose token is missing or no longer fresh are refreshed
    /// via the gateway (keyed by the pair's photo ids plus the old
    /// token); a failed or rejected refresh drops the entry instead.
    /// Backfills if anything was dropped, then re-warms images.
    pub async fn ensure_fresh_tokens(&self) {
        let snapshot: Vec<(String, [String; 2], Option<String>, Option<String>)> = {
            let state = self.inner.state.lock().await;
            state
                .entries
                .iter()
                .map(|e| {
                    (
                        e.pair_key.clone(),
                        e.photo_ids.clone(),
                        e.vote_token.clone(),
                        e.expires_at.clone(),
                    )
                })
                .collect()
        };

        let mut dropped = 0usize;
        for (key, photo_ids, token, expires_at) in snapshot {
            if token.is_some() && is_token_fresh(expires_at.as_deref()) {
                continue;
            }

            let old_token = token.unwrap_or_default();
            match self
                .inner
                .gateway
                .refresh_token(&photo_ids[0], &photo_ids[1], &old_token)
                .await
            {
                Ok(refreshed) if !refreshed.vote_token.is_empty() => {
                    let mut state = self.inner.state.lock().await;
                    // The entry may have been voted away while the
                    // refresh was in flight; only patch it if present.
                    if let Some(entry) = state.entries.iter_mut().find(|e| e.pair_key == key) {
                        entry.vote_token = Some(refreshed.vote_token);
                        entry.expires_at = refreshed.expires_at;
                        tracing::info!(pair_key = %key, "Vote token refreshed");
                    }
                }
                Ok(_) => {
                    tracing::warn!(pair_key = %key, "Refresh returned an empty token, evicting");
                    dropped += self.inner.evict(&key).await;
                }
                Err(e) => {
                    tracing::warn!(pair_key = %key, error = %e, "Token refresh failed, evicting");
                    dropped += self.inner.evict(&key).await;
                }
            }
        }

        if dropped > 0 {
            tracing::info!(dropped, "Backfilling after token evictions");
            let target = self.inner.state.lock().await.target_count;
            self.ensure_preloaded(target).await;
        } else {
            self.inner.prefetch_queue_images().await;
        }
    }

    /// Await the most recently spawned backfill task. Tests (and
    /// shutdown paths) use this to observe fire-and-forget refills.
    pub async fn wait_for_backfill(&self) {
        let handle = self.inner.state.lock().await.backfill.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl<G: DuelGateway, P: ImagePrefetcher> QueueInner<G, P> {
    /// Single-flight preload: join the in-flight pass or start one.
    async fn ensure_preloaded(inner: Arc<Self>, count: usize) -> usize {
        {
            let mut state = inner.state.lock().await;
            state.target_count = state.target_count.max(count);
        }

        let pass = {
            let mut slot = inner.inflight_preload.lock().await;
            match slot.as_ref() {
                Some(pass) => pass.clone(),
                None => {
                    let task_inner = Arc::clone(&inner);
                    let pass = async move {
                        let len = task_inner.fill_queue().await;
                        *task_inner.inflight_preload.lock().await = None;
                        len
                    }
                    .boxed()
                    .shared();
                    *slot = Some(pass.clone());
                    pass
                }
            }
        };

        pass.await
    }

    /// Spawn the fire-and-forget refill task, optionally re-priming a
    /// freshly promoted head first, and retain its handle.
    async fn spawn_backfill(inner: Arc<Self>, count: usize, new_head: Option<DuelEntry>) {
        let task_inner = Arc::clone(&inner);
        let handle = tokio::spawn(async move {
            if let Some(head) = new_head {
                for photo in &head.photos {
                    task_inner.prefetcher.prefetch(&photo.image_url).await;
                }
            }
            QueueInner::ensure_preloaded(task_inner, count).await;
        });
        inner.state.lock().await.backfill = Some(handle);
    }

    /// One fill pass: fetch until the queue reaches its desired size or
    /// the attempt budget (`target * 2`, counting duplicates and
    /// unusable pairs) runs out, then warm images for the whole queue.
    async fn fill_queue(&self) -> usize {
        let attempt_budget = {
            let state = self.state.lock().await;
            state.target_count * 2
        };

        let mut attempts = 0usize;
        loop {
            let wants_more = {
                let state = self.state.lock().await;
                state.remaining_votes != Some(0) && state.entries.len() < state.desired_size()
            };
            if !wants_more || attempts >= attempt_budget {
                break;
            }
            attempts += 1;

            match self.fetch_and_enqueue_once().await {
                FetchStep::Queued | FetchStep::Discarded => continue,
                FetchStep::Unavailable => break,
            }
        }

        self.prefetch_queue_images().await;
        self.state.lock().await.entries.len()
    }

    /// Bounded loop used by `get_or_load_first` when the queue is
    /// empty: stop as soon as one entry exists.
    async fn fetch_until_nonempty(&self) {
        let attempt_budget = {
            let state = self.state.lock().await;
            state.target_count * 2
        };

        let mut attempts = 0usize;
        while attempts < attempt_budget {
            {
                let state = self.state.lock().await;
                if !state.entries.is_empty() || state.remaining_votes == Some(0) {
                    break;
                }
            }
            attempts += 1;

            if let FetchStep::Unavailable = self.fetch_and_enqueue_once().await {
                break;
            }
        }
    }

    /// Fetch one pair from the gateway and try to enqueue it.
    ///
    /// All queue mutations happen after the await, in one synchronous
    /// section. The server-reported budget is adopted before the pair
    /// is considered, so a shrinking budget is enforced even when the
    /// pair itself is discarded.
    async fn fetch_and_enqueue_once(&self) -> FetchStep {
        {
            let state = self.state.lock().await;
            if state.remaining_votes == Some(0) {
                return FetchStep::Unavailable;
            }
        }

        let fetched = match self.gateway.fetch_duel().await {
            Ok(Some(duel)) => duel,
            Ok(None) => return FetchStep::Unavailable,
            Err(e) => {
                tracing::warn!(error = %e, "Duel fetch failed");
                return FetchStep::Unavailable;
            }
        };

        let mut state = self.state.lock().await;

        if let Some(remaining) = fetched.remaining_votes {
            state.adopt_remaining(remaining);
        }

        let Some(entry) = entry_from_fetched(fetched) else {
            return FetchStep::Discarded;
        };

        if state.entries.iter().any(|e| e.pair_key == entry.pair_key) {
            // The backend is not expected to reissue a pair that is
            // still outstanding on this client.
            tracing::warn!(pair_key = %entry.pair_key, "Server reissued an outstanding pair, skipping");
            return FetchStep::Discarded;
        }

        if state.entries.len() >= state.desired_size() {
            return FetchStep::Discarded;
        }

        state.entries.push_back(entry);
        FetchStep::Queued
    }

    /// Warm the image cache for every queued photo not yet prefetched.
    /// Failures are logged by the prefetcher and otherwise ignored.
    async fn prefetch_queue_images(&self) {
        let pending: Vec<String> = {
            let state = self.state.lock().await;
            state
                .entries
                .iter()
                .flat_map(|e| e.photos.iter().map(|p| p.image_url.clone()))
                .filter(|uri| !state.prefetched_uris.contains(uri))
                .collect()
        };
        if pending.is_empty() {
            return;
        }

        let results =
            futures::future::join_all(pending.iter().map(|uri| self.prefetcher.prefetch(uri)))
                .await;

        let mut state = self.state.lock().await;
        for (uri, cached) in pending.into_iter().zip(results) {
            if cached {
                state.prefetched_uris.insert(uri);
            }
        }
    }

    /// Remove the entry with the given pair key. Returns how many were
    /// removed (0 or 1).
    async fn evict(&self, key: &str) -> usize {
        let mut state = self.state.lock().await;
        let before = state.entries.len();
        state.entries.retain(|e| e.pair_key != key);
        before - state.entries.len()
    }
}

/// Validate a gateway payload into a queueable entry.
///
/// A pair with fewer than two photos or without a usable vote token is
/// discarded with a warning — never queued.
fn entry_from_fetched(fetched: FetchedDuel) -> Option<DuelEntry> {
    if fetched.photos.len() < 2 {
        tracing::warn!(
            photo_count = fetched.photos.len(),
            "Discarding duel without a full pair",
        );
        return None;
    }
    let token = match fetched.vote_token {
        Some(t) if !t.is_empty() => t,
        _ => {
            tracing::warn!("Discarding duel pair without a usable vote token");
            return None;
        }
    };

    let mut photos = fetched.photos.into_iter();
    let (first, second) = (photos.next()?, photos.next()?);

    let mut entry = DuelEntry::new([first, second], Some(token), fetched.expires_at);
    entry.bucket_type = fetched.bucket_type;
    entry.pin_prompt = fetched.pin_prompt;
    entry.pin_id = fetched.pin_id;
    Some(entry)
}

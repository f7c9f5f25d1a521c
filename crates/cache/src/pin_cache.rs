//! The two-tier pin challenge cache.
//!
//! Each namespace (photos-by-pin, meta-by-pin) keeps an in-memory map
//! of [`CacheRecord`]s fronting the durable store. Reads are
//! read-through: a durable hit that parses and validates populates the
//! memory tier. Writes update memory synchronously and persist
//! best-effort — a durable-write failure is logged and the in-memory
//! copy stays authoritative for the session.
//!
//! Records are overwritten, never deleted; the TTL governs reuse, not
//! retention.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use pinduel_core::PhotoRecord;

use crate::config::CacheConfig;
use crate::store::{DurableStore, FsStore};

/// Freshness window for both namespaces: 12 hours.
pub const PIN_CACHE_TTL_MS: i64 = 12 * 60 * 60 * 1000;

/// Durable-store key prefix for the photos namespace.
const PHOTOS_PREFIX: &str = "pin_photos";
/// Durable-store key prefix for the meta namespace.
const META_PREFIX: &str = "pin_meta";

/// A cached payload plus the instant it was fetched from the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord<T> {
    pub payload: T,
    pub fetched_at: DateTime<Utc>,
}

/// Result of a cache read.
///
/// `had_cache` and `is_fresh` are reported separately so callers can
/// distinguish "no data" from "stale data" and choose to render the
/// stale copy while a background refresh runs.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    pub value: Option<T>,
    pub had_cache: bool,
    pub is_fresh: bool,
}

impl<T> CacheRead<T> {
    fn miss() -> Self {
        Self {
            value: None,
            had_cache: false,
            is_fresh: false,
        }
    }

    fn hit(record: CacheRecord<T>, now: DateTime<Utc>, ttl_ms: i64) -> Self {
        let age_ms = now.signed_duration_since(record.fetched_at).num_milliseconds();
        Self {
            value: Some(record.payload),
            had_cache: true,
            is_fresh: age_ms <= ttl_ms,
        }
    }
}

/// Pin metadata as cached by the per-pin screens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinMeta {
    pub pin_id: String,
    pub prompt: String,
    pub photo_count: u32,
    pub duel_enabled: bool,
}

/// Two-tier cache over a durable store.
pub struct PinChallengeCache<S> {
    store: S,
    ttl_ms: i64,
    photos: Mutex<HashMap<String, CacheRecord<Vec<PhotoRecord>>>>,
    meta: Mutex<HashMap<String, CacheRecord<PinMeta>>>,
}

impl PinChallengeCache<FsStore> {
    /// Open a filesystem-backed cache from configuration.
    pub fn open(config: &CacheConfig) -> Self {
        Self::new(FsStore::new(config.cache_dir.clone()))
    }
}

impl<S: DurableStore> PinChallengeCache<S> {
    /// Create a cache over `store` with the standard 12h TTL.
    pub fn new(store: S) -> Self {
        Self::with_ttl(store, PIN_CACHE_TTL_MS)
    }

    /// Create a cache with an explicit TTL in milliseconds.
    pub fn with_ttl(store: S, ttl_ms: i64) -> Self {
        Self {
            store,
            ttl_ms,
            photos: Mutex::new(HashMap::new()),
            meta: Mutex::new(HashMap::new()),
        }
    }

    /// Read the cached photo list for a pin.
    pub async fn read_pin_photos(&self, pin_id: &str) -> CacheRead<Vec<PhotoRecord>> {
        self.read_namespace(&self.photos, PHOTOS_PREFIX, pin_id).await
    }

    /// Cache the photo list for a pin. `fetched_at` defaults to now;
    /// passing an explicit instant supports deterministic TTL tests.
    pub async fn write_pin_photos(
        &self,
        pin_id: &str,
        photos: Vec<PhotoRecord>,
        fetched_at: Option<DateTime<Utc>>,
    ) {
        self.write_namespace(&self.photos, PHOTOS_PREFIX, pin_id, photos, fetched_at)
            .await;
    }

    /// Read the cached metadata for a pin.
    pub async fn read_pin_meta(&self, pin_id: &str) -> CacheRead<PinMeta> {
        self.read_namespace(&self.meta, META_PREFIX, pin_id).await
    }

    /// Cache the metadata for a pin.
    pub async fn write_pin_meta(
        &self,
        pin_id: &str,
        meta: PinMeta,
        fetched_at: Option<DateTime<Utc>>,
    ) {
        self.write_namespace(&self.meta, META_PREFIX, pin_id, meta, fetched_at)
            .await;
    }

    // ---- private helpers ----

    fn durable_key(prefix: &str, pin_id: &str) -> String {
        format!("{prefix}:{pin_id}")
    }

    /// Memory tier first; on miss, read-through from the durable store.
    /// Corrupted or misshapen durable records degrade to a miss.
    async fn read_namespace<T>(
        &self,
        memory: &Mutex<HashMap<String, CacheRecord<T>>>,
        prefix: &str,
        pin_id: &str,
    ) -> CacheRead<T>
    where
        T: Clone + DeserializeOwned,
    {
        let now = Utc::now();

        if let Some(record) = memory.lock().await.get(pin_id).cloned() {
            return CacheRead::hit(record, now, self.ttl_ms);
        }

        let key = Self::durable_key(prefix, pin_id);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheRead::miss(),
            Err(e) => {
                tracing::warn!(pin_id, error = %e, "Durable cache read failed");
                return CacheRead::miss();
            }
        };

        // Typed parse doubles as the structural validation guard: a
        // record without the expected payload shape is a miss, not an
        // error.
        let record: CacheRecord<T> = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(pin_id, error = %e, "Discarding corrupt cache record");
                return CacheRead::miss();
            }
        };

        memory
            .lock()
            .await
            .insert(pin_id.to_string(), record.clone());
        CacheRead::hit(record, now, self.ttl_ms)
    }

    /// Memory tier synchronously, durable tier best-effort.
    async fn write_namespace<T>(
        &self,
        memory: &Mutex<HashMap<String, CacheRecord<T>>>,
        prefix: &str,
        pin_id: &str,
        payload: T,
        fetched_at: Option<DateTime<Utc>>,
    ) where
        T: Clone + Serialize,
    {
        let record = CacheRecord {
            payload,
            fetched_at: fetched_at.unwrap_or_else(Utc::now),
        };

        memory
            .lock()
            .await
            .insert(pin_id.to_string(), record.clone());

        let key = Self::durable_key(prefix, pin_id);
        match serde_json::to_string(&record) {
            Ok(serialized) => {
                if let Err(e) = self.store.set(&key, &serialized).await {
                    tracing::warn!(pin_id, error = %e, "Durable cache write failed");
                }
            }
            Err(e) => {
                tracing::warn!(pin_id, error = %e, "Cache record serialization failed");
            }
        }
    }
}

//! Client-side cache for per-pin challenge data.
//!
//! Two independent TTL'd namespaces — photos-by-pin and meta-by-pin —
//! layered as an in-memory map fronting a durable [`DurableStore`].
//! Reads report staleness instead of hiding it, so screens can show
//! stale data while refreshing in the background.

pub mod config;
pub mod pin_cache;
pub mod store;

pub use config::CacheConfig;
pub use pin_cache::{CacheRead, CacheRecord, PinChallengeCache, PinMeta, PIN_CACHE_TTL_MS};
pub use store::{DurableStore, FsStore, MemoryStore, StoreError};

//! Cache configuration loaded from environment variables.

use std::path::PathBuf;

/// Durable cache tier configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory the filesystem store persists records under
    /// (default: `.pinduel-cache`).
    pub cache_dir: PathBuf,
}

impl CacheConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default          |
    /// |---------------------|------------------|
    /// | `PINDUEL_CACHE_DIR` | `.pinduel-cache` |
    pub fn from_env() -> Self {
        let cache_dir = std::env::var("PINDUEL_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".pinduel-cache"));

        Self { cache_dir }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".pinduel-cache"),
        }
    }
}

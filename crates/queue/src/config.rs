//! Queue configuration loaded from environment variables.

/// Default number of duel pairs kept prefetched.
pub const DEFAULT_TARGET_COUNT: usize = 5;

/// Tunable parameters for the duel queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of pairs the queue tries to keep ready (default: `5`).
    /// `ensure_preloaded` can raise this at runtime; `clear` resets it.
    pub target_count: usize,
}

impl QueueConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default |
    /// |---------------------|---------|
    /// | `DUEL_TARGET_COUNT` | `5`     |
    pub fn from_env() -> Self {
        let target_count: usize = std::env::var("DUEL_TARGET_COUNT")
            .unwrap_or_else(|_| DEFAULT_TARGET_COUNT.to_string())
            .parse()
            .expect("DUEL_TARGET_COUNT must be a valid usize");

        Self { target_count }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            target_count: DEFAULT_TARGET_COUNT,
        }
    }
}

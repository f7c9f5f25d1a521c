//! Image prefetch collaborator.
//!
//! The queue warms the device image cache for every queued pair so the
//! next duel renders without a visible load. Prefetching is strictly
//! best-effort: [`ImagePrefetcher::prefetch`] reports success as a bool
//! and never errors.

use async_trait::async_trait;

/// Best-effort image cache warmer.
#[async_trait]
pub trait ImagePrefetcher: Send + Sync + 'static {
    /// Fetch `uri` into the local cache. Returns `true` when the image
    /// is cached afterwards; failures are logged internally.
    async fn prefetch(&self, uri: &str) -> bool;
}

/// [`ImagePrefetcher`] that issues a plain GET and discards the body.
///
/// Reuses the gateway's [`reqwest::Client`] so image fetches share the
/// connection pool.
pub struct HttpImagePrefetcher {
    client: reqwest::Client,
}

impl HttpImagePrefetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImagePrefetcher for HttpImagePrefetcher {
    async fn prefetch(&self, uri: &str) -> bool {
        match self.client.get(uri).send().await {
            Ok(response) if response.status().is_success() => {
                // Drain the body so the bytes actually land in any
                // intermediate HTTP cache.
                response.bytes().await.is_ok()
            }
            Ok(response) => {
                tracing::warn!(uri, status = response.status().as_u16(), "Image prefetch refused");
                false
            }
            Err(e) => {
                tracing::warn!(uri, error = %e, "Image prefetch failed");
                false
            }
        }
    }
}

//! Duel pair data model.
//!
//! A *duel* is a pairwise comparison of two photos presented to a user
//! for a single vote. [`DuelEntry`] is one queued duel together with the
//! server-issued credential authorizing a vote on it.

use serde::{Deserialize, Serialize};

/// One competing photo as served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    /// Server-assigned photo identifier.
    pub id: String,
    /// Publicly fetchable image URL.
    pub image_url: String,
    /// Current Elo-style rating.
    pub rating: f64,
    /// Number of duels this photo has won.
    pub wins: u32,
    /// Number of duels this photo has lost.
    pub losses: u32,
    /// Handle of the uploading user.
    pub uploader_handle: String,
}

/// One queued duel: a photo pair plus the vote credential issued for it.
///
/// The entry is mutated in place only to replace `vote_token` /
/// `expires_at` on refresh; everything else is immutable after the
/// gateway fetch that created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuelEntry {
    /// The two competing photos, in server-issued order.
    pub photos: [PhotoRecord; 2],
    /// The two photo ids, order-preserving (used for refresh calls).
    pub photo_ids: [String; 2],
    /// Canonical order-independent identity, see [`pair_key`].
    pub pair_key: String,
    /// Opaque credential proving this pair was issued by the server.
    pub vote_token: Option<String>,
    /// RFC 3339 instant after which `vote_token` must not be used.
    pub expires_at: Option<String>,
    /// Bucket this pair was drawn from (e.g. `"global"`), passed through.
    pub bucket_type: Option<String>,
    /// Prompt of the originating pin, when the pair is pin-scoped.
    pub pin_prompt: Option<String>,
    /// Originating pin id, when the pair is pin-scoped.
    pub pin_id: Option<String>,
}

impl DuelEntry {
    /// Build an entry from two photos and the credential that came with
    /// them. Computes `photo_ids` and `pair_key` from the photos.
    pub fn new(
        photos: [PhotoRecord; 2],
        vote_token: Option<String>,
        expires_at: Option<String>,
    ) -> Self {
        let photo_ids = [photos[0].id.clone(), photos[1].id.clone()];
        let key = pair_key(&photo_ids[0], &photo_ids[1]);
        Self {
            photos,
            photo_ids,
            pair_key: key,
            vote_token,
            expires_at,
            bucket_type: None,
            pin_prompt: None,
            pin_id: None,
        }
    }
}

/// Canonical dedup key for a photo pair: the two ids sorted
/// lexicographically and joined with `:`.
///
/// Order-independent — `pair_key(a, b) == pair_key(b, a)` — so two
/// entries holding the same unordered pair always collide.
pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

//! The [`DuelGateway`] trait and its data contracts.
//!
//! The queue never talks HTTP directly; it consumes this trait so tests
//! can script gateway behavior. [`HttpDuelGateway`](crate::http) is the
//! production implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use pinduel_core::PhotoRecord;

/// Error code reported when a vote is attempted with no token at hand.
pub const ERR_MISSING_VOTE_TOKEN: &str = "missing_vote_token";

/// Error code the backend uses for rejected/expired vote tokens.
pub const ERR_INVALID_VOTE_TOKEN: &str = "invalid_vote_token";

/// A duel pair as returned by the backend, before queue validation.
///
/// `photos` may hold fewer than two records and `vote_token` may be
/// absent; the queue decides whether the pair is usable.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedDuel {
    #[serde(default)]
    pub photos: Vec<PhotoRecord>,
    #[serde(default)]
    pub vote_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    /// Server-reported budget of duels still available to this session.
    #[serde(default)]
    pub remaining_votes: Option<u32>,
    #[serde(default)]
    pub bucket_type: Option<String>,
    #[serde(default)]
    pub pin_prompt: Option<String>,
    #[serde(default)]
    pub pin_id: Option<String>,
}

/// Replacement credential issued for an already-outstanding pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedToken {
    pub vote_token: String,
    pub expires_at: Option<String>,
}

/// A vote to submit: winner, loser, and the credential for the pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub winner_id: String,
    pub loser_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_token: Option<String>,
}

/// Outcome of a vote submission. Never an `Err` — callers branch on the
/// fields and render a message uniformly.
#[derive(Debug, Clone)]
pub struct VoteOutcome {
    pub success: bool,
    /// Machine-readable error code when `success` is false.
    pub error: Option<String>,
    /// True when the failure was specifically a rejected/missing token,
    /// as opposed to a generic network failure. Callers should advance
    /// or refresh the pair rather than resubmit blindly.
    pub invalid_vote_token: bool,
}

impl VoteOutcome {
    /// Successful vote.
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            invalid_vote_token: false,
        }
    }

    /// Failed vote with a machine-readable code.
    pub fn failed(error: impl Into<String>, invalid_vote_token: bool) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            invalid_vote_token,
        }
    }
}

/// Errors from the gateway HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("duel API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// Network seam for duel traffic.
///
/// `fetch_duel` resolves to `Ok(None)` when the backend has no pair to
/// serve; the queue treats that as "stop filling", not an error.
#[async_trait]
pub trait DuelGateway: Send + Sync + 'static {
    /// Request the next global duel pair for this session.
    async fn fetch_duel(&self) -> Result<Option<FetchedDuel>, GatewayError>;

    /// Exchange an aging token for a fresh one, keyed by the pair's two
    /// photo ids plus the old token.
    async fn refresh_token(
        &self,
        photo_a: &str,
        photo_b: &str,
        old_token: &str,
    ) -> Result<RefreshedToken, GatewayError>;

    /// Submit a vote. Infallible at the type level: all failure modes
    /// collapse into the [`VoteOutcome`] fields.
    async fn submit_vote(&self, vote: VoteRequest) -> VoteOutcome;
}

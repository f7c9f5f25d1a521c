//! REST client for the duel backend endpoints.
//!
//! Wraps the duel HTTP API (pair fetch, token refresh, vote submission)
//! using [`reqwest`]. Vote submission never surfaces transport errors:
//! every failure mode is folded into a [`VoteOutcome`] so calling UI
//! code renders failures uniformly.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GatewayConfig;
use crate::duel::{
    DuelGateway, FetchedDuel, GatewayError, RefreshedToken, VoteOutcome, VoteRequest,
    ERR_INVALID_VOTE_TOKEN, ERR_MISSING_VOTE_TOKEN,
};

/// HTTP client for the duel backend.
pub struct HttpDuelGateway {
    client: reqwest::Client,
    base_url: String,
    /// Bearer token attached to every request, when signed in.
    session_token: Option<String>,
}

/// Wire shape of the vote endpoint's 2xx response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteResponseBody {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    invalid_vote_token: bool,
}

/// Wire shape of a non-2xx error body, when it is JSON at all.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

impl HttpDuelGateway {
    /// Create a gateway from configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.api_base_url,
            session_token: None,
        }
    }

    /// Create a gateway reusing an existing [`reqwest::Client`] (useful
    /// for connection pooling with the image prefetcher).
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self {
            client,
            base_url,
            session_token: None,
        }
    }

    /// Attach the signed-in user's session token to subsequent requests.
    pub fn set_session_token(&mut self, token: Option<String>) {
        self.session_token = token;
    }

    // ---- private helpers ----

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`GatewayError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Fold a non-2xx vote response into an outcome.
///
/// HTTP 401/403, or a JSON body carrying the `invalid_vote_token` error
/// code, classify as a rejected token; everything else is a generic
/// server failure.
fn vote_outcome_from_error(status: u16, body: &str) -> VoteOutcome {
    let code = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error);

    let invalid = matches!(status, 401 | 403) || code.as_deref() == Some(ERR_INVALID_VOTE_TOKEN);

    if invalid {
        VoteOutcome::failed(ERR_INVALID_VOTE_TOKEN, true)
    } else {
        VoteOutcome::failed(code.unwrap_or_else(|| "server_error".to_string()), false)
    }
}

#[async_trait]
impl DuelGateway for HttpDuelGateway {
    /// `GET /duels/global/next`. A `204 No Content` means the backend
    /// has no pair to serve right now.
    async fn fetch_duel(&self) -> Result<Option<FetchedDuel>, GatewayError> {
        let response = self
            .request(self.client.get(format!("{}/duels/global/next", self.base_url)))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let duel: FetchedDuel = Self::parse_response(response).await?;
        Ok(Some(duel))
    }

    /// `POST /duels/token/refresh` keyed by the pair's photo ids.
    async fn refresh_token(
        &self,
        photo_a: &str,
        photo_b: &str,
        old_token: &str,
    ) -> Result<RefreshedToken, GatewayError> {
        let body = serde_json::json!({
            "photoAId": photo_a,
            "photoBId": photo_b,
            "voteToken": old_token,
        });

        let response = self
            .request(
                self.client
                    .post(format!("{}/duels/token/refresh", self.base_url)),
            )
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /duels/vote`. Missing tokens short-circuit without a
    /// network call; transport and server failures collapse into the
    /// outcome fields.
    async fn submit_vote(&self, vote: VoteRequest) -> VoteOutcome {
        if vote.vote_token.as_deref().map_or(true, |t| t.is_empty()) {
            tracing::warn!(
                winner_id = %vote.winner_id,
                "Vote submitted without a token, short-circuiting",
            );
            return VoteOutcome::failed(ERR_MISSING_VOTE_TOKEN, true);
        }

        let response = self
            .request(self.client.post(format!("{}/duels/vote", self.base_url)))
            .json(&vote)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Vote submission request failed");
                return VoteOutcome::failed("network_error", false);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Vote rejected by backend");
            return vote_outcome_from_error(status.as_u16(), &body);
        }

        match response.json::<VoteResponseBody>().await {
            Ok(body) if body.success => VoteOutcome::ok(),
            Ok(body) => VoteOutcome::failed(
                body.error.unwrap_or_else(|| "server_error".to_string()),
                body.invalid_vote_token,
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Unparsable vote response body");
                VoteOutcome::failed("malformed_response", false)
            }
        }
    }
}

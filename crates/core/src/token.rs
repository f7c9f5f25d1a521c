//! Vote-token freshness policy.
//!
//! A vote token is only usable while `expires_at - now` exceeds a safety
//! buffer that absorbs in-flight request latency. This predicate is the
//! single source of truth consulted both before submitting a vote and
//! when deciding whether a queued entry needs a token refresh.

use chrono::{DateTime, Utc};

/// Margin subtracted from the token's lifetime so a vote submitted just
/// before expiry still lands on a valid token server-side.
pub const SAFETY_BUFFER_MS: i64 = 15_000;

/// True iff `expires_at` parses as RFC 3339 and lies more than
/// [`SAFETY_BUFFER_MS`] in the future.
///
/// `None` and unparsable timestamps are never fresh.
pub fn is_token_fresh(expires_at: Option<&str>) -> bool {
    is_token_fresh_at(expires_at, Utc::now())
}

/// [`is_token_fresh`] against an explicit `now`, for deterministic tests.
pub fn is_token_fresh_at(expires_at: Option<&str>, now: DateTime<Utc>) -> bool {
    let Some(raw) = expires_at else {
        return false;
    };
    match DateTime::parse_from_rfc3339(raw) {
        Ok(expiry) => {
            let remaining_ms = expiry
                .with_timezone(&Utc)
                .signed_duration_since(now)
                .num_milliseconds();
            remaining_ms > SAFETY_BUFFER_MS
        }
        Err(_) => false,
    }
}

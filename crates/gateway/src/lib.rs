//! Duel fetch gateway: the network seam of the duel subsystem.
//!
//! Provides the [`DuelGateway`] trait consumed by the queue, its
//! [`reqwest`]-backed HTTP implementation, the typed vote-submission
//! path (including invalid-token classification), and the
//! [`ImagePrefetcher`] collaborator used to warm the device image cache
//! ahead of display.

pub mod config;
pub mod duel;
pub mod http;
pub mod prefetch;

pub use config::GatewayConfig;
pub use duel::{DuelGateway, FetchedDuel, GatewayError, RefreshedToken, VoteOutcome, VoteRequest};
pub use http::HttpDuelGateway;
pub use prefetch::{HttpImagePrefetcher, ImagePrefetcher};

//! Global duel queue: bounded prefetch, dedup, and token lifecycle.
//!
//! [`DuelQueueService`] maintains an ordered queue of prefetched,
//! deduplicated duel pairs with live vote tokens. Screens ask it for
//! the current pair, advance it after each vote, and it refills itself
//! from the [`DuelGateway`](pinduel_gateway::DuelGateway) in the
//! background while enforcing the server-reported remaining-vote
//! budget.

pub mod config;
pub mod service;

pub use config::QueueConfig;
pub use service::DuelQueueService;

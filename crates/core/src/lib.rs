//! Shared domain types for the Pinduel duel subsystem.
//!
//! This crate holds the data model common to the queue, gateway, and
//! cache crates:
//!
//! - [`PhotoRecord`] / [`DuelEntry`] — the photo pair served for a vote.
//! - [`pair_key`] — order-independent identity for a duel pair.
//! - [`token`] — the vote-token freshness policy shared by the queue
//!   and the vote submission path.

pub mod token;
pub mod types;

pub use token::{is_token_fresh, is_token_fresh_at, SAFETY_BUFFER_MS};
pub use types::{pair_key, DuelEntry, PhotoRecord};

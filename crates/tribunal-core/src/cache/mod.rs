//! Response cache in front of judge evaluation.
//!
//! - `memory.rs`: bounded in-process store (capacity + optional TTL)
//! - `flight.rs`: per-key single-flight so concurrent evaluations of one
//!   fingerprint reach the judge at most once

pub mod flight;
pub mod memory;

pub use flight::{Claim, FlightFollower, FlightLeader, SingleFlight};
pub use memory::InMemoryScoreCache;

use crate::model::CandidateScore;
use std::sync::Arc;

/// Published entries are immutable; callers share them through `Arc`.
pub trait ScoreCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<CandidateScore>>;

    /// Inserts `score` unless the key is already present and returns the
    /// entry that is published for `key` afterwards.
    fn put_if_absent(&self, key: &str, score: CandidateScore) -> Arc<CandidateScore>;

    /// Drops the entry so the next evaluation recomputes it wholesale.
    fn invalidate(&self, key: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

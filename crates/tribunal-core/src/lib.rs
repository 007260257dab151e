pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fingerprint;
pub mod judge;
pub mod model;
pub mod providers;
pub mod scoring;
pub mod tokens;

pub use errors::{TribunalError, UnavailableReason};
pub use model::{
    CandidateOutcome, CandidateResponse, CandidateScore, CandidateText, EvaluationRequest, Reward,
    ScoreBreakdown,
};

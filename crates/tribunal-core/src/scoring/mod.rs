//! Pure score and reward arithmetic plus the stateful roll-up aggregator.

pub mod calculator;
pub mod reward;

pub use calculator::{breakdown_score, overall_score, overall_score_from_value, round2, speed_score};
pub use reward::{
    distribution_weights, reward, select_top_contributors, DistributionWeight, ResourceLog,
    RewardAggregator, RewardSettings, RollUp,
};

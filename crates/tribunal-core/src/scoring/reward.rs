use super::calculator::round2;
use crate::model::Reward;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// `round(100 * (0.6 * mean(scores)/100 + 0.4 * min(contribution/10, 1)), 2)`.
///
/// An empty history averages to 0. The result is clamped to `[0, 100]`.
pub fn reward(scores: &[f64], resource_contribution: f64) -> f64 {
    let avg = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    let score_weight = (avg / 100.0).clamp(0.0, 1.0);
    let resource_weight = if resource_contribution.is_nan() {
        0.0
    } else {
        (resource_contribution / 10.0).clamp(0.0, 1.0)
    };
    let value = round2(100.0 * (0.6 * score_weight + 0.4 * resource_weight));
    tracing::debug!(avg, resource_contribution, value, "reward computed");
    value
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLog {
    pub api_calls: u64,
    pub compute_hours: f64,
}

/// Highest `compute_hours` first; ties keep their input order.
pub fn select_top_contributors(log: &[(String, ResourceLog)], k: usize) -> Vec<String> {
    let mut ranked: Vec<&(String, ResourceLog)> = log.iter().collect();
    ranked.sort_by(|a, b| b.1.compute_hours.total_cmp(&a.1.compute_hours));
    ranked.into_iter().take(k).map(|(id, _)| id.clone()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionWeight {
    pub candidate_id: String,
    pub weight: f64,
}

/// Normalizes the positive rewards among the `limit` highest into weights
/// that sum to 1. A zero total falls back to 1.0 as the divisor.
pub fn distribution_weights(rewards: &[Reward], limit: usize) -> Vec<DistributionWeight> {
    let mut top: Vec<&Reward> = rewards.iter().collect();
    top.sort_by(|a, b| b.reward_value.total_cmp(&a.reward_value));
    top.truncate(limit);

    let total: f64 = top
        .iter()
        .map(|r| r.reward_value)
        .filter(|v| *v > 0.0)
        .sum();
    let total = if total > 0.0 { total } else { 1.0 };

    top.into_iter()
        .filter(|r| r.reward_value > 0.0)
        .map(|r| DistributionWeight {
            candidate_id: r.candidate_id.clone(),
            weight: r.reward_value / total,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardSettings {
    /// Evaluation cycles between roll-ups.
    pub rollup_every: u64,
    pub top_k: usize,
    pub compute_hours_per_call: f64,
    pub top_contributor_bonus_hours: f64,
    pub distribution_limit: usize,
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self {
            rollup_every: 100,
            top_k: 10,
            compute_hours_per_call: 0.1,
            top_contributor_bonus_hours: 0.5,
            distribution_limit: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollUp {
    /// Ordinal of the roll-up, starting at 1.
    pub cycle: u64,
    pub rewards: Vec<Reward>,
    pub top_contributors: Vec<String>,
    pub weights: Vec<DistributionWeight>,
}

#[derive(Debug, Default)]
struct CandidateLedger {
    candidate_id: String,
    scores: Vec<f64>,
    resources: ResourceLog,
}

#[derive(Debug, Default)]
struct LedgerState {
    // Insertion order matters for tie-breaking.
    ledger: Vec<CandidateLedger>,
    index: HashMap<String, usize>,
    cycles: u64,
    rollups: u64,
}

impl LedgerState {
    fn entry(&mut self, candidate_id: &str) -> &mut CandidateLedger {
        let idx = match self.index.get(candidate_id) {
            Some(&i) => i,
            None => {
                self.ledger.push(CandidateLedger {
                    candidate_id: candidate_id.to_string(),
                    ..Default::default()
                });
                let i = self.ledger.len() - 1;
                self.index.insert(candidate_id.to_string(), i);
                i
            }
        };
        &mut self.ledger[idx]
    }
}

/// Owns score history and resource logs between roll-ups.
///
/// Histories are append-only until a roll-up, which computes rewards and
/// clears everything for the next cycle.
#[derive(Debug, Default)]
pub struct RewardAggregator {
    settings: RewardSettings,
    state: Mutex<LedgerState>,
}

impl RewardAggregator {
    pub fn new(settings: RewardSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn settings(&self) -> &RewardSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_score(&self, candidate_id: &str, score: f64) {
        self.lock().entry(candidate_id).scores.push(score);
    }

    /// One judge evaluation charged to `candidate_id`.
    pub fn record_call(&self, candidate_id: &str) {
        let per_call = self.settings.compute_hours_per_call;
        let mut state = self.lock();
        let r = &mut state.entry(candidate_id).resources;
        r.api_calls += 1;
        r.compute_hours += per_call;
    }

    pub fn resources(&self, candidate_id: &str) -> Option<ResourceLog> {
        let state = self.lock();
        state
            .index
            .get(candidate_id)
            .map(|&i| state.ledger[i].resources)
    }

    pub fn scores(&self, candidate_id: &str) -> Vec<f64> {
        let state = self.lock();
        state
            .index
            .get(candidate_id)
            .map(|&i| state.ledger[i].scores.clone())
            .unwrap_or_default()
    }

    pub fn tracked(&self) -> usize {
        self.lock().ledger.len()
    }

    pub fn cycles(&self) -> u64 {
        self.lock().cycles
    }

    /// Counts one evaluation cycle and rolls up every `rollup_every` cycles.
    pub fn complete_cycle(&self) -> Option<RollUp> {
        let mut state = self.lock();
        state.cycles += 1;
        let every = self.settings.rollup_every.max(1);
        if state.cycles % every == 0 {
            Some(self.roll_up_locked(&mut state))
        } else {
            None
        }
    }

    /// Rolls up immediately regardless of the cycle count.
    pub fn roll_up(&self) -> RollUp {
        let mut state = self.lock();
        self.roll_up_locked(&mut state)
    }

    fn roll_up_locked(&self, state: &mut LedgerState) -> RollUp {
        let log: Vec<(String, ResourceLog)> = state
            .ledger
            .iter()
            .map(|l| (l.candidate_id.clone(), l.resources))
            .collect();
        let top_contributors = select_top_contributors(&log, self.settings.top_k);
        for id in &top_contributors {
            state.entry(id).resources.compute_hours += self.settings.top_contributor_bonus_hours;
        }

        let rewards: Vec<Reward> = state
            .ledger
            .iter()
            .map(|l| {
                let aggregated = if l.scores.is_empty() {
                    0.0
                } else {
                    round2(l.scores.iter().sum::<f64>() / l.scores.len() as f64)
                };
                Reward {
                    candidate_id: l.candidate_id.clone(),
                    aggregated_score: aggregated,
                    resource_contribution: l.resources.compute_hours,
                    reward_value: reward(&l.scores, l.resources.compute_hours),
                }
            })
            .collect();
        let weights = distribution_weights(&rewards, self.settings.distribution_limit);

        state.rollups += 1;
        let cycle = state.rollups;
        state.ledger.clear();
        state.index.clear();

        tracing::info!(
            cycle,
            candidates = rewards.len(),
            top = top_contributors.len(),
            "reward roll-up complete, ledger reset"
        );

        RollUp {
            cycle,
            rewards,
            top_contributors,
            weights,
        }
    }
}

use crate::cache::{Claim, FlightFollower, FlightLeader, InMemoryScoreCache, ScoreCache, SingleFlight};
use crate::config::TribunalConfig;
use crate::errors::UnavailableReason;
use crate::fingerprint;
use crate::judge::batch::ID_SEPARATOR;
use crate::judge::{BatchBuilder, BatchOutcome, JudgeDispatcher, JudgeInvoker};
use crate::model::{
    clamp_user_rating, CandidateOutcome, CandidateResponse, CandidateScore, CandidateText,
    EvaluationRequest, ScoreBreakdown, UnscorableReason,
};
use crate::scoring::{overall_score, overall_score_from_value, RewardAggregator, RollUp};
use crate::tokens::accountant_for;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub request_id: String,
    /// One outcome per input candidate, in input order.
    pub outcomes: Vec<CandidateOutcome>,
    /// Judge batches dispatched for this evaluation.
    pub batches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollup: Option<RollUp>,
}

impl EvaluationReport {
    pub fn scored(&self) -> impl Iterator<Item = &CandidateScore> {
        self.outcomes.iter().filter_map(CandidateOutcome::score)
    }
}

struct Pending {
    idx: usize,
    fingerprint: String,
    leader: Option<FlightLeader>,
}

/// Runs one evaluation end to end: cache lookup, batching, judge dispatch,
/// scoring, publication, and reward bookkeeping.
pub struct Evaluator {
    builder: BatchBuilder,
    dispatcher: JudgeDispatcher,
    judge_model: String,
    cache: Arc<dyn ScoreCache>,
    flights: Arc<SingleFlight>,
    aggregator: Option<Arc<RewardAggregator>>,
}

impl Evaluator {
    pub fn new(
        builder: BatchBuilder,
        dispatcher: JudgeDispatcher,
        judge_model: impl Into<String>,
        cache: Arc<dyn ScoreCache>,
    ) -> Self {
        Self {
            builder,
            dispatcher,
            judge_model: judge_model.into(),
            cache,
            flights: SingleFlight::new(),
            aggregator: None,
        }
    }

    pub fn with_aggregator(mut self, aggregator: Arc<RewardAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn from_config(cfg: &TribunalConfig, invoker: Arc<dyn JudgeInvoker>) -> anyhow::Result<Self> {
        let accountant = accountant_for(cfg.batching.tokenizer)?;
        let builder = BatchBuilder::new(accountant, cfg.batching.limits());
        let dispatcher = JudgeDispatcher::new(invoker, cfg.judge.dispatch_settings());
        let cache = Arc::new(InMemoryScoreCache::new(
            Some(cfg.cache.capacity),
            cfg.cache.ttl(),
        ));
        Ok(Self::new(builder, dispatcher, cfg.judge.model.clone(), cache)
            .with_aggregator(Arc::new(RewardAggregator::new(cfg.reward))))
    }

    pub fn cache(&self) -> &Arc<dyn ScoreCache> {
        &self.cache
    }

    pub fn dispatcher(&self) -> &JudgeDispatcher {
        &self.dispatcher
    }

    pub fn aggregator(&self) -> Option<&Arc<RewardAggregator>> {
        self.aggregator.as_ref()
    }

    /// Cache key of `text` in the context of `request`.
    pub fn fingerprint(&self, request: &EvaluationRequest, text: &str) -> String {
        let context = fingerprint::evaluation_context(
            &request.prompt,
            &request.base_response,
            &self.judge_model,
            self.builder.accountant().name(),
            self.builder.limits().max_tokens_per_candidate,
        );
        fingerprint::compute(text, &context).hex
    }

    pub async fn evaluate(&self, request: &EvaluationRequest) -> anyhow::Result<EvaluationReport> {
        let n = request.candidates.len();
        let mut slots: Vec<Option<CandidateOutcome>> = vec![None; n];
        let mut pending: Vec<Pending> = Vec::new();
        let mut followers: Vec<(usize, FlightFollower)> = Vec::new();

        for (idx, cand) in request.candidates.iter().enumerate() {
            let text = match &cand.text {
                CandidateText::Text(t) if !t.is_empty() => t,
                CandidateText::Text(_) | CandidateText::Absent => {
                    slots[idx] = Some(unscorable(cand, UnscorableReason::Empty));
                    continue;
                }
                CandidateText::Malformed(_) => {
                    tracing::warn!(
                        request_id = %request.request_id,
                        candidate_id = %cand.candidate_id,
                        payload = cand.text.kind(),
                        "candidate payload is not text, marking unscorable"
                    );
                    slots[idx] = Some(unscorable(cand, UnscorableReason::Malformed));
                    continue;
                }
            };
            if cand.candidate_id.contains(ID_SEPARATOR) {
                tracing::warn!(
                    request_id = %request.request_id,
                    candidate_id = %cand.candidate_id,
                    "candidate id contains '{}', marking unscorable",
                    ID_SEPARATOR
                );
                slots[idx] = Some(unscorable(cand, UnscorableReason::InvalidId));
                continue;
            }

            let key = self.fingerprint(request, text);
            if let Some(hit) = self.cache.get(&key) {
                slots[idx] = Some(cached(&hit, cand));
                continue;
            }
            match self.flights.claim(&key) {
                Claim::Leader(leader) => {
                    // Another evaluation may have published between lookup and claim.
                    if let Some(hit) = self.cache.get(&key) {
                        slots[idx] = Some(cached(&hit, cand));
                        leader.complete(hit);
                        continue;
                    }
                    pending.push(Pending {
                        idx,
                        fingerprint: key,
                        leader: Some(leader),
                    });
                }
                Claim::Follower(f) => followers.push((idx, f)),
            }
        }

        let cache_hits = slots
            .iter()
            .filter(|s| s.as_ref().is_some_and(CandidateOutcome::is_cached))
            .count();

        let mut batch_count = 0;
        if !pending.is_empty() {
            let sub_request = EvaluationRequest::new(
                request.request_id.clone(),
                request.prompt.clone(),
                request.base_response.clone(),
                pending
                    .iter()
                    .map(|p| request.candidates[p.idx].clone())
                    .collect(),
            );
            let plan = self.builder.build(&sub_request);
            batch_count = plan.batches.len();
            let outcomes = self.dispatcher.dispatch(plan.batches.clone()).await;

            let mut by_id: HashMap<&str, VecDeque<usize>> = HashMap::new();
            for (pi, p) in pending.iter().enumerate() {
                by_id
                    .entry(request.candidates[p.idx].candidate_id.as_str())
                    .or_default()
                    .push_back(pi);
            }

            for (batch, outcome) in plan.batches.iter().zip(outcomes) {
                for judge_req in &batch.requests {
                    for (pos, cid) in judge_req.ordered_candidate_ids.iter().enumerate() {
                        let Some(pi) = by_id.get_mut(cid.as_str()).and_then(VecDeque::pop_front)
                        else {
                            tracing::error!(candidate_id = %cid, "judge request references unknown candidate");
                            continue;
                        };
                        let p = &mut pending[pi];
                        let cand = &request.candidates[p.idx];
                        let result = self.score_from_outcome(&outcome, &judge_req.custom_id, pos, cand);
                        if let Some(agg) = &self.aggregator {
                            agg.record_call(&cand.candidate_id);
                        }
                        slots[p.idx] = Some(match result {
                            Ok(score) => {
                                let published = self.cache.put_if_absent(&p.fingerprint, score);
                                if let Some(leader) = p.leader.take() {
                                    leader.complete(published.clone());
                                }
                                if let Some(agg) = &self.aggregator {
                                    agg.record_score(&cand.candidate_id, published.overall_score);
                                }
                                CandidateOutcome::Scored {
                                    score: relabel(&published, &cand.candidate_id),
                                    cached: false,
                                }
                            }
                            Err(reason) => CandidateOutcome::Unavailable {
                                candidate_id: cand.candidate_id.clone(),
                                reason,
                            },
                        });
                    }
                }
                self.dispatcher.correlation().remove(&batch.batch_id);
            }
        }
        // Any leader still held here failed; dropping it releases its followers.
        drop(pending);

        for (idx, follower) in followers {
            let cand = &request.candidates[idx];
            slots[idx] = Some(match follower.wait().await {
                Some(score) => cached(&score, cand),
                None => CandidateOutcome::Unavailable {
                    candidate_id: cand.candidate_id.clone(),
                    reason: UnavailableReason::LeaderFailed,
                },
            });
        }

        let outcomes: Vec<CandidateOutcome> = slots
            .into_iter()
            .zip(&request.candidates)
            .map(|(slot, cand)| {
                slot.unwrap_or_else(|| CandidateOutcome::Unavailable {
                    candidate_id: cand.candidate_id.clone(),
                    reason: UnavailableReason::Malformed("candidate missing from judge plan".into()),
                })
            })
            .collect();

        let rollup = self.aggregator.as_ref().and_then(|a| a.complete_cycle());

        tracing::info!(
            request_id = %request.request_id,
            candidates = n,
            cache_hits,
            batches = batch_count,
            scored = outcomes.iter().filter(|o| o.score().is_some()).count(),
            "evaluation finished"
        );

        Ok(EvaluationReport {
            request_id: request.request_id.clone(),
            outcomes,
            batches: batch_count,
            rollup,
        })
    }

    fn score_from_outcome(
        &self,
        outcome: &BatchOutcome,
        custom_id: &str,
        pos: usize,
        cand: &CandidateResponse,
    ) -> Result<CandidateScore, UnavailableReason> {
        let result = outcome.result.as_ref().map_err(Clone::clone)?;
        let verdict = match result.verdicts.get(custom_id) {
            None => {
                return Err(UnavailableReason::Malformed(format!(
                    "no output line for {}",
                    custom_id
                )))
            }
            Some(Err(e)) => return Err(UnavailableReason::Malformed(e.clone())),
            Some(Ok(v)) => v,
        };
        let judge_score = verdict.score_at(pos).ok_or_else(|| {
            UnavailableReason::Malformed(format!("no judge score at position {} of {}", pos, custom_id))
        })?;

        let process_time = cand
            .process_time
            .unwrap_or_else(|| outcome.elapsed.as_secs_f64())
            .max(0.0);
        let user_rating = cand.user_rating.map(clamp_user_rating).unwrap_or(0.0);
        let overall = match &verdict.breakdowns {
            Some(_) => overall_score_from_value(verdict.breakdown_at(pos), process_time, user_rating),
            None => overall_score(
                &ScoreBreakdown::from_judge_score(judge_score),
                process_time,
                user_rating,
            ),
        };
        Ok(CandidateScore {
            candidate_id: cand.candidate_id.clone(),
            overall_score: overall,
            process_time,
            user_rating,
        })
    }
}

fn unscorable(cand: &CandidateResponse, reason: UnscorableReason) -> CandidateOutcome {
    CandidateOutcome::Unscorable {
        candidate_id: cand.candidate_id.clone(),
        reason,
    }
}

fn relabel(score: &CandidateScore, candidate_id: &str) -> CandidateScore {
    CandidateScore {
        candidate_id: candidate_id.to_string(),
        ..score.clone()
    }
}

fn cached(score: &CandidateScore, cand: &CandidateResponse) -> CandidateOutcome {
    CandidateOutcome::Scored {
        score: relabel(score, &cand.candidate_id),
        cached: true,
    }
}

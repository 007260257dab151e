//! Packs candidates into capacity-bounded judge submissions.
//!
//! Single pass, greedy, order preserving. Two budgets apply at once: the
//! token total of one request and the number of requests in one batch.
//! Output is a pure function of the input; no concurrency here.

use super::prompt::render_judge_prompt;
use crate::model::{CandidateText, EvaluationRequest};
use crate::tokens::TokenAccountant;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Joins the candidate ids of one request in the correlation metadata.
/// Candidate ids containing it are rejected.
pub const ID_SEPARATOR: &str = ",";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    pub max_tokens_per_batch: usize,
    pub max_requests_per_batch: usize,
    pub max_tokens_per_candidate: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_tokens_per_batch: 6000,
            max_requests_per_batch: 12,
            max_tokens_per_candidate: 1000,
        }
    }
}

impl BatchLimits {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_tokens_per_batch == 0 {
            return Err("max_tokens_per_batch must be > 0".into());
        }
        if self.max_requests_per_batch == 0 {
            return Err("max_requests_per_batch must be > 0".into());
        }
        if self.max_tokens_per_candidate == 0 {
            return Err("max_tokens_per_candidate must be > 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub custom_id: String,
    pub rendered_prompt: String,
    /// Sum of the clipped token counts of the candidate texts in this request.
    pub token_count: usize,
    /// Rendering order; the judge's score array maps onto it positionally.
    pub ordered_candidate_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeBatch {
    pub batch_id: String,
    pub requests: Vec<JudgeRequest>,
    /// custom_id -> comma-joined candidate ids.
    pub metadata: BTreeMap<String, String>,
}

impl JudgeBatch {
    pub fn candidate_count(&self) -> usize {
        self.requests
            .iter()
            .map(|r| r.ordered_candidate_ids.len())
            .sum()
    }

    pub fn request(&self, custom_id: &str) -> Option<&JudgeRequest> {
        self.requests.iter().find(|r| r.custom_id == custom_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedCandidate {
    pub candidate_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchPlan {
    pub batches: Vec<JudgeBatch>,
    /// Candidates with empty or absent text; they get an unscorable result.
    pub skipped: Vec<String>,
    /// Candidates with a non-text payload, dropped with a warning.
    pub rejected: Vec<RejectedCandidate>,
}

impl BatchPlan {
    pub fn request_count(&self) -> usize {
        self.batches.iter().map(|b| b.requests.len()).sum()
    }
}

#[derive(Default)]
struct Group {
    ids: Vec<String>,
    texts: Vec<String>,
    tokens: usize,
}

impl Group {
    fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn push(&mut self, id: &str, text: String, tokens: usize) {
        self.ids.push(id.to_string());
        self.texts.push(text);
        self.tokens += tokens;
    }
}

struct Packer<'a> {
    request: &'a EvaluationRequest,
    limits: BatchLimits,
    batches: Vec<JudgeBatch>,
    current: Vec<JudgeRequest>,
    group: Group,
}

impl Packer<'_> {
    fn close_group(&mut self) {
        if self.group.is_empty() {
            return;
        }
        // The request about to be created would exceed the per-batch limit.
        if self.current.len() >= self.limits.max_requests_per_batch {
            self.close_batch();
        }
        let group = std::mem::take(&mut self.group);
        let custom_id = format!("{}_{}", self.request.request_id, self.current.len() + 1);
        let rendered_prompt = render_judge_prompt(
            &self.request.prompt,
            &self.request.base_response,
            &group.texts,
        );
        self.current.push(JudgeRequest {
            custom_id,
            rendered_prompt,
            token_count: group.tokens,
            ordered_candidate_ids: group.ids,
        });
    }

    fn close_batch(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let requests = std::mem::take(&mut self.current);
        let metadata = requests
            .iter()
            .map(|r| (r.custom_id.clone(), r.ordered_candidate_ids.join(ID_SEPARATOR)))
            .collect();
        let batch_id = format!("{}-b{}", self.request.request_id, self.batches.len() + 1);
        self.batches.push(JudgeBatch {
            batch_id,
            requests,
            metadata,
        });
    }
}

#[derive(Clone)]
pub struct BatchBuilder {
    accountant: Arc<dyn TokenAccountant>,
    limits: BatchLimits,
}

impl BatchBuilder {
    pub fn new(accountant: Arc<dyn TokenAccountant>, limits: BatchLimits) -> Self {
        Self { accountant, limits }
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    pub fn accountant(&self) -> &Arc<dyn TokenAccountant> {
        &self.accountant
    }

    /// Builds the ordered judge batches for `request`.
    ///
    /// Every candidate with non-empty text lands in exactly one request. A
    /// candidate whose clipped size alone exceeds `max_tokens_per_batch` still
    /// gets a request of its own.
    pub fn build(&self, request: &EvaluationRequest) -> BatchPlan {
        let mut packer = Packer {
            request,
            limits: self.limits,
            batches: Vec::new(),
            current: Vec::new(),
            group: Group::default(),
        };
        let mut skipped = Vec::new();
        let mut rejected = Vec::new();

        for candidate in &request.candidates {
            let text = match &candidate.text {
                CandidateText::Text(t) if !t.is_empty() => t,
                CandidateText::Text(_) | CandidateText::Absent => {
                    skipped.push(candidate.candidate_id.clone());
                    continue;
                }
                CandidateText::Malformed(v) => {
                    let reason = format!(
                        "candidate payload must be text, got {}",
                        crate::model::json_kind(v)
                    );
                    tracing::warn!(
                        request_id = %request.request_id,
                        candidate_id = %candidate.candidate_id,
                        "dropping candidate: {}",
                        reason
                    );
                    rejected.push(RejectedCandidate {
                        candidate_id: candidate.candidate_id.clone(),
                        reason,
                    });
                    continue;
                }
            };
            if candidate.candidate_id.contains(ID_SEPARATOR) {
                let reason = format!("candidate id must not contain '{}'", ID_SEPARATOR);
                tracing::warn!(
                    request_id = %request.request_id,
                    candidate_id = %candidate.candidate_id,
                    "dropping candidate: {}",
                    reason
                );
                rejected.push(RejectedCandidate {
                    candidate_id: candidate.candidate_id.clone(),
                    reason,
                });
                continue;
            }

            let clipped = self
                .accountant
                .clip(text, self.limits.max_tokens_per_candidate);

            if !packer.group.is_empty()
                && packer.group.tokens + clipped.token_count > self.limits.max_tokens_per_batch
            {
                packer.close_group();
            }
            packer
                .group
                .push(&candidate.candidate_id, clipped.text, clipped.token_count);
        }

        packer.close_group();
        packer.close_batch();

        tracing::debug!(
            request_id = %request.request_id,
            batches = packer.batches.len(),
            skipped = skipped.len(),
            rejected = rejected.len(),
            "built judge batches"
        );

        BatchPlan {
            batches: packer.batches,
            skipped,
            rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CandidateResponse;
    use crate::tokens::WhitespaceAccountant;

    fn words(n: usize) -> String {
        vec!["w"; n].join(" ")
    }

    fn builder(max_tokens: usize, max_requests: usize, per_candidate: usize) -> BatchBuilder {
        BatchBuilder::new(
            Arc::new(WhitespaceAccountant),
            BatchLimits {
                max_tokens_per_batch: max_tokens,
                max_requests_per_batch: max_requests,
                max_tokens_per_candidate: per_candidate,
            },
        )
    }

    fn request(cands: Vec<CandidateResponse>) -> EvaluationRequest {
        EvaluationRequest::new("req", "prompt", "base", cands)
    }

    #[test]
    fn three_oversized_pairs_split_into_three_requests() {
        let req = request(vec![
            CandidateResponse::text("1", words(4000)),
            CandidateResponse::text("2", words(4000)),
            CandidateResponse::text("3", words(4000)),
        ]);
        let plan = builder(6000, 12, 5000).build(&req);
        assert_eq!(plan.batches.len(), 1);
        let reqs = &plan.batches[0].requests;
        assert_eq!(reqs.len(), 3);
        for (r, id) in reqs.iter().zip(["1", "2", "3"]) {
            assert_eq!(r.ordered_candidate_ids, vec![id.to_string()]);
            assert_eq!(r.token_count, 4000);
        }
        assert_eq!(reqs[0].custom_id, "req_1");
        assert_eq!(reqs[2].custom_id, "req_3");
    }

    #[test]
    fn packs_greedily_and_preserves_order() {
        let req = request(vec![
            CandidateResponse::text("a", words(3)),
            CandidateResponse::text("b", words(3)),
            CandidateResponse::text("c", words(3)),
            CandidateResponse::text("d", words(1)),
        ]);
        let plan = builder(6, 12, 100).build(&req);
        let reqs = &plan.batches[0].requests;
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].ordered_candidate_ids, vec!["a", "b"]);
        assert_eq!(reqs[0].token_count, 6);
        assert_eq!(reqs[1].ordered_candidate_ids, vec!["c", "d"]);
        assert_eq!(reqs[1].token_count, 4);
        assert_eq!(plan.batches[0].metadata["req_1"], "a,b");
        assert_eq!(plan.batches[0].metadata["req_2"], "c,d");
    }

    #[test]
    fn request_limit_opens_new_batch() {
        let cands = (0..15)
            .map(|i| CandidateResponse::text(i.to_string(), words(5)))
            .collect();
        // One candidate per request, at most 10 requests per batch.
        let plan = builder(5, 10, 100).build(&request(cands));
        assert_eq!(plan.batches.len(), 2);
        assert_eq!(plan.batches[0].requests.len(), 10);
        assert_eq!(plan.batches[1].requests.len(), 5);
        assert_eq!(plan.batches[0].batch_id, "req-b1");
        assert_eq!(plan.batches[1].batch_id, "req-b2");
        // custom ids restart per batch and stay unique inside it
        assert_eq!(plan.batches[1].requests[0].custom_id, "req_1");
        assert_eq!(plan.batches[1].requests[0].ordered_candidate_ids, vec!["10"]);
    }

    #[test]
    fn exactly_full_batch_is_not_split() {
        let cands = (0..4)
            .map(|i| CandidateResponse::text(i.to_string(), words(5)))
            .collect();
        let plan = builder(5, 4, 100).build(&request(cands));
        assert_eq!(plan.batches.len(), 1);
        assert_eq!(plan.batches[0].requests.len(), 4);
    }

    #[test]
    fn skips_empty_and_reports_malformed() {
        let mut bad = CandidateResponse::absent("bad");
        bad.text = CandidateText::Malformed(serde_json::json!(12));
        let req = request(vec![
            CandidateResponse::absent("none"),
            CandidateResponse::text("empty", ""),
            bad,
            CandidateResponse::text("ok", "fine answer"),
        ]);
        let plan = builder(100, 12, 100).build(&req);
        assert_eq!(plan.skipped, vec!["none", "empty"]);
        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(plan.rejected[0].candidate_id, "bad");
        assert!(plan.rejected[0].reason.contains("number"));
        assert_eq!(plan.request_count(), 1);
        assert_eq!(plan.batches[0].requests[0].ordered_candidate_ids, vec!["ok"]);
    }

    #[test]
    fn ids_with_separator_are_rejected() {
        let req = request(vec![
            CandidateResponse::text("a,b", "first"),
            CandidateResponse::text("c", "second"),
            CandidateResponse::text("d", "third"),
        ]);
        let plan = builder(100, 12, 100).build(&req);
        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(plan.rejected[0].candidate_id, "a,b");
        assert!(plan.rejected[0].reason.contains("','"));
        assert_eq!(plan.batches[0].metadata["req_1"], "c,d");
        let ids: Vec<&str> = plan.batches[0].metadata["req_1"].split(ID_SEPARATOR).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn all_empty_produces_no_batches() {
        let req = request(vec![
            CandidateResponse::absent("a"),
            CandidateResponse::text("b", ""),
        ]);
        let plan = builder(100, 12, 100).build(&req);
        assert!(plan.batches.is_empty());
        assert_eq!(plan.skipped.len(), 2);
    }

    #[test]
    fn candidates_are_clipped_before_packing() {
        let req = request(vec![
            CandidateResponse::text("long", words(50)),
            CandidateResponse::text("short", words(2)),
        ]);
        let plan = builder(12, 12, 10).build(&req);
        let r = &plan.batches[0].requests[0];
        assert_eq!(r.ordered_candidate_ids, vec!["long", "short"]);
        assert_eq!(r.token_count, 12);
        assert!(r.rendered_prompt.contains(&format!("Candidate 1: {}\n", words(10))));
        assert!(r.rendered_prompt.contains("Candidate 2: w w\n"));
    }

    #[test]
    fn single_oversize_candidate_gets_own_request() {
        let req = request(vec![
            CandidateResponse::text("a", words(2)),
            CandidateResponse::text("huge", words(20)),
            CandidateResponse::text("b", words(2)),
        ]);
        let plan = builder(10, 12, 50).build(&req);
        let reqs = &plan.batches[0].requests;
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[1].ordered_candidate_ids, vec!["huge"]);
        assert_eq!(reqs[1].token_count, 20);
    }

    #[test]
    fn build_is_reproducible() {
        let cands: Vec<_> = (0..30)
            .map(|i| CandidateResponse::text(format!("c{i}"), words(1 + i % 7)))
            .collect();
        let b = builder(12, 3, 5);
        assert_eq!(b.build(&request(cands.clone())), b.build(&request(cands)));
    }
}

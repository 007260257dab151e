//! Coverage and capacity properties of the batch builder.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tribunal_core::judge::{BatchBuilder, BatchLimits};
use tribunal_core::tokens::WhitespaceAccountant;
use tribunal_core::{CandidateResponse, EvaluationRequest};

fn words(n: usize) -> String {
    vec!["tok"; n].join(" ")
}

fn request(sizes: &[usize]) -> EvaluationRequest {
    let candidates = sizes
        .iter()
        .enumerate()
        .map(|(i, &n)| {
            if n == 0 {
                CandidateResponse::absent(format!("c{}", i))
            } else {
                CandidateResponse::text(format!("c{}", i), words(n))
            }
        })
        .collect();
    EvaluationRequest::new("req", "prompt", "base", candidates)
}

#[test]
fn three_4000_token_candidates_make_three_requests_in_one_batch() {
    let builder = BatchBuilder::new(
        Arc::new(WhitespaceAccountant),
        BatchLimits {
            max_tokens_per_batch: 6000,
            max_requests_per_batch: 12,
            max_tokens_per_candidate: 4000,
        },
    );
    let plan = builder.build(&request(&[4000, 4000, 4000]));
    assert_eq!(plan.batches.len(), 1);
    assert_eq!(plan.batches[0].requests.len(), 3);
    assert!(plan.batches[0]
        .requests
        .iter()
        .all(|r| r.token_count == 4000));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn every_non_empty_candidate_lands_in_exactly_one_request(
        sizes in prop::collection::vec(0usize..40, 0..60),
        max_tokens in 1usize..80,
        max_requests in 1usize..6,
        per_candidate in 1usize..50,
    ) {
        let limits = BatchLimits {
            max_tokens_per_batch: max_tokens,
            max_requests_per_batch: max_requests,
            max_tokens_per_candidate: per_candidate,
        };
        let builder = BatchBuilder::new(Arc::new(WhitespaceAccountant), limits);
        let req = request(&sizes);
        let plan = builder.build(&req);

        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut flat = Vec::new();
        for batch in &plan.batches {
            prop_assert!(!batch.requests.is_empty());
            prop_assert!(batch.requests.len() <= max_requests);
            for r in &batch.requests {
                prop_assert!(!r.ordered_candidate_ids.is_empty());
                if r.ordered_candidate_ids.len() > 1 {
                    prop_assert!(r.token_count <= max_tokens);
                }
                prop_assert_eq!(
                    batch.metadata.get(&r.custom_id).cloned(),
                    Some(r.ordered_candidate_ids.join(","))
                );
                let expected: usize = r
                    .ordered_candidate_ids
                    .iter()
                    .map(|id| {
                        let i: usize = id[1..].parse().unwrap();
                        sizes[i].min(per_candidate)
                    })
                    .sum();
                prop_assert_eq!(r.token_count, expected);
                for id in &r.ordered_candidate_ids {
                    *seen.entry(id.clone()).or_default() += 1;
                    flat.push(id.clone());
                }
            }
        }

        let non_empty: Vec<String> = sizes
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n > 0)
            .map(|(i, _)| format!("c{}", i))
            .collect();
        prop_assert_eq!(&flat, &non_empty);
        prop_assert!(seen.values().all(|&c| c == 1));
        prop_assert_eq!(plan.skipped.len(), sizes.len() - non_empty.len());
    }

    #[test]
    fn build_is_deterministic(sizes in prop::collection::vec(0usize..30, 0..40)) {
        let builder = BatchBuilder::new(
            Arc::new(WhitespaceAccountant),
            BatchLimits {
                max_tokens_per_batch: 25,
                max_requests_per_batch: 3,
                max_tokens_per_candidate: 20,
            },
        );
        let req = request(&sizes);
        prop_assert_eq!(builder.build(&req), builder.build(&req));
    }
}

//! Criterion benchmark: batch construction over large candidate sets.
//! Run with: cargo bench -p tribunal-core --bench batch_build

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tribunal_core::judge::{BatchBuilder, BatchLimits};
use tribunal_core::tokens::{Cl100kAccountant, TokenAccountant, WhitespaceAccountant};
use tribunal_core::{CandidateResponse, EvaluationRequest};

fn request(n: usize, words: usize) -> EvaluationRequest {
    let candidates = (0..n)
        .map(|i| {
            let text = (0..words)
                .map(|w| format!("word{}", (i + w) % 97))
                .collect::<Vec<_>>()
                .join(" ");
            CandidateResponse::text(format!("m{}", i), text)
        })
        .collect();
    EvaluationRequest::new("bench", "What helps with anxiety?", "Slow breathing.", candidates)
}

fn bench_with(c: &mut Criterion, name: &str, accountant: Arc<dyn TokenAccountant>) {
    let mut group = c.benchmark_group(name);
    if std::env::var("QUICK").is_ok() {
        group
            .sample_size(10)
            .measurement_time(Duration::from_secs(2));
    }
    let builder = BatchBuilder::new(accountant, BatchLimits::default());
    for (n, words) in [(64usize, 200usize), (256, 400)] {
        let req = request(n, words);
        group.bench_function(format!("{}_candidates_{}_words", n, words), |b| {
            b.iter(|| black_box(builder.build(black_box(&req))));
        });
    }
    group.finish();
}

fn bench_batch_build(c: &mut Criterion) {
    bench_with(c, "batch_build_whitespace", Arc::new(WhitespaceAccountant));
    let bpe = Cl100kAccountant::new().unwrap();
    bench_with(c, "batch_build_cl100k", Arc::new(bpe));
}

criterion_group!(benches, bench_batch_build);
criterion_main!(benches);

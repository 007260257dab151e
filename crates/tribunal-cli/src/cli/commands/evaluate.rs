use super::common::{
    apply_batching, apply_judge, read_request, report_error, resolve_config, write_output,
};
use crate::cli::args::EvaluateArgs;
use crate::exit_codes;
use std::sync::Arc;
use tribunal_core::engine::{build_invoker, Evaluator};
use tribunal_core::CandidateOutcome;

pub async fn run(args: EvaluateArgs) -> anyhow::Result<i32> {
    match evaluate(&args).await {
        Ok(code) => Ok(code),
        Err(e) => report_error(e),
    }
}

async fn evaluate(args: &EvaluateArgs) -> anyhow::Result<i32> {
    let mut cfg = resolve_config(&args.config)?;
    apply_batching(&mut cfg, &args.batching);
    apply_judge(&mut cfg, &args.judge);
    cfg.validate()?;

    let req = read_request(&args.input)?;
    let invoker = build_invoker(&cfg)?;
    tracing::info!(
        request_id = %req.request_id,
        provider = invoker.provider_name(),
        model = %cfg.judge.model,
        candidates = req.candidates.len(),
        "evaluating"
    );
    let evaluator = Evaluator::from_config(&cfg, Arc::clone(&invoker))?;

    let mut report = evaluator.evaluate(&req).await?;
    if args.rollup && report.rollup.is_none() {
        report.rollup = evaluator.aggregator().map(|a| a.roll_up());
    }

    let mut json = serde_json::to_string_pretty(&report)?;
    json.push('\n');
    write_output(args.out.as_deref(), &json)?;

    let unavailable = report
        .outcomes
        .iter()
        .filter(|o| matches!(o, CandidateOutcome::Unavailable { .. }))
        .count();
    if unavailable > 0 {
        tracing::warn!(unavailable, "some candidates have no judge result");
        if args.strict {
            return Ok(exit_codes::INCOMPLETE);
        }
    }
    Ok(exit_codes::SUCCESS)
}

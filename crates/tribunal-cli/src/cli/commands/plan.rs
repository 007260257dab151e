use super::common::{apply_batching, read_request, report_error, resolve_config, write_output};
use crate::cli::args::PlanArgs;
use crate::exit_codes;
use tribunal_core::judge::wire::to_jsonl;
use tribunal_core::judge::BatchBuilder;
use tribunal_core::tokens::accountant_for;

pub fn run(args: PlanArgs) -> anyhow::Result<i32> {
    match plan(&args) {
        Ok(()) => Ok(exit_codes::SUCCESS),
        Err(e) => report_error(e),
    }
}

fn plan(args: &PlanArgs) -> anyhow::Result<()> {
    let mut cfg = resolve_config(&args.config)?;
    apply_batching(&mut cfg, &args.batching);
    if let Some(m) = &args.judge_model {
        cfg.judge.model = m.clone();
    }
    cfg.validate()?;

    let req = read_request(&args.input)?;
    let builder = BatchBuilder::new(accountant_for(cfg.batching.tokenizer)?, cfg.batching.limits());
    let plan = builder.build(&req);

    let mut out = String::new();
    for batch in &plan.batches {
        if args.wire {
            out.push_str(&to_jsonl(batch, &cfg.judge.model, cfg.judge.max_completion_tokens)?);
        } else {
            out.push_str(&serde_json::to_string(batch)?);
            out.push('\n');
        }
    }
    write_output(args.out.as_deref(), &out)?;

    eprintln!(
        "planned {} batch(es), {} request(s); skipped {}, rejected {}",
        plan.batches.len(),
        plan.request_count(),
        plan.skipped.len(),
        plan.rejected.len()
    );
    Ok(())
}

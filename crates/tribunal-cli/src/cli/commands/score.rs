use crate::cli::args::ScoreArgs;
use crate::exit_codes;
use tribunal_core::scoring::overall_score_from_value;

pub fn run(args: ScoreArgs) -> anyhow::Result<i32> {
    // Unparseable JSON scores 0.0 like any other malformed breakdown.
    let breakdown = match serde_json::from_str::<serde_json::Value>(&args.breakdown) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::error!("breakdown is not valid JSON: {}", e);
            None
        }
    };
    let score = overall_score_from_value(breakdown.as_ref(), args.process_time, args.user_rating);
    println!("{:.2}", score);
    Ok(exit_codes::SUCCESS)
}

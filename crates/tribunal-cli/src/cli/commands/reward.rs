use crate::cli::args::RewardArgs;
use crate::exit_codes;

pub fn run(args: RewardArgs) -> anyhow::Result<i32> {
    let value = tribunal_core::scoring::reward(&args.scores, args.contribution);
    println!("{:.2}", value);
    Ok(exit_codes::SUCCESS)
}

use super::args::*;
use crate::exit_codes;

pub mod common;
pub mod evaluate;
pub mod init;
pub mod plan;
pub mod reward;
pub mod score;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Plan(args) => plan::run(args),
        Command::Score(args) => score::run(args),
        Command::Reward(args) => reward::run(args),
        Command::Evaluate(args) => evaluate::run(args).await,
        Command::Init(args) => init::run(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::SUCCESS)
        }
    }
}

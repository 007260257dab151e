use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tribunal_core::config::JudgeProvider;
use tribunal_core::tokens::TokenizerKind;

#[derive(Parser)]
#[command(
    name = "tribunal",
    version,
    about = "Constrained judge batching, scoring and reward roll-up for candidate responses"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Pack an evaluation request into judge batches (JSONL)
    Plan(PlanArgs),
    /// Compute the overall score of one breakdown
    Score(ScoreArgs),
    /// Compute a reward from a score history and resource contribution
    Reward(RewardArgs),
    /// Run the full pipeline against the configured judge
    Evaluate(EvaluateArgs),
    /// Write a sample tribunal.yaml
    Init(InitArgs),
    Version,
}

#[derive(clap::Args, Clone, Debug)]
pub struct ConfigArgs {
    /// Config file. When omitted, ./tribunal.yaml is used if present,
    /// otherwise built-in defaults.
    #[arg(long, env = "TRIBUNAL_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenizerArg {
    Cl100k,
    Whitespace,
}

impl From<TokenizerArg> for TokenizerKind {
    fn from(t: TokenizerArg) -> Self {
        match t {
            TokenizerArg::Cl100k => TokenizerKind::Cl100k,
            TokenizerArg::Whitespace => TokenizerKind::Whitespace,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum JudgeArg {
    Openai,
    Fake,
}

impl From<JudgeArg> for JudgeProvider {
    fn from(j: JudgeArg) -> Self {
        match j {
            JudgeArg::Openai => JudgeProvider::Openai,
            JudgeArg::Fake => JudgeProvider::Fake,
        }
    }
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct BatchingArgs {
    #[arg(long, env = "TRIBUNAL_MAX_TOKENS_PER_BATCH")]
    pub max_tokens_per_batch: Option<usize>,

    #[arg(long, env = "TRIBUNAL_MAX_REQUESTS_PER_BATCH")]
    pub max_requests_per_batch: Option<usize>,

    #[arg(long, env = "TRIBUNAL_MAX_TOKENS_PER_CANDIDATE")]
    pub max_tokens_per_candidate: Option<usize>,

    #[arg(long, value_enum, env = "TRIBUNAL_TOKENIZER")]
    pub tokenizer: Option<TokenizerArg>,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct JudgeArgs {
    /// Judge transport
    /// - openai: OpenAI Batch API (needs the key named by judge.api_key_env)
    /// - fake: deterministic in-process judge (tests/dev)
    #[arg(long, value_enum, env = "TRIBUNAL_JUDGE")]
    pub judge: Option<JudgeArg>,

    #[arg(long, env = "TRIBUNAL_JUDGE_MODEL")]
    pub judge_model: Option<String>,

    /// Per-batch timeout
    #[arg(long, env = "TRIBUNAL_JUDGE_TIMEOUT")]
    pub timeout_seconds: Option<u64>,

    /// Concurrent batch submissions
    #[arg(long, env = "TRIBUNAL_PARALLEL")]
    pub parallel: Option<usize>,
}

#[derive(clap::Args, Clone, Debug)]
pub struct PlanArgs {
    /// EvaluationRequest JSON ("-" for stdin)
    #[arg(long, short = 'i', default_value = "-")]
    pub input: PathBuf,

    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    /// Emit batch API input lines instead of batch objects
    #[arg(long)]
    pub wire: bool,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub batching: BatchingArgs,

    #[arg(long, env = "TRIBUNAL_JUDGE_MODEL")]
    pub judge_model: Option<String>,
}

#[derive(clap::Args, Clone, Debug)]
pub struct ScoreArgs {
    /// Breakdown JSON object, e.g. '{"relevance":8,"accuracy":7,...}'
    #[arg(long)]
    pub breakdown: String,

    #[arg(long, default_value_t = 1.0)]
    pub process_time: f64,

    #[arg(long, default_value_t = 0.0)]
    pub user_rating: f64,
}

#[derive(clap::Args, Clone, Debug)]
pub struct RewardArgs {
    /// Historical overall scores, comma separated
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub scores: Vec<f64>,

    /// Resource contribution in compute hours
    #[arg(long, default_value_t = 0.0)]
    pub contribution: f64,
}

#[derive(clap::Args, Clone, Debug)]
pub struct EvaluateArgs {
    /// EvaluationRequest JSON ("-" for stdin)
    #[arg(long, short = 'i', default_value = "-")]
    pub input: PathBuf,

    /// Report file (default: stdout)
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    /// Exit non-zero if any candidate ends up unavailable
    #[arg(long)]
    pub strict: bool,

    /// Roll up rewards after this evaluation regardless of the cycle count
    #[arg(long)]
    pub rollup: bool,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub batching: BatchingArgs,

    #[command(flatten)]
    pub judge: JudgeArgs,
}

#[derive(clap::Args, Clone, Debug)]
pub struct InitArgs {
    #[arg(long, default_value = "tribunal.yaml")]
    pub config: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub mod evaluator;

pub use evaluator::{EvaluationReport, Evaluator};

use crate::config::{JudgeProvider, TribunalConfig};
use crate::judge::{FakeJudge, JudgeInvoker, OpenAiBatchClient};
use std::sync::Arc;

/// Builds the configured judge transport. The OpenAI client reads its key
/// from the environment variable named by `judge.api_key_env`.
pub fn build_invoker(cfg: &TribunalConfig) -> anyhow::Result<Arc<dyn JudgeInvoker>> {
    match cfg.judge.provider {
        JudgeProvider::Fake => Ok(Arc::new(FakeJudge::default())),
        JudgeProvider::Openai => {
            let api_key = std::env::var(&cfg.judge.api_key_env).map_err(|_| {
                anyhow::anyhow!(
                    "config error: judge provider 'openai' requires {} to be set",
                    cfg.judge.api_key_env
                )
            })?;
            Ok(Arc::new(OpenAiBatchClient::new(
                cfg.judge.model.clone(),
                api_key,
                cfg.judge.base_url.clone(),
                cfg.judge.max_completion_tokens,
            )))
        }
    }
}

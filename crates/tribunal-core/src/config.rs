//! `tribunal.yaml`: judge, batching, cache and reward settings.

use crate::errors::TribunalError;
use crate::judge::{BatchLimits, DispatchSettings};
use crate::scoring::RewardSettings;
use crate::tokens::TokenizerKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

pub const SAMPLE_CONFIG: &str = r#"version: 1

judge:
  provider: openai          # openai | fake
  model: gpt-4o
  api_key_env: OPENAI_API_KEY
  base_url: https://api.openai.com
  timeout_seconds: 300
  poll_interval_ms: 2000
  max_completion_tokens: 1000
  parallel: 4

batching:
  max_tokens_per_batch: 6000
  max_requests_per_batch: 12
  max_tokens_per_candidate: 1000
  tokenizer: cl100k         # cl100k | whitespace

cache:
  capacity: 10000
  # ttl_seconds: 3600

reward:
  rollup_every: 100
  top_k: 10
  compute_hours_per_call: 0.1
  top_contributor_bonus_hours: 0.5
  distribution_limit: 100
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeProvider {
    #[default]
    Openai,
    Fake,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JudgeConfig {
    pub provider: JudgeProvider,
    pub model: String,
    pub api_key_env: String,
    pub base_url: String,
    pub timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub max_completion_tokens: u32,
    pub parallel: usize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: JudgeProvider::Openai,
            model: "gpt-4o".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            base_url: "https://api.openai.com".into(),
            timeout_seconds: 300,
            poll_interval_ms: 2000,
            max_completion_tokens: 1000,
            parallel: 4,
        }
    }
}

impl JudgeConfig {
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            parallel: self.parallel.max(1),
            timeout: Duration::from_secs(self.timeout_seconds),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchingConfig {
    pub max_tokens_per_batch: usize,
    pub max_requests_per_batch: usize,
    pub max_tokens_per_candidate: usize,
    pub tokenizer: TokenizerKind,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        let limits = BatchLimits::default();
        Self {
            max_tokens_per_batch: limits.max_tokens_per_batch,
            max_requests_per_batch: limits.max_requests_per_batch,
            max_tokens_per_candidate: limits.max_tokens_per_candidate,
            tokenizer: TokenizerKind::default(),
        }
    }
}

impl BatchingConfig {
    pub fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_tokens_per_batch: self.max_tokens_per_batch,
            max_requests_per_batch: self.max_requests_per_batch,
            max_tokens_per_candidate: self.max_tokens_per_candidate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl_seconds: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_seconds.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TribunalConfig {
    pub version: u32,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub reward: RewardSettings,
}

impl Default for TribunalConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            judge: JudgeConfig::default(),
            batching: BatchingConfig::default(),
            cache: CacheConfig::default(),
            reward: RewardSettings::default(),
        }
    }
}

impl TribunalConfig {
    pub fn validate(&self) -> Result<(), TribunalError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(TribunalError::config(format!(
                "unsupported config version {} (supported: {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }
        self.batching
            .limits()
            .validate()
            .map_err(TribunalError::config)?;
        if self.cache.capacity == 0 {
            return Err(TribunalError::config("cache.capacity must be > 0"));
        }
        if self.judge.timeout_seconds == 0 {
            return Err(TribunalError::config("judge.timeout_seconds must be > 0"));
        }
        if self.reward.rollup_every == 0 {
            return Err(TribunalError::config("reward.rollup_every must be > 0"));
        }
        Ok(())
    }
}

pub fn parse_config(raw: &str) -> Result<TribunalConfig, TribunalError> {
    let cfg: TribunalConfig = serde_yaml::from_str(raw)
        .map_err(|e| TribunalError::config(format!("failed to parse YAML: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_config(path: &Path) -> Result<TribunalConfig, TribunalError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        TribunalError::config(format!("failed to read config {}: {}", path.display(), e))
    })?;
    let cfg = parse_config(&raw)?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(cfg)
}

pub fn write_sample_config(path: &Path) -> Result<(), TribunalError> {
    std::fs::write(path, SAMPLE_CONFIG)?;
    Ok(())
}

use crate::cli::args::{BatchingArgs, ConfigArgs, JudgeArgs};
use anyhow::Context;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tribunal_core::config::{load_config, TribunalConfig};
use tribunal_core::EvaluationRequest;

const DEFAULT_CONFIG: &str = "tribunal.yaml";

pub fn resolve_config(args: &ConfigArgs) -> anyhow::Result<TribunalConfig> {
    let path = match &args.config {
        Some(p) => p.clone(),
        None => {
            let p = PathBuf::from(DEFAULT_CONFIG);
            if !p.exists() {
                tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG);
                return Ok(TribunalConfig::default());
            }
            p
        }
    };
    Ok(load_config(&path)?)
}

pub fn apply_batching(cfg: &mut TribunalConfig, args: &BatchingArgs) {
    let b = &mut cfg.batching;
    if let Some(v) = args.max_tokens_per_batch {
        b.max_tokens_per_batch = v;
    }
    if let Some(v) = args.max_requests_per_batch {
        b.max_requests_per_batch = v;
    }
    if let Some(v) = args.max_tokens_per_candidate {
        b.max_tokens_per_candidate = v;
    }
    if let Some(t) = args.tokenizer {
        b.tokenizer = t.into();
    }
}

pub fn apply_judge(cfg: &mut TribunalConfig, args: &JudgeArgs) {
    let j = &mut cfg.judge;
    if let Some(p) = args.judge {
        j.provider = p.into();
    }
    if let Some(m) = &args.judge_model {
        j.model = m.clone();
    }
    if let Some(t) = args.timeout_seconds {
        j.timeout_seconds = t;
    }
    if let Some(p) = args.parallel {
        j.parallel = p;
    }
}

/// Reads an EvaluationRequest from a file or stdin ("-"). A missing or
/// blank request id is replaced by a fresh UUID.
pub fn read_request(input: &Path) -> anyhow::Result<EvaluationRequest> {
    let raw = if input == Path::new("-") {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        s
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input.display()))?
    };
    let mut req: EvaluationRequest = serde_json::from_str(&raw)
        .map_err(|e| tribunal_core::TribunalError::invalid_input(format!("request JSON: {}", e)))?;
    if req.request_id.trim().is_empty() {
        req.request_id = uuid::Uuid::new_v4().to_string();
    }
    Ok(req)
}

pub fn write_output(out: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match out {
        Some(p) => std::fs::write(p, content)
            .with_context(|| format!("failed to write {}", p.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}

/// Maps core errors to exit codes; anything else propagates.
pub fn exit_code_for(err: &anyhow::Error) -> Option<i32> {
    match err.downcast_ref::<tribunal_core::TribunalError>()? {
        tribunal_core::TribunalError::InvalidInput(_) => Some(crate::exit_codes::INVALID_INPUT),
        tribunal_core::TribunalError::Config(_) => Some(crate::exit_codes::CONFIG_ERROR),
        _ => None,
    }
}

pub fn report_error(err: anyhow::Error) -> anyhow::Result<i32> {
    match exit_code_for(&err) {
        Some(code) => {
            eprintln!("error: {}", err);
            Ok(code)
        }
        None => Err(err),
    }
}

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub hex: String,
    pub components: Vec<String>,
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Everything besides the candidate text that changes what the judge sees.
pub fn evaluation_context(
    prompt: &str,
    base_response: &str,
    judge_model: &str,
    tokenizer: &str,
    max_tokens_per_candidate: usize,
) -> Value {
    json!({
        "prompt": prompt,
        "base_response": base_response,
        "judge_model": judge_model,
        "tokenizer": tokenizer,
        "max_tokens_per_candidate": max_tokens_per_candidate,
    })
}

/// Computes the cache key for one candidate text under a serialized context.
///
/// The context is canonicalized (JCS, sorted keys) so that logically equal
/// contexts hash identically regardless of field order.
pub fn compute(text: &str, context: &Value) -> Fingerprint {
    let canonical = serde_jcs::to_string(context).unwrap_or_else(|_| context.to_string());

    let parts = vec![
        format!("text={}", text),
        format!("context={}", canonical),
        // Invalidate all entries when scoring logic ships a new version.
        format!("tribunal_version={}", env!("CARGO_PKG_VERSION")),
    ];

    let raw = parts.join("\n");
    let hex = sha256_hex(&raw);

    Fingerprint {
        hex,
        components: parts,
    }
}

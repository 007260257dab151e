//! Judge wire format: batch input lines out, chat-completion output lines in.

use super::batch::{JudgeBatch, JudgeRequest};
use super::prompt::SYSTEM_PROMPT;
use crate::errors::TribunalError;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct RequestLine<'a> {
    custom_id: &'a str,
    method: &'static str,
    url: &'static str,
    body: ChatBody<'a>,
}

pub fn request_line(req: &JudgeRequest, model: &str, max_tokens: u32) -> Value {
    let line = RequestLine {
        custom_id: &req.custom_id,
        method: "POST",
        url: CHAT_COMPLETIONS_PATH,
        body: ChatBody {
            model,
            messages: [
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: &req.rendered_prompt,
                },
            ],
            max_tokens,
        },
    };
    // Plain string/number fields only; serialization cannot fail.
    serde_json::to_value(line).unwrap_or(Value::Null)
}

/// One JSON object per line, in request order, newline terminated.
pub fn to_jsonl(batch: &JudgeBatch, model: &str, max_tokens: u32) -> anyhow::Result<String> {
    let mut out = String::new();
    for req in &batch.requests {
        out.push_str(&serde_json::to_string(&request_line(req, model, max_tokens))?);
        out.push('\n');
    }
    Ok(out)
}

/// Parsed judge reply for one request, positionally aligned with its
/// `ordered_candidate_ids`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JudgeVerdict {
    /// `None` where the judge returned something other than a number.
    pub scores: Vec<Option<f64>>,
    pub breakdowns: Option<Vec<Value>>,
}

impl JudgeVerdict {
    pub fn score_at(&self, pos: usize) -> Option<f64> {
        self.scores.get(pos).copied().flatten()
    }

    pub fn breakdown_at(&self, pos: usize) -> Option<&Value> {
        self.breakdowns.as_ref().and_then(|b| b.get(pos))
    }
}

fn malformed(detail: impl Into<String>) -> TribunalError {
    TribunalError::MalformedJudgeOutput(detail.into())
}

/// Takes the first JSON value starting at the first `{` in `text`.
pub fn extract_json_object(text: &str) -> Result<Value, TribunalError> {
    let text = text.trim();
    let start = text
        .find('{')
        .ok_or_else(|| malformed("no JSON object start found in judge output"))?;
    let val: Value = serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| malformed("no JSON object found in extracted text"))?
        .map_err(|e| malformed(format!("invalid JSON: {}", e)))?;
    if !val.is_object() {
        return Err(malformed("judge output is not a JSON object"));
    }
    Ok(val)
}

/// Parses the assistant content of a judge reply.
pub fn parse_verdict(content: &str) -> Result<JudgeVerdict, TribunalError> {
    let val = extract_json_object(content)?;
    let scores = val
        .get("scores")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("judge JSON missing 'scores' array"))?
        .iter()
        .map(|s| s.as_f64().filter(|f| f.is_finite()).map(|f| f.clamp(-1.0, 1.0)))
        .collect();
    let breakdowns = val.get("breakdowns").and_then(Value::as_array).cloned();
    Ok(JudgeVerdict { scores, breakdowns })
}

/// Parses one output line into its custom id and the verdict (or the reason
/// there is none).
pub fn parse_output_line(
    line: &Value,
) -> Result<(String, Result<JudgeVerdict, String>), TribunalError> {
    let custom_id = line
        .get("custom_id")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("output line missing 'custom_id'"))?
        .to_string();

    let response = match line.get("response") {
        Some(r) if !r.is_null() => r,
        _ => {
            let err = line
                .get("error")
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no response".to_string());
            return Ok((custom_id, Err(err)));
        }
    };

    let status = response
        .get("status_code")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if !(200..300).contains(&status) {
        return Ok((custom_id, Err(format!("judge returned status {}", status))));
    }

    let content = response
        .pointer("/body/choices/0/message/content")
        .and_then(Value::as_str);
    let verdict = match content {
        None => Err("response body has no message content".to_string()),
        Some(c) => parse_verdict(c).map_err(|e| e.to_string()),
    };
    Ok((custom_id, verdict))
}

/// Indexes every parseable line by custom id. Lines without an id are
/// skipped with a warning; a repeated id keeps the first occurrence.
pub fn index_output(lines: &[Value]) -> HashMap<String, Result<JudgeVerdict, String>> {
    let mut out = HashMap::new();
    for line in lines {
        match parse_output_line(line) {
            Ok((id, verdict)) => {
                if let Err(reason) = &verdict {
                    tracing::warn!(custom_id = %id, "judge output line unusable: {}", reason);
                }
                out.entry(id).or_insert(verdict);
            }
            Err(e) => tracing::warn!("skipping judge output line: {}", e),
        }
    }
    out
}

/// Builds an output line in the shape the batch API returns. Used by the
/// fake judge and by tests.
pub fn output_line(custom_id: &str, status_code: u16, content: &str) -> Value {
    serde_json::json!({
        "custom_id": custom_id,
        "response": {
            "status_code": status_code,
            "body": {
                "choices": [
                    { "message": { "role": "assistant", "content": content } }
                ]
            }
        },
        "error": null
    })
}

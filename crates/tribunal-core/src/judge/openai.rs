use super::batch::JudgeBatch;
use super::invoker::{BatchStatus, JudgeInvoker, JudgeOutput, JudgePoll};
use super::wire::{to_jsonl, CHAT_COMPLETIONS_PATH};
use crate::fingerprint::sha256_hex;
use crate::providers::network::check_outbound;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};

/// Batch API metadata limits: at most 16 pairs, keys up to 64 characters,
/// values up to 512 characters.
const METADATA_MAX_VALUE_CHARS: usize = 512;

/// Metadata attached to the remote batch.
///
/// The full custom_id -> candidate ids map stays in the local correlation
/// index; the remote side only gets the batch id, request and candidate
/// counts, and a digest of the full map.
pub fn remote_metadata(batch: &JudgeBatch) -> serde_json::Map<String, Value> {
    let digest_input: String = batch
        .metadata
        .iter()
        .map(|(custom_id, ids)| format!("{}={}\n", custom_id, ids))
        .collect();
    let batch_id: String = batch.batch_id.chars().take(METADATA_MAX_VALUE_CHARS).collect();

    let mut metadata = serde_json::Map::new();
    metadata.insert("batch_id".into(), Value::String(batch_id));
    metadata.insert("requests".into(), Value::String(batch.requests.len().to_string()));
    metadata.insert("candidates".into(), Value::String(batch.candidate_count().to_string()));
    metadata.insert("metadata_sha256".into(), Value::String(sha256_hex(&digest_input)));
    metadata
}

/// Maps a retrieved batch object to its status and, when the batch is done,
/// its output file.
pub fn classify_batch(v: &Value) -> (BatchStatus, Option<String>) {
    let status = BatchStatus::parse(v.get("status").and_then(Value::as_str).unwrap_or(""));
    let output_file = match status {
        BatchStatus::Completed => v
            .get("output_file_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        _ => None,
    };
    (status, output_file)
}

/// Client for the OpenAI Batch API.
///
/// Submission uploads the JSONL input file and creates a batch with a 24h
/// completion window; retrieval downloads the output file once the batch has
/// completed.
pub struct OpenAiBatchClient {
    pub model: String,
    pub max_tokens: u32,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiBatchClient {
    pub fn new(model: String, api_key: String, base_url: String, max_tokens: u32) -> Self {
        Self {
            model,
            max_tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json(resp: reqwest::Response, what: &str) -> anyhow::Result<Value> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI {} error (status {}): {}", what, status, body);
        }
        Ok(resp.json().await?)
    }

    async fn upload_input(&self, batch: &JudgeBatch) -> anyhow::Result<String> {
        let url = self.url("/v1/files");
        check_outbound(&url)?;
        let jsonl = to_jsonl(batch, &self.model, self.max_tokens)?;
        let file = Part::bytes(jsonl.into_bytes())
            .file_name(format!("{}.jsonl", batch.batch_id))
            .mime_str("application/jsonl")?;
        let form = Form::new().text("purpose", "batch").part("file", file);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let v = Self::read_json(resp, "file upload").await?;
        v.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("file upload response missing 'id'"))
    }

    async fn download(&self, file_id: &str) -> anyhow::Result<Vec<Value>> {
        let url = self.url(&format!("/v1/files/{}/content", file_id));
        check_outbound(&url)?;
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("OpenAI file download error (status {})", status);
        }
        let text = resp.text().await?;
        let mut lines = Vec::new();
        for (i, raw) in text.lines().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(raw) {
                Ok(v) => lines.push(v),
                Err(e) => tracing::warn!(file_id, line = i + 1, "unparseable output line: {}", e),
            }
        }
        Ok(lines)
    }
}

#[async_trait]
impl JudgeInvoker for OpenAiBatchClient {
    async fn submit(&self, batch: &JudgeBatch) -> anyhow::Result<String> {
        let input_file_id = self.upload_input(batch).await?;

        let url = self.url("/v1/batches");
        check_outbound(&url)?;
        let body = json!({
            "input_file_id": input_file_id,
            "endpoint": CHAT_COMPLETIONS_PATH,
            "completion_window": "24h",
            "metadata": remote_metadata(batch),
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let v = Self::read_json(resp, "batch create").await?;
        v.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("batch create response missing 'id'"))
    }

    async fn fetch(&self, remote_id: &str) -> anyhow::Result<JudgePoll> {
        let url = self.url(&format!("/v1/batches/{}", remote_id));
        check_outbound(&url)?;
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let v = Self::read_json(resp, "batch retrieve").await?;

        match classify_batch(&v) {
            (status, Some(file_id)) => {
                let lines = self.download(&file_id).await?;
                Ok(JudgePoll::Ready(JudgeOutput { lines, status }))
            }
            (status, None) => Ok(JudgePoll::NotReady { status }),
        }
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::batch::JudgeRequest;
    use crate::providers::network::NetworkPolicyGuard;
    use std::collections::BTreeMap;

    fn wide_batch(requests: usize, per_request: usize) -> JudgeBatch {
        let mut metadata = BTreeMap::new();
        let requests: Vec<JudgeRequest> = (1..=requests)
            .map(|n| {
                let custom_id = format!("{}_{}", "r".repeat(80), n);
                let ids: Vec<String> = (0..per_request)
                    .map(|i| format!("00000000-0000-4000-8000-{:012}", n * 1000 + i))
                    .collect();
                metadata.insert(custom_id.clone(), ids.join(","));
                JudgeRequest {
                    custom_id,
                    rendered_prompt: "p".into(),
                    token_count: per_request,
                    ordered_candidate_ids: ids,
                }
            })
            .collect();
        JudgeBatch {
            batch_id: format!("{}-b1", "r".repeat(600)),
            requests,
            metadata,
        }
    }

    #[test]
    fn remote_metadata_fits_batch_api_limits() {
        let batch = wide_batch(40, 40);
        let md = remote_metadata(&batch);
        assert!(md.len() <= 16);
        for (k, v) in &md {
            assert!(k.chars().count() <= 64, "key {k}");
            let v = v.as_str().unwrap();
            assert!(v.chars().count() <= 512, "value of {k} has {} chars", v.len());
        }
        assert_eq!(md["requests"], "40");
        assert_eq!(md["candidates"], "1600");
        assert_eq!(md["metadata_sha256"].as_str().unwrap().len(), 64);

        let mut other = batch.clone();
        other.metadata.insert("extra".into(), "x".into());
        assert_ne!(remote_metadata(&other)["metadata_sha256"], md["metadata_sha256"]);
    }

    #[test]
    fn completed_without_output_file_is_not_ready() {
        let (status, file) = classify_batch(&json!({"status": "completed"}));
        assert_eq!(status, BatchStatus::Completed);
        assert_eq!(file, None);

        let (_, file) = classify_batch(&json!({"status": "completed", "output_file_id": ""}));
        assert_eq!(file, None);

        let (status, file) = classify_batch(&json!({"status": "failed", "output_file_id": "file-1"}));
        assert_eq!(status, BatchStatus::Failed);
        assert_eq!(file, None);

        let (status, file) =
            classify_batch(&json!({"status": "completed", "output_file_id": "file-9"}));
        assert_eq!(status, BatchStatus::Completed);
        assert_eq!(file.as_deref(), Some("file-9"));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn submit_respects_network_policy() {
        let _guard = NetworkPolicyGuard::deny("unit test");
        let client = OpenAiBatchClient::new(
            "gpt-4o".into(),
            "sk-test".into(),
            "http://127.0.0.1:9".into(),
            1000,
        );
        let batch = JudgeBatch {
            batch_id: "r-b1".into(),
            requests: vec![],
            metadata: BTreeMap::new(),
        };
        let err = client.submit(&batch).await.unwrap_err().to_string();
        assert!(err.contains("outbound network blocked"), "{err}");
    }
}

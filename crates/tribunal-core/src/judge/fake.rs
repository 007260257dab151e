use super::batch::JudgeBatch;
use super::invoker::{BatchStatus, JudgeInvoker, JudgeOutput, JudgePoll};
use super::wire::output_line;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Scorer = dyn Fn(&str) -> f64 + Send + Sync;
type Breakdowns = dyn Fn(&[String]) -> serde_json::Value + Send + Sync;

/// Deterministic in-process judge.
///
/// Scores each candidate id with `scorer` and answers in the batch API output
/// shape. Individual batches can be made to fail, to never complete, or to
/// end in a terminal status without output. A submitted batch is forgotten
/// once it has been answered.
pub struct FakeJudge {
    scorer: Arc<Scorer>,
    breakdowns: Option<Arc<Breakdowns>>,
    latency: Duration,
    submissions: AtomicUsize,
    candidates_seen: AtomicUsize,
    failing: HashSet<String>,
    stuck: HashSet<String>,
    terminal: HashMap<String, BatchStatus>,
    pending: Mutex<HashMap<String, JudgeBatch>>,
}

impl Default for FakeJudge {
    fn default() -> Self {
        Self::new(|_| super::prompt::PARITY_SCORE)
    }
}

impl FakeJudge {
    pub fn new(scorer: impl Fn(&str) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            scorer: Arc::new(scorer),
            breakdowns: None,
            latency: Duration::ZERO,
            submissions: AtomicUsize::new(0),
            candidates_seen: AtomicUsize::new(0),
            failing: HashSet::new(),
            stuck: HashSet::new(),
            terminal: HashMap::new(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Submission of this batch id returns a transport error.
    pub fn failing_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.failing.insert(batch_id.into());
        self
    }

    /// This batch id stays `in_progress` forever.
    pub fn stuck_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.stuck.insert(batch_id.into());
        self
    }

    /// Polling this batch id reports `status` with no output file.
    pub fn terminal_batch(mut self, batch_id: impl Into<String>, status: BatchStatus) -> Self {
        self.terminal.insert(batch_id.into(), status);
        self
    }

    /// Adds a `breakdowns` array to every verdict, built from the request's
    /// ordered candidate ids.
    pub fn with_breakdowns(
        mut self,
        breakdowns: impl Fn(&[String]) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.breakdowns = Some(Arc::new(breakdowns));
        self
    }

    /// Submitted batches that have not been answered yet.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn candidates_seen(&self) -> usize {
        self.candidates_seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JudgeInvoker for FakeJudge {
    async fn submit(&self, batch: &JudgeBatch) -> anyhow::Result<String> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.contains(&batch.batch_id) {
            anyhow::bail!("fake judge refused batch {}", batch.batch_id);
        }
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        self.candidates_seen
            .fetch_add(batch.candidate_count(), Ordering::SeqCst);
        let remote_id = format!("fake_batch_{}", n);
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(remote_id.clone(), batch.clone());
        Ok(remote_id)
    }

    async fn fetch(&self, remote_id: &str) -> anyhow::Result<JudgePoll> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let batch_id = pending
            .get(remote_id)
            .map(|b| b.batch_id.clone())
            .ok_or_else(|| anyhow::anyhow!("unknown batch {}", remote_id))?;

        if self.stuck.contains(&batch_id) {
            return Ok(JudgePoll::NotReady {
                status: BatchStatus::InProgress,
            });
        }
        if let Some(status) = self.terminal.get(&batch_id) {
            pending.remove(remote_id);
            return Ok(JudgePoll::NotReady {
                status: status.clone(),
            });
        }
        let Some(batch) = pending.remove(remote_id) else {
            anyhow::bail!("unknown batch {}", remote_id);
        };
        drop(pending);

        let lines = batch
            .requests
            .iter()
            .map(|req| {
                let scores: Vec<f64> = req
                    .ordered_candidate_ids
                    .iter()
                    .map(|id| (self.scorer)(id))
                    .collect();
                let mut content = serde_json::json!({ "scores": scores });
                if let Some(breakdowns) = &self.breakdowns {
                    content["breakdowns"] = breakdowns(req.ordered_candidate_ids.as_slice());
                }
                output_line(&req.custom_id, 200, &content.to_string())
            })
            .collect();

        Ok(JudgePoll::Ready(JudgeOutput {
            lines,
            status: BatchStatus::Completed,
        }))
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

use super::batch::JudgeBatch;
use super::invoker::{BatchStatus, JudgeInvoker, JudgePoll};
use super::wire::{index_output, JudgeVerdict};
use crate::errors::{TribunalError, UnavailableReason};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use tracing::{info_span, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub parallel: usize,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            parallel: 4,
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub status: BatchStatus,
    /// custom_id -> verdict, or the reason that request has none.
    pub verdicts: HashMap<String, Result<JudgeVerdict, String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub result: Result<BatchResult, UnavailableReason>,
    /// Wall-clock time from submission start to outcome.
    pub elapsed: Duration,
}

impl BatchOutcome {
    /// The batch result, or `JudgeUnavailable` naming this batch.
    pub fn check(&self) -> Result<&BatchResult, TribunalError> {
        self.result
            .as_ref()
            .map_err(|reason| TribunalError::JudgeUnavailable {
                batch_id: self.batch_id.clone(),
                reason: reason.clone(),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub remote_id: String,
    pub metadata: BTreeMap<String, String>,
    pub submitted_at: DateTime<Utc>,
}

/// Correlation metadata of submitted batches, retrievable by batch id.
#[derive(Debug, Default)]
pub struct CorrelationIndex {
    entries: Mutex<HashMap<String, Correlation>>,
}

impl CorrelationIndex {
    pub fn record(&self, batch_id: &str, correlation: Correlation) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(batch_id.to_string(), correlation);
    }

    pub fn get(&self, batch_id: &str) -> Option<Correlation> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(batch_id)
            .cloned()
    }

    /// Forgets a batch once its outcome has been consumed.
    pub fn remove(&self, batch_id: &str) -> Option<Correlation> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(batch_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Submits judge batches concurrently, each bounded by its own timeout.
///
/// A failing batch never affects its siblings; the dispatcher does not retry.
#[derive(Clone)]
pub struct JudgeDispatcher {
    invoker: Arc<dyn JudgeInvoker>,
    settings: DispatchSettings,
    correlation: Arc<CorrelationIndex>,
}

impl JudgeDispatcher {
    pub fn new(invoker: Arc<dyn JudgeInvoker>, settings: DispatchSettings) -> Self {
        Self {
            invoker,
            settings,
            correlation: Arc::new(CorrelationIndex::default()),
        }
    }

    pub fn correlation(&self) -> &Arc<CorrelationIndex> {
        &self.correlation
    }

    pub fn provider_name(&self) -> &'static str {
        self.invoker.provider_name()
    }

    /// Returns one outcome per batch, in input order.
    pub async fn dispatch(&self, batches: Vec<JudgeBatch>) -> Vec<BatchOutcome> {
        let sem = Arc::new(Semaphore::new(self.settings.parallel.max(1)));
        let mut join_set = JoinSet::new();

        let mut outcomes: Vec<BatchOutcome> = batches
            .iter()
            .map(|b| BatchOutcome {
                batch_id: b.batch_id.clone(),
                result: Err(UnavailableReason::Transport("dispatch task aborted".into())),
                elapsed: Duration::ZERO,
            })
            .collect();

        for (idx, batch) in batches.into_iter().enumerate() {
            let sem = sem.clone();
            let invoker = self.invoker.clone();
            let correlation = self.correlation.clone();
            let settings = self.settings;
            let span = info_span!(
                "judge.batch",
                batch_id = %batch.batch_id,
                requests = batch.requests.len(),
                provider = invoker.provider_name()
            );
            join_set.spawn(
                async move {
                    let _permit = sem.acquire_owned().await;
                    let started = Instant::now();
                    let result = match timeout(
                        settings.timeout,
                        run_batch(invoker.as_ref(), &batch, &correlation, settings.poll_interval),
                    )
                    .await
                    {
                        Ok(r) => r,
                        Err(_) => Err(UnavailableReason::Timeout {
                            after_ms: settings.timeout.as_millis().min(u128::from(u64::MAX))
                                as u64,
                        }),
                    };
                    let outcome = BatchOutcome {
                        batch_id: batch.batch_id,
                        result,
                        elapsed: started.elapsed(),
                    };
                    match outcome.check() {
                        Ok(r) => tracing::info!(status = %r.status, "judge batch completed"),
                        Err(e) => tracing::warn!("{}", e),
                    }
                    (idx, outcome)
                }
                .instrument(span),
            );
        }

        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((idx, outcome)) => outcomes[idx] = outcome,
                Err(e) => tracing::error!("judge dispatch task failed: {}", e),
            }
        }
        outcomes
    }
}

async fn run_batch(
    invoker: &dyn JudgeInvoker,
    batch: &JudgeBatch,
    correlation: &CorrelationIndex,
    poll_interval: Duration,
) -> Result<BatchResult, UnavailableReason> {
    let remote_id = invoker
        .submit(batch)
        .await
        .map_err(|e| UnavailableReason::Transport(e.to_string()))?;
    correlation.record(
        &batch.batch_id,
        Correlation {
            remote_id: remote_id.clone(),
            metadata: batch.metadata.clone(),
            submitted_at: Utc::now(),
        },
    );
    tracing::info!(remote_id = %remote_id, "judge batch submitted");

    loop {
        let poll = invoker
            .fetch(&remote_id)
            .await
            .map_err(|e| UnavailableReason::Transport(e.to_string()))?;
        match poll {
            JudgePoll::Ready(output) => {
                return Ok(BatchResult {
                    status: output.status,
                    verdicts: index_output(&output.lines),
                });
            }
            JudgePoll::NotReady { status } if status.is_terminal() => {
                return Err(UnavailableReason::NotReady {
                    status: status.to_string(),
                });
            }
            JudgePoll::NotReady { status } => {
                tracing::debug!(status = %status, "judge batch not ready");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

//! Judge-facing half of the pipeline.
//!
//! - `prompt`: judge prompt rendering
//! - `batch`: constrained packing of candidates into judge batches
//! - `wire`: batch API input/output lines
//! - `invoker`: the external judge seam (`openai`, `fake`)
//! - `dispatch`: concurrent, timeout-bounded submission

pub mod batch;
pub mod dispatch;
pub mod fake;
pub mod invoker;
pub mod openai;
pub mod prompt;
pub mod wire;

pub use batch::{BatchBuilder, BatchLimits, BatchPlan, JudgeBatch, JudgeRequest};
pub use dispatch::{BatchOutcome, DispatchSettings, JudgeDispatcher};
pub use fake::FakeJudge;
pub use invoker::{BatchStatus, JudgeInvoker, JudgeOutput, JudgePoll};
pub use openai::OpenAiBatchClient;
pub use wire::JudgeVerdict;

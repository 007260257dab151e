use crate::errors::UnavailableReason;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One prompt, its reference answer, and the candidate answers to be judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub request_id: String,
    pub prompt: String,
    pub base_response: String,
    #[serde(default)]
    pub candidates: Vec<CandidateResponse>,
}

impl EvaluationRequest {
    pub fn new(
        request_id: impl Into<String>,
        prompt: impl Into<String>,
        base_response: impl Into<String>,
        candidates: Vec<CandidateResponse>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            prompt: prompt.into(),
            base_response: base_response.into(),
            candidates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResponse {
    pub candidate_id: String,
    #[serde(default)]
    pub text: CandidateText,
    /// Seconds the producer needed to answer. When absent, the judge round
    /// trip of the batch carrying this candidate is used instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_rating: Option<f64>,
}

impl CandidateResponse {
    pub fn text(candidate_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            text: CandidateText::Text(text.into()),
            process_time: None,
            user_rating: None,
        }
    }

    pub fn absent(candidate_id: impl Into<String>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            text: CandidateText::Absent,
            process_time: None,
            user_rating: None,
        }
    }

    pub fn with_process_time(mut self, secs: f64) -> Self {
        self.process_time = Some(secs);
        self
    }

    pub fn with_user_rating(mut self, rating: f64) -> Self {
        self.user_rating = Some(clamp_user_rating(rating));
        self
    }
}

/// Candidate payload as received on the wire.
///
/// `null` and a missing field are both `Absent`; any JSON value that is not a
/// string is kept as `Malformed` so it can be reported instead of rejected
/// during deserialization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Option<Value>", into = "Option<Value>")]
pub enum CandidateText {
    Text(String),
    #[default]
    Absent,
    Malformed(Value),
}

impl CandidateText {
    /// Text that can be sent to the judge: present and non-empty.
    pub fn scorable(&self) -> Option<&str> {
        match self {
            CandidateText::Text(t) if !t.is_empty() => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CandidateText::Text(_) => "text",
            CandidateText::Absent => "absent",
            CandidateText::Malformed(v) => json_kind(v),
        }
    }
}

impl From<Option<Value>> for CandidateText {
    fn from(v: Option<Value>) -> Self {
        match v {
            None | Some(Value::Null) => CandidateText::Absent,
            Some(Value::String(s)) => CandidateText::Text(s),
            Some(other) => CandidateText::Malformed(other),
        }
    }
}

impl From<CandidateText> for Option<Value> {
    fn from(t: CandidateText) -> Self {
        match t {
            CandidateText::Text(s) => Some(Value::String(s)),
            CandidateText::Absent => None,
            CandidateText::Malformed(v) => Some(v),
        }
    }
}

pub(crate) fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Structured sub-scores for one candidate, each in `[0, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub relevance: f64,
    pub accuracy: f64,
    pub empathy: f64,
    pub clarity: f64,
    pub contextuality: f64,
}

impl ScoreBreakdown {
    pub const FIELDS: [&'static str; 5] = [
        "relevance",
        "accuracy",
        "empathy",
        "clarity",
        "contextuality",
    ];

    /// Every field set to `value`. Since the field weights sum to 10 the
    /// weighted breakdown score of a uniform breakdown equals `value`.
    pub fn uniform(value: f64) -> Self {
        let v = value.clamp(0.0, 10.0);
        Self {
            relevance: v,
            accuracy: v,
            empathy: v,
            clarity: v,
            contextuality: v,
        }
    }

    /// Projects a judge score in `[-1, 1]` onto the `[0, 10]` breakdown scale.
    pub fn from_judge_score(score: f64) -> Self {
        Self::uniform((score.clamp(-1.0, 1.0) + 1.0) * 5.0)
    }

    /// Strict parse of an untyped breakdown: all five fields must be present,
    /// numeric, finite, and within `[0, 10]`.
    pub fn from_value(v: &Value) -> Result<Self, String> {
        let obj = v
            .as_object()
            .ok_or_else(|| format!("breakdown must be an object, got {}", json_kind(v)))?;
        let mut fields = [0.0f64; 5];
        for (slot, name) in fields.iter_mut().zip(Self::FIELDS) {
            let raw = obj
                .get(name)
                .ok_or_else(|| format!("breakdown missing '{}'", name))?;
            let n = raw
                .as_f64()
                .ok_or_else(|| format!("breakdown '{}' is {}, expected number", name, json_kind(raw)))?;
            if !n.is_finite() || !(0.0..=10.0).contains(&n) {
                return Err(format!("breakdown '{}'={} outside [0, 10]", name, n));
            }
            *slot = n;
        }
        Ok(Self {
            relevance: fields[0],
            accuracy: fields[1],
            empathy: fields[2],
            clarity: fields[3],
            contextuality: fields[4],
        })
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        match field {
            "relevance" => Some(self.relevance),
            "accuracy" => Some(self.accuracy),
            "empathy" => Some(self.empathy),
            "clarity" => Some(self.clarity),
            "contextuality" => Some(self.contextuality),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub candidate_id: String,
    /// In `[0, 100]`.
    pub overall_score: f64,
    pub process_time: f64,
    /// In `[0, 10]`.
    pub user_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub candidate_id: String,
    pub aggregated_score: f64,
    pub resource_contribution: f64,
    /// In `[0, 100]`.
    pub reward_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscorableReason {
    Empty,
    Malformed,
    /// The candidate id contains the correlation separator `,`.
    InvalidId,
}

/// Per-candidate result of one evaluation, aligned with the request order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Scored { score: CandidateScore, cached: bool },
    Unscorable {
        candidate_id: String,
        reason: UnscorableReason,
    },
    Unavailable {
        candidate_id: String,
        reason: UnavailableReason,
    },
}

impl CandidateOutcome {
    pub fn candidate_id(&self) -> &str {
        match self {
            CandidateOutcome::Scored { score, .. } => &score.candidate_id,
            CandidateOutcome::Unscorable { candidate_id, .. } => candidate_id,
            CandidateOutcome::Unavailable { candidate_id, .. } => candidate_id,
        }
    }

    pub fn score(&self) -> Option<&CandidateScore> {
        match self {
            CandidateOutcome::Scored { score, .. } => Some(score),
            _ => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, CandidateOutcome::Scored { cached: true, .. })
    }
}

pub fn clamp_user_rating(rating: f64) -> f64 {
    if rating.is_nan() {
        return 0.0;
    }
    rating.clamp(0.0, 10.0)
}

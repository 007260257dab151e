use crate::model::{clamp_user_rating, ScoreBreakdown};
use serde_json::Value;

pub const RELEVANCE_WEIGHT: f64 = 3.0;
pub const ACCURACY_WEIGHT: f64 = 2.0;
pub const EMPATHY_WEIGHT: f64 = 2.0;
pub const CLARITY_WEIGHT: f64 = 1.5;
pub const CONTEXTUALITY_WEIGHT: f64 = 1.5;

const SPEED_EPSILON: f64 = 1e-2;

/// Rounds half away from zero to two decimals.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Weighted mean of the breakdown fields, in `[0, 10]`.
pub fn breakdown_score(b: &ScoreBreakdown) -> f64 {
    (b.relevance * RELEVANCE_WEIGHT
        + b.accuracy * ACCURACY_WEIGHT
        + b.empathy * EMPATHY_WEIGHT
        + b.clarity * CLARITY_WEIGHT
        + b.contextuality * CONTEXTUALITY_WEIGHT)
        / 10.0
}

/// `min(10, 1 / (process_time + 0.01))`; negative or NaN times count as 0.
pub fn speed_score(process_time: f64) -> f64 {
    let t = if process_time.is_nan() {
        0.0
    } else {
        process_time.max(0.0)
    };
    (1.0 / (t + SPEED_EPSILON)).min(10.0)
}

pub fn overall_score(breakdown: &ScoreBreakdown, process_time: f64, user_rating: f64) -> f64 {
    let b = breakdown_score(breakdown).clamp(0.0, 10.0);
    let s = speed_score(process_time);
    let r = clamp_user_rating(user_rating);
    let score = round2(10.0 * (0.6 * b + 0.2 * s + 0.2 * r)).clamp(0.0, 100.0);
    tracing::debug!(
        breakdown_score = b,
        speed_score = s,
        user_rating = r,
        score,
        "overall score computed"
    );
    score
}

/// Scores an untyped breakdown. A missing or malformed breakdown yields 0.0
/// and an error event; this never fails.
pub fn overall_score_from_value(breakdown: Option<&Value>, process_time: f64, user_rating: f64) -> f64 {
    let Some(raw) = breakdown else {
        tracing::error!("missing breakdown, scoring 0.0");
        return 0.0;
    };
    match ScoreBreakdown::from_value(raw) {
        Ok(b) => overall_score(&b, process_time, user_rating),
        Err(e) => {
            tracing::error!(breakdown = %raw, "invalid breakdown format: {}, scoring 0.0", e);
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn bd(r: f64, a: f64, e: f64, c: f64, x: f64) -> ScoreBreakdown {
        ScoreBreakdown {
            relevance: r,
            accuracy: a,
            empathy: e,
            clarity: c,
            contextuality: x,
        }
    }

    #[test]
    fn worked_example() {
        // breakdown 8.0, speed 1/0.51, rating 7
        let score = overall_score(&bd(8.0, 7.0, 9.0, 8.0, 8.0), 0.5, 7.0);
        assert_eq!(score, 65.92);
    }

    #[test]
    fn speed_is_capped_at_ten() {
        assert_eq!(speed_score(0.0), 10.0);
        assert_eq!(speed_score(-3.0), 10.0);
        assert!((speed_score(0.99) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn perfect_and_floor_scores() {
        assert_eq!(overall_score(&ScoreBreakdown::uniform(10.0), 0.0, 10.0), 100.0);
        // Slow answer, zero breakdown, zero rating: only speed remains.
        let s = overall_score(&ScoreBreakdown::uniform(0.0), 99.99, 0.0);
        assert_eq!(s, 0.02);
    }

    #[test]
    fn malformed_breakdown_scores_zero() {
        assert_eq!(overall_score_from_value(None, 0.5, 7.0), 0.0);
        let missing = json!({"relevance": 8, "accuracy": 7});
        assert_eq!(overall_score_from_value(Some(&missing), 0.5, 7.0), 0.0);
        let typed = json!({"relevance": [8], "accuracy": 7, "empathy": 9, "clarity": 8, "contextuality": 8});
        assert_eq!(overall_score_from_value(Some(&typed), 0.5, 7.0), 0.0);
        let ok = json!({"relevance": 8, "accuracy": 7, "empathy": 9, "clarity": 8, "contextuality": 8});
        assert_eq!(overall_score_from_value(Some(&ok), 0.5, 7.0), 65.92);
    }

    proptest! {
        #[test]
        fn overall_score_is_bounded_and_deterministic(
            f in proptest::array::uniform5(0.0f64..=10.0),
            t in -5.0f64..1000.0,
            r in -20.0f64..20.0,
        ) {
            let b = bd(f[0], f[1], f[2], f[3], f[4]);
            let s = overall_score(&b, t, r);
            prop_assert!((0.0..=100.0).contains(&s));
            prop_assert_eq!(s, overall_score(&b, t, r));
        }
    }
}

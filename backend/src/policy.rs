use ergot_shared::Label;

use crate::model::PredictionScore;

/// Scores at or above this are reported as ergot.
pub const DISEASE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub label: Label,
    /// Confidence in `label`, in percent, rounded to two decimals.
    pub confidence_percent: f64,
}

pub fn decide(score: PredictionScore) -> Decision {
    let p = score.value() as f64;
    let (label, confidence) = if score.value() >= DISEASE_THRESHOLD {
        (Label::Diseased, p)
    } else {
        (Label::Healthy, 1.0 - p)
    };
    Decision {
        label,
        confidence_percent: round_2dp(confidence * 100.0),
    }
}

fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide_raw(score: f32) -> Decision {
        decide(PredictionScore::new(score).unwrap())
    }

    #[test]
    fn high_score_is_diseased() {
        let decision = decide_raw(0.9);
        assert_eq!(decision.label, Label::Diseased);
        assert!((decision.confidence_percent - 90.0).abs() < 1e-9);
    }

    #[test]
    fn low_score_is_healthy_with_inverted_confidence() {
        let decision = decide_raw(0.1);
        assert_eq!(decision.label, Label::Healthy);
        assert!((decision.confidence_percent - 90.0).abs() < 1e-9);
    }

    #[test]
    fn threshold_itself_is_diseased() {
        let decision = decide_raw(0.5);
        assert_eq!(decision.label, Label::Diseased);
        assert_eq!(decision.confidence_percent, 50.0);
    }

    #[test]
    fn just_below_threshold_is_healthy() {
        let decision = decide_raw(0.4999);
        assert_eq!(decision.label, Label::Healthy);
        assert!((decision.confidence_percent - 50.01).abs() < 1e-9);
    }

    #[test]
    fn extremes_are_fully_confident() {
        assert_eq!(decide_raw(0.0).confidence_percent, 100.0);
        assert_eq!(decide_raw(0.0).label, Label::Healthy);
        assert_eq!(decide_raw(1.0).confidence_percent, 100.0);
        assert_eq!(decide_raw(1.0).label, Label::Diseased);
    }

    #[test]
    fn confidence_is_rounded_to_two_decimals() {
        let decision = decide_raw(0.87654);
        assert!((decision.confidence_percent - 87.65).abs() < 1e-9);
    }

    #[test]
    fn confidence_never_drops_below_fifty() {
        for i in 0..=100 {
            let decision = decide_raw(i as f32 / 100.0);
            assert!(decision.confidence_percent >= 50.0);
            assert!(decision.confidence_percent <= 100.0);
        }
    }
}

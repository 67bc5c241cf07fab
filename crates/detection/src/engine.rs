use serde::{Deserialize, Serialize};

use crate::layer3::{SemanticClassifier, StubSemanticClassifier};
use crate::{layer1, layer2};

const W1: f64 = 0.55;
const W2: f64 = 0.45;
const W3: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.85 {
            RiskLevel::Critical
        } else if confidence >= 0.65 {
            RiskLevel::High
        } else if confidence >= 0.45 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Transient, produced fresh per message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSignal {
    pub scam_detected: bool,
    pub confidence_score: f64,
    pub risk_level: RiskLevel,
    pub explanations: Vec<String>,
}

pub struct ScamDetectorEngine {
    semantic: Box<dyn SemanticClassifier>,
    alpha: f64,
}

impl Default for ScamDetectorEngine {
    fn default() -> Self {
        Self {
            semantic: Box::new(StubSemanticClassifier),
            alpha: 0.6,
        }
    }
}

impl ScamDetectorEngine {
    pub fn new(semantic: Box<dyn SemanticClassifier>, alpha: f64) -> Self {
        Self { semantic, alpha }
    }

    /// Runs the three layers, combines them with the fixed ensemble
    /// weights, then blends in session memory via exponential decay:
    /// `final = max(current, alpha·previous + (1-alpha)·current)`.
    pub fn detect(&self, text: &str, previous_session_score: f64) -> DetectionSignal {
        let l1 = layer1::analyze(text);
        let l2 = layer2::analyze(text);
        let l3 = self.semantic.analyze(text);

        let current_score = W1 * l1.score + W2 * l2.score + W3 * l3.score;

        let mut explanations = Vec::new();
        explanations.extend(l1.explanations);
        explanations.extend(l2.explanations);
        explanations.extend(l3.explanations);

        let historical_bleed =
            self.alpha * previous_session_score + (1.0 - self.alpha) * current_score;
        let final_score = current_score.max(historical_bleed);

        let final_confidence = (final_score.min(1.0) * 100.0).round() / 100.0;
        let risk = RiskLevel::from_confidence(final_confidence);

        if final_confidence > current_score && final_confidence > 0.45 {
            explanations.push(format!(
                "Context: Session risk elevated from semantic history ({final_confidence})"
            ));
        }

        DetectionSignal {
            scam_detected: final_confidence >= 0.50,
            confidence_score: final_confidence,
            risk_level: risk,
            explanations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obvious_scam_detected_with_multiple_rule_matches() {
        let engine = ScamDetectorEngine::default();
        let signal = engine.detect(
            "URGENT! Your account is blocked. Share OTP and pay to scammer@ybl immediately",
            0.0,
        );
        assert!(signal.scam_detected);
        assert!(signal.confidence_score >= 0.5);
        assert!(signal.explanations.len() >= 3);
    }

    #[test]
    fn memory_decay_elevates_a_benign_followup() {
        let engine = ScamDetectorEngine::default();
        let first = engine.detect(
            "URGENT! Your account is blocked. Share OTP and pay to scammer@ybl immediately",
            0.0,
        );
        assert!((first.confidence_score - 0.90).abs() < 0.05 || first.confidence_score >= 0.65);

        let second = engine.detect("Hello there", first.confidence_score);
        assert!(second.scam_detected, "session memory should keep this engaged");
        assert_eq!(second.risk_level, RiskLevel::Medium);
        assert!(second
            .explanations
            .iter()
            .any(|e| e.contains("Session risk elevated")));
    }

    #[test]
    fn risk_level_boundaries() {
        assert_eq!(RiskLevel::from_confidence(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_confidence(0.44), RiskLevel::Low);
        assert_eq!(RiskLevel::from_confidence(0.45), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_confidence(0.65), RiskLevel::High);
        assert_eq!(RiskLevel::from_confidence(0.85), RiskLevel::Critical);
    }

    #[test]
    fn confidence_is_capped_at_one() {
        let engine = ScamDetectorEngine::default();
        let signal = engine.detect(
            "URGENT otp password bank details account number ifsc card number lottery winner prize kyc expir scammer@ybl upi://pay?",
            1.0,
        );
        assert!(signal.confidence_score <= 1.0);
    }
}

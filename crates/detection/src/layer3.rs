//! Layer 3: the deep-semantic tie-breaker. Modeled as a pluggable trait so
//! an operator can wire in a real classifier; the bundled default is the
//! fixed-cluster stub the rest of the ensemble was tuned against.

use crate::layer1::LayerResult;

/// A pluggable scorer for `ScamDetectorEngine`'s third layer. Implementors
/// may call out to an embedding model or zero-shot classifier; `analyze`
/// is synchronous to keep the ensemble call-site simple — implementations
/// that need async I/O should pre-compute or block internally.
pub trait SemanticClassifier: Send + Sync {
    fn analyze(&self, text: &str) -> LayerResult;
}

/// Fixed-cluster keyword stub. No model is bundled — this recognizes a
/// couple of well-known social-engineering templates by substring match,
/// standing in for whatever embedding similarity an operator plugs in.
#[derive(Default)]
pub struct StubSemanticClassifier;

impl SemanticClassifier for StubSemanticClassifier {
    fn analyze(&self, text: &str) -> LayerResult {
        let lower = text.to_lowercase();
        let mut score = 0.0;
        let mut explanations = Vec::new();

        if lower.contains("help me out") && lower.contains("gift card") {
            score = 0.8_f64.max(score);
            explanations.push(
                "L3: Semantic map closely aligns with 'Gift Card Request' phishing template"
                    .to_string(),
            );
        }

        if lower.contains("customs package") && lower.contains("held") {
            score = 0.9_f64.max(score);
            explanations.push(
                "L3: Matches 'Customs Delay / Advance Fee' semantic cluster".to_string(),
            );
        }

        LayerResult {
            score: score.min(1.0),
            explanations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_gift_card_template() {
        let result = StubSemanticClassifier.analyze("Can you help me out and buy me a gift card?");
        assert_eq!(result.score, 0.8);
    }

    #[test]
    fn unrelated_text_scores_zero() {
        let result = StubSemanticClassifier.analyze("Let's meet for coffee tomorrow");
        assert_eq!(result.score, 0.0);
        assert!(result.explanations.is_empty());
    }
}

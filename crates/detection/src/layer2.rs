//! Layer 2: behavioral token-lexicon scoring. Stands in for a trained
//! TF-IDF/logistic-regression classifier while keeping the same
//! architectural shape — weights below are the stub's fixed lexicon, not
//! derived from any live model.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::layer1::LayerResult;

static COERCION_LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("immediate", 0.2),
        ("action", 0.2),
        ("suspended", 0.3),
        ("blocked", 0.3),
        ("locked", 0.3),
        ("disabled", 0.3),
    ])
});

static LEGAL_THREAT_LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("arrest", 0.4),
        ("warrant", 0.4),
        ("legal", 0.3),
        ("court", 0.3),
        ("lawsuit", 0.4),
        ("prosecution", 0.4),
        ("penalty", 0.3),
        ("fine", 0.3),
        ("charge", 0.15),
    ])
});

static URGENCY_LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("urgently", 0.25),
        ("now", 0.15),
        ("within", 0.2),
        ("hours", 0.1),
        ("minutes", 0.2),
    ])
});

static FINANCIAL_VERB_LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("transfer", 0.3),
        ("send", 0.2),
        ("pay", 0.3),
        ("deposit", 0.25),
    ])
});

/// Whitespace tokenizer over punctuation-stripped lowercase text, mirroring
/// a vectorizer's preprocessing step.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect::<String>()
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

fn lexicon_score(tokens: &[String], lexicon: &HashMap<&'static str, f64>) -> f64 {
    tokens.iter().filter_map(|t| lexicon.get(t.as_str())).sum()
}

/// Evaluates psychological and coercive language features.
pub fn analyze(text: &str) -> LayerResult {
    let tokens = tokenize(text);

    let coercion_score = lexicon_score(&tokens, &COERCION_LEXICON);
    let legal_score = lexicon_score(&tokens, &LEGAL_THREAT_LEXICON);
    let urgency_score = lexicon_score(&tokens, &URGENCY_LEXICON);
    let financial_score = lexicon_score(&tokens, &FINANCIAL_VERB_LEXICON);

    let mut score = 0.0;
    let mut explanations = Vec::new();

    if legal_score >= 0.3 {
        explanations.push("L2: High statistical probability of legal/threat coercion".to_string());
        score += 0.4;
    } else if coercion_score >= 0.3 {
        explanations.push("L2: Behavioral analysis indicates account coercion".to_string());
        score += 0.3;
    }

    if urgency_score >= 0.2 {
        explanations.push("L2: Temporal urgency markers detected".to_string());
        score += 0.2;
    }

    if financial_score >= 0.25 {
        explanations.push("L2: Payment routing intent recognized".to_string());
        score += 0.3;
    }

    LayerResult {
        score: score.min(1.0),
        explanations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_threat_dominates_over_coercion() {
        let result = analyze("Your account will face legal arrest and prosecution");
        assert!(result.explanations.iter().any(|e| e.contains("legal/threat")));
        assert!(result.score >= 0.4);
    }

    #[test]
    fn urgency_alone_scores_modestly() {
        let result = analyze("Please respond urgently within minutes");
        assert!(result.score > 0.0);
        assert!(result.explanations.iter().any(|e| e.contains("urgency")));
    }
}

//! Layer 1: deterministic regex heuristics. Cheapest layer, runs first,
//! carries the highest ensemble weight.

use once_cell::sync::Lazy;
use regex::Regex;

pub struct HeuristicRule {
    pub name: &'static str,
    pub pattern: Lazy<Regex>,
    pub weight: f64,
    pub description: &'static str,
}

macro_rules! rule {
    ($name:expr, $pattern:expr, $weight:expr, $description:expr) => {
        HeuristicRule {
            name: $name,
            pattern: Lazy::new(|| Regex::new($pattern).unwrap()),
            weight: $weight,
            description: $description,
        }
    };
}

pub static HEURISTIC_RULES: &[HeuristicRule] = &[
    rule!(
        "upi_id",
        r"(?i)[a-zA-Z0-9._-]+@(ybl|paytm|okaxis|oksbi|okhdfcbank|axl|upi|ibl)",
        0.4,
        "L1: UPI ID blocklist entity found"
    ),
    rule!(
        "upi_link",
        r"(?i)upi://pay\?",
        0.5,
        "L1: Deep-link payment redirection"
    ),
    rule!(
        "bank_impersonation",
        r"(?i)\b(sbi|hdfc|icici|axis|rbi|reserve\s*bank|bank\s*of\s*india)\s*(bank|customer\s*care|support)?\b",
        0.3,
        "L1: Banking institution impersonation"
    ),
    rule!(
        "govt_impersonation",
        r"(?i)\b(income\s*tax|it\s*department|customs|cyber\s*cell|police|government)\b",
        0.4,
        "L1: Authority/Government impersonation"
    ),
    rule!(
        "otp_request",
        r"(?i)\b(otp|one\s*time\s*password|verification\s*code|pin|cvv)\b",
        0.45,
        "L1: PII/OTP extraction attempt"
    ),
    rule!(
        "password_request",
        r"(?i)\b(password|login\s*credentials?|username\s*and\s*password)\b",
        0.45,
        "L1: Credential theft attempt"
    ),
    rule!(
        "bank_details",
        r"(?i)\b(bank\s*details?|account\s*number|ifsc|card\s*number|atm\s*pin)\b",
        0.45,
        "L1: Bank details request"
    ),
    rule!(
        "lottery_scam",
        r"(?i)\b(lottery|winner|prize|won|congratulations.*claim|lucky\s*draw)\b",
        0.45,
        "L1: Lottery/Prize scam pattern"
    ),
    rule!(
        "job_scam",
        r"(?i)\b(earn.*from\s*home|daily\s*income|part\s*time.*earn)\b",
        0.35,
        "L1: Employment/Work-from-home scam pattern"
    ),
    rule!(
        "kyc_scam",
        r"(?i)\b(kyc.*expir|update.*kyc|verify.*kyc|pan.*link)\b",
        0.40,
        "L1: KYC verification/update urgency"
    ),
    rule!(
        "obfuscated_text",
        r"([a-zA-Z]\.[a-zA-Z]\.[a-zA-Z]\.[a-zA-Z])|([a-zA-Z]![a-zA-Z])",
        0.3,
        "L1: Obfuscation anomaly detected (filter evasion attempt)"
    ),
    rule!(
        "suspicious_url",
        r"(?i)https?://(?!www\.(google|microsoft|apple|amazon|facebook|twitter|instagram)\.com)[^\s]+\.(xyz|tk|ml|ga|cf|gq|top|click|link|info)/",
        0.45,
        "L1: Suspicious TLD URL blocklist match"
    ),
    rule!(
        "shortened_url",
        r"(?i)https?://(bit\.ly|tinyurl|t\.co|goo\.gl|ow\.ly|is\.gd|buff\.ly)/[^\s]+",
        0.35,
        "L1: Obfuscated URL redirection"
    ),
];

pub struct LayerResult {
    pub score: f64,
    pub explanations: Vec<String>,
}

/// Detects deterministic technical footprint anomalies. Sub-10ms latency,
/// runs unconditionally on every message.
pub fn analyze(text: &str) -> LayerResult {
    let mut score = 0.0;
    let mut explanations = Vec::new();

    for rule in HEURISTIC_RULES {
        if rule.pattern.is_match(text) {
            score += rule.weight;
            explanations.push(rule.description.to_string());
        }
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
    fn matches_upi_and_otp_and_urgency() {
        let result = analyze("URGENT! Your account is blocked. Share OTP and pay to scammer@ybl immediately");
        assert!(result.explanations.len() >= 3, "expected at least 3 rule matches, got {:?}", result.explanations);
        assert!(result.score > 0.5);
    }

    #[test]
    fn benign_text_scores_zero() {
        let result = analyze("Hello there");
        assert_eq!(result.score, 0.0);
        assert!(result.explanations.is_empty());
    }
}

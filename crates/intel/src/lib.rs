//! Entity extraction from inbound message text. Output feeds directly into
//! a session's `IntelBuffer` via set-union merge.

use once_cell::sync::Lazy;
use regex::Regex;

use cipher_session::IntelBuffer;

static UPI_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[a-zA-Z0-9._-]+@(ybl|paytm|okaxis|oksbi|okhdfcbank|axl|upi|ibl|apl|waaxis|freecharge|icici|kotak|indus)").unwrap()
});

static PHONE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\+91[\s-]?)?[6-9]\d{9}\b").unwrap());

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)https?://[^\s<>"']+"#).unwrap());

static BANK_ACCOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{9,18}\b").unwrap());

const SAFE_URL_DOMAINS: &[&str] = &["google.com", "microsoft.com", "apple.com"];

const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "otp",
    "verify",
    "blocked",
    "suspended",
    "urgent",
    "immediately",
    "arrest",
    "police",
    "legal action",
    "fine",
    "penalty",
    "refund",
    "cashback",
    "lottery",
    "winner",
    "prize",
    "kyc",
    "update",
    "link click",
    "download",
    "install",
    "remote",
    "anydesk",
    "teamviewer",
];

/// Extracts structured intelligence from a single message. Bank account
/// numbers only extract when the text mentions "account", "a/c", or "bank"
/// nearby — a bare 10-digit number is too easily a phone number or
/// something else entirely.
pub fn extract(text: &str) -> IntelBuffer {
    let lower = text.to_lowercase();
    let mut result = IntelBuffer::default();

    for m in UPI_ID.find_iter(text) {
        result.upi_ids.insert(m.as_str().to_lowercase());
    }

    for m in PHONE_NUMBER.find_iter(text) {
        let mut normalized: String = m
            .as_str()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '+'))
            .collect();
        if normalized.starts_with("91") && normalized.len() > 10 {
            normalized = normalized[2..].to_string();
        }
        result.phone_numbers.insert(normalized);
    }

    for m in URL.find_iter(text) {
        let url = m.as_str();
        let url_lower = url.to_lowercase();
        if !SAFE_URL_DOMAINS.iter().any(|safe| url_lower.contains(safe)) {
            result.phishing_links.insert(url.to_string());
        }
    }

    if lower.contains("account") || lower.contains("a/c") || lower.contains("bank") {
        for m in BANK_ACCOUNT.find_iter(text) {
            if m.as_str().len() >= 9 {
                result.bank_accounts.insert(m.as_str().to_string());
            }
        }
    }

    for keyword in SUSPICIOUS_KEYWORDS {
        if lower.contains(keyword) {
            result.suspicious_keywords.insert(keyword.to_string());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_categories_from_a_mixed_message() {
        let result = extract(
            "My a/c is 123456789012, otp was 4455, link https://bit.ly/x and pay to user@paytm",
        );
        assert!(result.bank_accounts.contains("123456789012"));
        assert!(result.upi_ids.contains("user@paytm"));
        assert!(result.phishing_links.contains("https://bit.ly/x"));
        assert!(result.suspicious_keywords.contains("otp"));
    }

    #[test]
    fn bank_account_requires_context() {
        let result = extract("Call me at 9876543210 sometime");
        assert!(result.bank_accounts.is_empty());
        assert!(result.phone_numbers.contains("9876543210"));
    }

    #[test]
    fn safe_domains_are_excluded() {
        let result = extract("See https://www.google.com/search?q=x for details");
        assert!(result.phishing_links.is_empty());
    }

    #[test]
    fn phone_number_normalizes_country_code() {
        let result = extract("Reach me on +91 9876543210 or 919876543210");
        assert!(result.phone_numbers.contains("9876543210"));
    }
}

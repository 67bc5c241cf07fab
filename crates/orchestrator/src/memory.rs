//! Rolling history truncation to keep the prompt window bounded.

use cipher_llm::ChatMessage;

/// If `history` is within `max_turns_retained`, returns it unchanged.
/// Otherwise keeps the last 8 messages and prepends a synthetic system
/// note marking that earlier context was truncated.
pub fn summarize_history(history: Vec<ChatMessage>, max_turns_retained: usize) -> Vec<ChatMessage> {
    if history.len() <= max_turns_retained {
        return history;
    }

    const KEEP_RECENT: usize = 8;
    let start = history.len().saturating_sub(KEEP_RECENT);
    let mut truncated = vec![ChatMessage::system(format!(
        "[SYSTEM NOTE: Conversation depth exceeds {max_turns_retained} messages. Prior context \
         truncated for memory. Assume the user is continuing the established dialogue.]"
    ))];
    truncated.extend(history.into_iter().skip(start));
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(n: usize) -> Vec<ChatMessage> {
        (0..n).map(|i| ChatMessage::user(format!("turn {i}"))).collect()
    }

    #[test]
    fn short_history_passes_through_unchanged() {
        let history = turns(5);
        let result = summarize_history(history.clone(), 10);
        assert_eq!(result.len(), history.len());
    }

    #[test]
    fn long_history_truncates_to_last_eight_plus_note() {
        let history = turns(30);
        let result = summarize_history(history, 10);
        assert_eq!(result.len(), 9);
        assert!(result[0].content.contains("truncated"));
        assert_eq!(result.last().unwrap().content, "turn 29");
    }
}

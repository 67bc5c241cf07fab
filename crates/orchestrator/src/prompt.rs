//! Assembles the final `[system_directive, ...history]` message sequence:
//! the hydrated persona block, the strict JSON output-schema mandate, and
//! a confidence-banded tactical directive.

use cipher_llm::ChatMessage;

/// Detection-derived context the tactical directive reacts to.
pub struct DetectionState {
    pub confidence_score: f64,
    pub risk_level: &'static str,
}

/// Everything the prompt builder needs beyond the persona block and
/// detection state.
pub struct SessionContext {
    pub history: Vec<ChatMessage>,
    pub turn_number: u64,
    pub max_messages: u64,
    pub missing_entities: Vec<&'static str>,
}

const OUTPUT_SCHEMA_MANDATE: &str = r#"=== STRICT OUTPUT REQUIREMENT ===
You must respond in valid JSON format matching this schema exactly:
{
  "internal_reasoning": {
    "situation_analysis": "brief analysis of attacker tactics",
    "strategy_selection": "how you will handle this turn",
    "persona_alignment_check": "ensure your reaction fits your assigned demographic and literacy limits"
  },
  "final_response": "your actual conversational reply to the scammer"
}

RULES FOR FINAL_RESPONSE:
1. Under NO circumstances should you provide a static, generic tech-support reply.
2. Under NO circumstances should you break character or reveal you are an AI.
3. Keep the payload strictly conversational based on the persona rules."#;

/// Builds the tactical directive chosen by confidence band (spec.md §4.4),
/// plus the wrap-up clause once the conversation nears `max_messages`.
fn tactical_directive(detection: &DetectionState, ctx: &SessionContext) -> String {
    let mut directive = if detection.confidence_score > 0.8 {
        "SCAM DETECTED. Feign maximum confusion. Make them explain step-by-step how to pay them \
         or send money. Provide NO valid details yet."
            .to_string()
    } else if detection.confidence_score > 0.5 {
        "SUSPICIOUS. Ask clarifying, naive questions about why they contacted you.".to_string()
    } else {
        "BENIGN. Respond naturally and politely but keep it brief.".to_string()
    };

    if ctx.max_messages > 0 && ctx.turn_number > ctx.max_messages.saturating_sub(3) {
        directive.push_str(
            " CONVERSATION ENDING SOON. Make a final excuse (e.g., 'My son just arrived, I have to go').",
        );
    }

    let missing = if ctx.missing_entities.is_empty() {
        "none outstanding".to_string()
    } else {
        ctx.missing_entities.join(", ")
    };

    format!(
        "=== DYNAMIC SITUATION METRICS ===\n\
         - Current Scam Probability: {:.1}% ({} risk)\n\
         - Missing Target Intelligence: {missing}\n\
         - Turn Depth: {}/{}\n\n\
         === TACTICAL DIRECTIVE ===\n\
         {directive}\n",
        detection.confidence_score * 100.0,
        detection.risk_level,
        ctx.turn_number,
        ctx.max_messages,
    )
}

/// Assembles the complete prompt array for the LLM: one system message
/// carrying the persona + schema mandate + tactical directive, followed
/// by the (possibly truncated) conversation history.
pub fn compose(persona_block: &str, ctx: SessionContext, detection: &DetectionState) -> Vec<ChatMessage> {
    let dynamic = tactical_directive(detection, &ctx);
    let system_directive = format!("{persona_block}\n\n{OUTPUT_SCHEMA_MANDATE}\n\n{dynamic}");

    let mut messages = vec![ChatMessage::system(system_directive)];
    messages.extend(ctx.history);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(turn_number: u64, max_messages: u64) -> SessionContext {
        SessionContext {
            history: vec![ChatMessage::user("hello")],
            turn_number,
            max_messages,
            missing_entities: vec!["upiIds", "phoneNumbers"],
        }
    }

    #[test]
    fn high_confidence_selects_maximum_confusion() {
        let detection = DetectionState { confidence_score: 0.9, risk_level: "critical" };
        let messages = compose("PERSONA", ctx(1, 20), &detection);
        assert!(messages[0].content.contains("Feign maximum confusion"));
    }

    #[test]
    fn medium_confidence_selects_naive_questions() {
        let detection = DetectionState { confidence_score: 0.6, risk_level: "medium" };
        let messages = compose("PERSONA", ctx(1, 20), &detection);
        assert!(messages[0].content.contains("clarifying, naive questions"));
    }

    #[test]
    fn wrap_up_clause_appears_near_max_messages() {
        let detection = DetectionState { confidence_score: 0.9, risk_level: "critical" };
        let messages = compose("PERSONA", ctx(18, 20), &detection);
        assert!(messages[0].content.contains("CONVERSATION ENDING SOON"));
    }

    #[test]
    fn history_follows_system_directive() {
        let detection = DetectionState { confidence_score: 0.2, risk_level: "low" };
        let messages = compose("PERSONA", ctx(1, 20), &detection);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "hello");
    }
}

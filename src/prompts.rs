//! Centralized prompt definitions for oracle queries
//!
//! Centralizing prompts makes them easier to maintain, test, and version.

/// System prompt sent with every Langbase oracle call.
pub const ORACLE_SYSTEM_PROMPT: &str = r#"You are an independent investigation analyst. You examine submitted artifacts (URLs, messages, images, documents, contact details) for signs of fraud, phishing, impersonation and scams.

Answer the user's request precisely. When the request asks for JSON, respond with valid JSON only.
Always include a "confidence" field between 0.0 and 1.0 expressing how sure you are."#;

/// Prompt for the initial investigation strategy.
pub const PLAN_INVESTIGATION_PROMPT: &str = r#"Plan an investigation of the evidence in the context.

Your response MUST be valid JSON in this format:
{
  "actions": [
    {"type": "capability_call", "capability": "domain_analysis", "target": "example.com", "source_evidence": "item-1", "critical": false},
    {"type": "ai_analysis", "focus": "sender impersonation", "evidence_ids": ["item-2"]},
    {"type": "oracle_query", "prompt": "Is this domain associated with known campaigns?"}
  ],
  "rationale": "why this order",
  "confidence": 0.8
}

Guidelines:
- Order actions from cheapest and most informative to most expensive
- Use capability_call for web_intelligence, domain_analysis and ocr
- Mark an action critical only if the investigation cannot conclude without it
- Propose at most 8 actions"#;

/// Prompt for re-planning after a weak or alarming result.
pub const ADAPT_INVESTIGATION_PROMPT: &str = r#"An investigation step produced a low-confidence result or new risk indicators (see context).
Propose ADDITIONAL actions to resolve the uncertainty. Do not repeat completed actions.

Your response MUST be valid JSON using the same format as planning:
{
  "actions": [ ... ],
  "rationale": "what the new actions resolve",
  "confidence": 0.7
}

Propose at most 3 actions."#;

/// Prompt for analysing evidence already in the graph.
pub const ANALYSIS_PROMPT: &str = r#"Analyse the evidence in the context with the given focus.

Your response MUST be valid JSON in this format:
{
  "finding": "what the evidence shows",
  "risk_indicators": ["indicator", "..."],
  "confidence": 0.8
}"#;

/// Prompt prefix for autonomy-gated decisions.
pub const DECISION_PROMPT: &str = r#"Make the decision described below for an ongoing investigation.

Your response MUST be valid JSON in this format:
{
  "decision": "the chosen option",
  "reasoning": "why",
  "alternatives": ["other options considered"],
  "confidence": 0.8
}"#;

/// Options offered for continue/stop decisions.
pub const CONTINUATION_GUIDANCE: &str = r#"Decide whether the investigation should "continue", "complete" (enough evidence gathered), "pause" (needs an operator) or "abort" (cannot proceed). Use exactly one of these words as the decision."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_prompts_request_json() {
        for prompt in [
            PLAN_INVESTIGATION_PROMPT,
            ADAPT_INVESTIGATION_PROMPT,
            ANALYSIS_PROMPT,
            DECISION_PROMPT,
        ] {
            assert!(prompt.contains("valid JSON"));
            assert!(prompt.contains("\"confidence\""));
        }
    }

    #[test]
    fn test_continuation_guidance_names_every_outcome() {
        for outcome in ["continue", "complete", "pause", "abort"] {
            assert!(CONTINUATION_GUIDANCE.contains(outcome));
        }
    }
}

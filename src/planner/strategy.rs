//! Turning consensus output into actions, and the fallbacks used when it
//! cannot be parsed.

use serde_json::Value;
use tracing::{debug, warn};

use super::types::{ActionKind, EvidenceKind, InvestigationType};
use crate::capability::{DOMAIN_ANALYSIS, OCR, WEB_INTELLIGENCE};
use crate::completion::parse_json_completion;

/// Phrases that mark an artifact as suspicious. Matched case-insensitively.
const RISK_KEYWORDS: &[&str] = &[
    "urgent",
    "verify your account",
    "password",
    "suspended",
    "gift card",
    "wire transfer",
    "bitcoin",
    "crypto",
    "lottery",
    "prize",
    "invoice",
    "refund",
    "login",
    "bank",
];

/// A seeded artifact as the strategy sees it.
#[derive(Debug, Clone)]
pub struct SeededItem {
    pub node_id: String,
    pub kind: EvidenceKind,
    pub content: String,
}

/// Actions extracted from a strategy consensus.
#[derive(Debug, Clone, Default)]
pub struct ParsedStrategy {
    /// `(kind, critical)` pairs in queue order.
    pub actions: Vec<(ActionKind, bool)>,
    pub rationale: Option<String>,
}

/// Parse `{"actions": [...], "rationale": "..."}`, tolerating code fences and
/// skipping malformed entries. `None` when nothing usable was found.
pub fn parse_strategy(text: &str) -> Option<ParsedStrategy> {
    let value = parse_json_completion(text)?;
    let entries = value.get("actions")?.as_array()?;

    let mut actions = Vec::with_capacity(entries.len());
    for entry in entries {
        let critical = entry
            .get("critical")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        match serde_json::from_value::<ActionKind>(entry.clone()) {
            Ok(kind) => actions.push((kind, critical)),
            Err(e) => warn!(error = %e, entry = %entry, "Skipping malformed planned action"),
        }
    }

    if actions.is_empty() {
        debug!("Strategy contained no usable actions");
        return None;
    }

    Some(ParsedStrategy {
        actions,
        rationale: value
            .get("rationale")
            .and_then(Value::as_str)
            .map(String::from),
    })
}

/// Deterministic queue derived from item kinds.
pub fn default_actions(items: &[SeededItem]) -> Vec<(ActionKind, bool)> {
    let mut actions = Vec::new();

    for item in items {
        let source = Some(item.node_id.clone());
        match item.kind {
            EvidenceKind::Url => {
                actions.push((capability_call(WEB_INTELLIGENCE, &item.content, source.clone()), false));
                if let Some(host) = url_host(&item.content) {
                    actions.push((capability_call(DOMAIN_ANALYSIS, host, source), false));
                }
            }
            EvidenceKind::Domain => {
                actions.push((capability_call(DOMAIN_ANALYSIS, &item.content, source), false));
            }
            EvidenceKind::Image => {
                actions.push((capability_call(OCR, &item.content, source), false));
            }
            EvidenceKind::Message
            | EvidenceKind::Email
            | EvidenceKind::Phone
            | EvidenceKind::Document
            | EvidenceKind::Text => {
                actions.push((
                    ActionKind::AiAnalysis {
                        focus: format!("{} content analysis", item.kind),
                        evidence_ids: vec![item.node_id.clone()],
                    },
                    false,
                ));
            }
        }
    }

    actions.push((
        ActionKind::AiAnalysis {
            focus: "overall assessment".to_string(),
            evidence_ids: items.iter().map(|i| i.node_id.clone()).collect(),
        },
        false,
    ));

    actions
}

fn capability_call(capability: &str, target: &str, source_evidence: Option<String>) -> ActionKind {
    ActionKind::CapabilityCall {
        capability: capability.to_string(),
        target: target.to_string(),
        source_evidence,
        options: Value::Object(Default::default()),
    }
}

/// Host part of a URL, without scheme, credentials or port.
pub fn url_host(url: &str) -> Option<&str> {
    let rest = url.trim();
    let rest = rest.split_once("://").map_or(rest, |(_, r)| r);
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Keyword indicators present in the submitted items.
pub fn scan_risk_indicators(items: &[SeededItem], investigation_type: InvestigationType) -> Vec<String> {
    let mut indicators: Vec<String> = Vec::new();
    for item in items {
        let lowered = item.content.to_lowercase();
        for keyword in RISK_KEYWORDS {
            if lowered.contains(keyword) && !indicators.iter().any(|i| i == keyword) {
                indicators.push((*keyword).to_string());
            }
        }
    }

    debug!(
        investigation_type = investigation_type.as_str(),
        indicators = indicators.len(),
        "Initial risk scan"
    );
    indicators
}

/// Whether a textual artifact mentions another artifact verbatim.
pub fn mentions(haystack: &SeededItem, needle: &SeededItem) -> bool {
    haystack.kind.is_textual()
        && haystack.node_id != needle.node_id
        && !needle.content.trim().is_empty()
        && haystack.content.contains(needle.content.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seeded(id: &str, kind: EvidenceKind, content: &str) -> SeededItem {
        SeededItem {
            node_id: id.to_string(),
            kind,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_parse_strategy_fenced_json() {
        let text = r#"Here is the plan:
```json
{"actions": [
  {"type": "capability_call", "capability": "ocr", "target": "img.png", "critical": true},
  {"type": "ai_analysis", "focus": "tone", "evidence_ids": ["item-1"]},
  {"type": "teleport"}
], "rationale": "image first"}
```"#;
        let parsed = parse_strategy(text).unwrap();
        assert_eq!(parsed.actions.len(), 2);
        assert!(parsed.actions[0].1);
        assert_eq!(parsed.actions[0].0.type_name(), "capability_call");
        assert_eq!(
            parsed.actions[1].0,
            ActionKind::AiAnalysis {
                focus: "tone".to_string(),
                evidence_ids: vec!["item-1".to_string()],
            }
        );
        assert_eq!(parsed.rationale.as_deref(), Some("image first"));
    }

    #[test]
    fn test_parse_strategy_rejects_prose_and_empty() {
        assert!(parse_strategy("Investigate the URL first.").is_none());
        assert!(parse_strategy(r#"{"actions": []}"#).is_none());
        assert!(parse_strategy(r#"{"steps": [1, 2]}"#).is_none());
    }

    #[test]
    fn test_default_actions_by_kind() {
        let items = vec![
            seeded("u", EvidenceKind::Url, "https://user@login.example.com:8443/reset?x=1"),
            seeded("i", EvidenceKind::Image, "screenshot.png"),
            seeded("m", EvidenceKind::Message, "hello"),
        ];
        let actions = default_actions(&items);
        let names: Vec<&str> = actions
            .iter()
            .map(|(kind, _)| match kind {
                ActionKind::CapabilityCall { capability, .. } => capability.as_str(),
                ActionKind::AiAnalysis { focus, .. } => focus.as_str(),
                ActionKind::OracleQuery { .. } => "oracle",
            })
            .collect();
        assert_eq!(
            names,
            vec![
                WEB_INTELLIGENCE,
                DOMAIN_ANALYSIS,
                OCR,
                "message content analysis",
                "overall assessment"
            ]
        );
        match &actions[1].0 {
            ActionKind::CapabilityCall { target, source_evidence, .. } => {
                assert_eq!(target, "login.example.com");
                assert_eq!(source_evidence.as_deref(), Some("u"));
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert!(actions.iter().all(|(_, critical)| !critical));
    }

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("http://example.com"), Some("example.com"));
        assert_eq!(url_host("example.com/path"), Some("example.com"));
        assert_eq!(url_host("https://"), None);
    }

    #[test]
    fn test_scan_risk_indicators_deduplicates() {
        let items = vec![
            seeded("a", EvidenceKind::Message, "URGENT: verify your account password"),
            seeded("b", EvidenceKind::Email, "Your password expires"),
        ];
        assert_eq!(
            scan_risk_indicators(&items, InvestigationType::Phishing),
            vec!["urgent", "verify your account", "password"]
        );
    }

    #[test]
    fn test_mentions() {
        let message = seeded("m", EvidenceKind::Message, "click https://bad.example now");
        let url = seeded("u", EvidenceKind::Url, "https://bad.example");
        assert!(mentions(&message, &url));
        assert!(!mentions(&url, &message));
    }
}

//! Autonomy-gated decisions with an immutable audit history.
//!
//! Every decision is checked against the configured [`AutonomyLevel`] before
//! any oracle is consulted. Permitted decisions go through the oracle panel
//! and consensus, and the resulting [`Decision`] is appended to the history
//! (and to storage, when attached). Denials only bump a counter.

mod autonomy;

pub use autonomy::*;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::completion::parse_json_completion;
use crate::consensus::ConsensusEngine;
use crate::error::{DecisionError, DecisionResult};
use crate::oracle::{CancelSignal, OracleGateway};
use crate::prompts::{CONTINUATION_GUIDANCE, DECISION_PROMPT};
use crate::storage::Storage;

/// What a decision is about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_id: Option<String>,
    /// The question put to the oracles.
    pub description: String,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    /// Free-form state the oracles may need.
    #[serde(default)]
    pub data: Value,
}

impl DecisionContext {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn for_investigation(mut self, investigation_id: impl Into<String>) -> Self {
        self.investigation_id = Some(investigation_id.into());
        self
    }

    pub fn with_evidence(mut self, evidence_ids: Vec<String>) -> Self {
        self.evidence_ids = evidence_ids;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// A recorded decision. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_id: Option<String>,
    pub decision_type: DecisionType,
    /// The chosen option.
    pub outcome: String,
    pub reasoning: String,
    pub confidence: f64,
    pub evidence_used: Vec<String>,
    pub oracles_consulted: Vec<String>,
    pub alternatives_considered: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub autonomy_level: AutonomyLevel,
    pub agreement_score: f64,
}

/// Rolling counters over every decision request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub decision_count: u64,
    pub denied_count: u64,
    /// Mean confidence of recorded decisions.
    pub average_confidence: f64,
    pub by_type: BTreeMap<DecisionType, u64>,
}

impl DecisionMetrics {
    fn record(&mut self, decision: &Decision) {
        self.decision_count += 1;
        self.average_confidence +=
            (decision.confidence - self.average_confidence) / self.decision_count as f64;
        *self.by_type.entry(decision.decision_type).or_insert(0) += 1;
    }
}

/// Outcome fields pulled out of the consensus text.
struct ParsedDecision {
    outcome: String,
    reasoning: String,
    alternatives: Vec<String>,
}

fn parse_decision(text: &str) -> ParsedDecision {
    let Some(value) = parse_json_completion(text) else {
        return ParsedDecision {
            outcome: text.trim().to_string(),
            reasoning: text.trim().to_string(),
            alternatives: Vec::new(),
        };
    };

    let outcome = match value.get("decision") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
        None => text.trim().to_string(),
    };
    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let alternatives = value
        .get("alternatives")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    ParsedDecision {
        outcome,
        reasoning,
        alternatives,
    }
}

/// Makes and records autonomy-gated decisions.
pub struct DecisionRecorder {
    gateway: OracleGateway,
    consensus: ConsensusEngine,
    autonomy_level: AutonomyLevel,
    history: RwLock<Vec<Decision>>,
    metrics: RwLock<DecisionMetrics>,
    storage: Option<Arc<dyn Storage>>,
}

impl DecisionRecorder {
    pub fn new(gateway: OracleGateway, autonomy_level: AutonomyLevel) -> Self {
        Self {
            gateway,
            consensus: ConsensusEngine::new(),
            autonomy_level,
            history: RwLock::new(Vec::new()),
            metrics: RwLock::new(DecisionMetrics::default()),
            storage: None,
        }
    }

    /// Persist every recorded decision to `storage` as well.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn autonomy_level(&self) -> AutonomyLevel {
        self.autonomy_level
    }

    /// Decide `decision_type` for `context`, or fail with `PermissionDenied`
    /// without consulting any oracle.
    pub async fn make_decision(
        &self,
        decision_type: DecisionType,
        context: DecisionContext,
        cancel: &CancelSignal,
    ) -> DecisionResult<Decision> {
        if !self.autonomy_level.permits(decision_type) {
            warn!(
                decision_type = %decision_type,
                autonomy_level = %self.autonomy_level,
                investigation_id = ?context.investigation_id,
                "Decision denied by autonomy level"
            );
            self.metrics.write().await.denied_count += 1;
            return Err(DecisionError::PermissionDenied {
                decision_type: decision_type.to_string(),
                autonomy_level: self.autonomy_level.to_string(),
            });
        }

        let mut prompt = format!(
            "{}\n\nDecision type: {}\nQuestion: {}",
            DECISION_PROMPT, decision_type, context.description
        );
        if decision_type == DecisionType::InvestigationContinuation {
            prompt.push_str("\n\n");
            prompt.push_str(CONTINUATION_GUIDANCE);
        }

        let oracle_context = json!({
            "investigation_id": context.investigation_id,
            "decision_type": decision_type,
            "evidence_ids": context.evidence_ids,
            "data": context.data,
        });

        let result = self
            .consensus
            .query::<DecisionError>(&self.gateway, &prompt, &oracle_context, cancel)
            .await?;

        let parsed = parse_decision(&result.consensus_decision);
        let decision = Decision {
            id: Uuid::new_v4().to_string(),
            investigation_id: context.investigation_id,
            decision_type,
            outcome: parsed.outcome,
            reasoning: parsed.reasoning,
            confidence: result.final_confidence,
            evidence_used: context.evidence_ids,
            oracles_consulted: result.oracles_consulted(),
            alternatives_considered: parsed.alternatives,
            timestamp: Utc::now(),
            autonomy_level: self.autonomy_level,
            agreement_score: result.agreement_score,
        };

        info!(
            decision_id = %decision.id,
            decision_type = %decision_type,
            outcome = %decision.outcome,
            confidence = decision.confidence,
            "Decision recorded"
        );

        self.history.write().await.push(decision.clone());
        self.metrics.write().await.record(&decision);

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save_decision(&decision).await {
                warn!(decision_id = %decision.id, error = %e, "Failed to persist decision");
            }
        }

        Ok(decision)
    }

    /// Every recorded decision in order.
    pub async fn history(&self) -> Vec<Decision> {
        self.history.read().await.clone()
    }

    /// Recorded decisions of one investigation in order.
    pub async fn history_for(&self, investigation_id: &str) -> Vec<Decision> {
        self.history
            .read()
            .await
            .iter()
            .filter(|d| d.investigation_id.as_deref() == Some(investigation_id))
            .cloned()
            .collect()
    }

    /// Drop one investigation's decisions from the in-memory history.
    ///
    /// Metrics keep counting them; storage keeps them when attached.
    pub async fn forget(&self, investigation_id: &str) -> usize {
        let mut history = self.history.write().await;
        let before = history.len();
        history.retain(|d| d.investigation_id.as_deref() != Some(investigation_id));
        before - history.len()
    }

    pub async fn metrics(&self) -> DecisionMetrics {
        self.metrics.read().await.clone()
    }
}

impl std::fmt::Debug for DecisionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionRecorder")
            .field("autonomy_level", &self.autonomy_level)
            .field("gateway", &self.gateway)
            .field("persistent", &self.storage.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleResult;
    use crate::oracle::{Oracle, OracleReply, TokenBucket};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingOracle {
        name: String,
        reply: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Oracle for CountingOracle {
        fn name(&self) -> &str {
            &self.name
        }

        async fn query(&self, _prompt: &str, _context: &Value) -> OracleResult<OracleReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OracleReply::new(self.reply.clone(), "test").with_confidence(0.8))
        }
    }

    fn recorder(level: AutonomyLevel, reply: &str) -> (DecisionRecorder, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = CountingOracle {
            name: "alpha".to_string(),
            reply: reply.to_string(),
            calls: Arc::clone(&calls),
        };
        let gateway = OracleGateway::new(
            vec![Arc::new(oracle)],
            Arc::new(TokenBucket::unlimited()),
            Duration::from_secs(5),
        );
        (DecisionRecorder::new(gateway, level), calls)
    }

    #[test]
    fn test_parse_decision_json() {
        let parsed = parse_decision(
            r#"{"decision": "continue", "reasoning": "more to see", "alternatives": ["complete", 3], "confidence": 0.8}"#,
        );
        assert_eq!(parsed.outcome, "continue");
        assert_eq!(parsed.reasoning, "more to see");
        assert_eq!(parsed.alternatives, vec!["complete".to_string(), "3".to_string()]);
    }

    #[test]
    fn test_parse_decision_prose_fallback() {
        let parsed = parse_decision("  pause and ask an analyst ");
        assert_eq!(parsed.outcome, "pause and ask an analyst");
        assert!(parsed.alternatives.is_empty());
    }

    #[tokio::test]
    async fn test_denied_decision_consults_no_oracle() {
        let (recorder, calls) = recorder(AutonomyLevel::SemiAutonomous, "{}");
        let err = recorder
            .make_decision(
                DecisionType::ResourceAllocation,
                DecisionContext::new("more oracles?"),
                &CancelSignal::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DecisionError::PermissionDenied { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(recorder.history().await.is_empty());
        assert_eq!(recorder.metrics().await.denied_count, 1);
    }

    #[tokio::test]
    async fn test_permitted_decision_recorded() {
        let (recorder, calls) = recorder(
            AutonomyLevel::SemiAutonomous,
            r#"{"decision": "continue", "reasoning": "open leads", "alternatives": ["pause"], "confidence": 0.8}"#,
        );
        let decision = recorder
            .make_decision(
                DecisionType::InvestigationContinuation,
                DecisionContext::new("keep going?")
                    .for_investigation("inv-1")
                    .with_evidence(vec!["item-1".to_string()]),
                &CancelSignal::new(),
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(decision.outcome, "continue");
        assert_eq!(decision.evidence_used, vec!["item-1".to_string()]);
        assert_eq!(decision.oracles_consulted, vec!["alpha".to_string()]);
        assert_eq!(decision.autonomy_level, AutonomyLevel::SemiAutonomous);
        assert!((decision.confidence - 0.8).abs() < 1e-9);

        assert_eq!(recorder.history_for("inv-1").await, vec![decision]);
        assert!(recorder.history_for("inv-2").await.is_empty());

        let metrics = recorder.metrics().await;
        assert_eq!(metrics.decision_count, 1);
        assert_eq!(metrics.by_type.get(&DecisionType::InvestigationContinuation), Some(&1));
        assert!((metrics.average_confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancelled_decision_fails() {
        let (recorder, _) = recorder(AutonomyLevel::FullyAutonomous, "{}");
        let cancel = CancelSignal::new();
        cancel.cancel();
        let err = recorder
            .make_decision(DecisionType::RiskAssessment, DecisionContext::new("risk?"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DecisionError::Oracle(_)));
    }

    #[tokio::test]
    async fn test_forget_drops_only_that_investigation() {
        let (recorder, _) = recorder(AutonomyLevel::FullyAutonomous, r#"{"decision": "continue"}"#);
        let cancel = CancelSignal::new();
        for investigation in ["inv-1", "inv-2", "inv-1"] {
            recorder
                .make_decision(
                    DecisionType::RiskAssessment,
                    DecisionContext::new("risk?").for_investigation(investigation),
                    &cancel,
                )
                .await
                .unwrap();
        }

        assert_eq!(recorder.forget("inv-1").await, 2);
        assert!(recorder.history_for("inv-1").await.is_empty());
        assert_eq!(recorder.history_for("inv-2").await.len(), 1);
        assert_eq!(recorder.metrics().await.decision_count, 3);
    }
}

//! Decision recorder tests: autonomy gating, history and persistence

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{gateway, FakeOracle};
use investigation_orchestrator::decision::{
    AutonomyLevel, DecisionContext, DecisionRecorder, DecisionType,
};
use investigation_orchestrator::error::DecisionError;
use investigation_orchestrator::oracle::CancelSignal;
use investigation_orchestrator::storage::{SqliteStorage, Storage};
use pretty_assertions::assert_eq;

fn recorder(level: AutonomyLevel) -> (DecisionRecorder, Arc<std::sync::atomic::AtomicUsize>) {
    let oracle = FakeOracle::new("panel", 0.8).with_decision(
        r#"{"decision": "continue", "reasoning": "open leads", "alternatives": ["complete"]}"#,
    );
    let calls = oracle.call_counter();
    (
        DecisionRecorder::new(gateway(vec![oracle], Duration::from_secs(5)), level),
        calls,
    )
}

#[cfg(test)]
mod decision_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_manual_denies_every_type_without_oracle_calls() {
        let (recorder, calls) = recorder(AutonomyLevel::Manual);

        for decision_type in DecisionType::ALL {
            let err = recorder
                .make_decision(
                    decision_type,
                    DecisionContext::new("should we?"),
                    &CancelSignal::new(),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, DecisionError::PermissionDenied { .. }));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(recorder.history().await.is_empty());

        let metrics = recorder.metrics().await;
        assert_eq!(metrics.denied_count, DecisionType::ALL.len() as u64);
        assert_eq!(metrics.decision_count, 0);
    }

    #[tokio::test]
    async fn test_fully_autonomous_never_denies() {
        let (recorder, calls) = recorder(AutonomyLevel::FullyAutonomous);

        for decision_type in DecisionType::ALL {
            let decision = recorder
                .make_decision(
                    decision_type,
                    DecisionContext::new("should we?"),
                    &CancelSignal::new(),
                )
                .await
                .unwrap();
            assert_eq!(decision.decision_type, decision_type);
            assert_eq!(decision.autonomy_level, AutonomyLevel::FullyAutonomous);
        }

        assert_eq!(calls.load(Ordering::SeqCst), DecisionType::ALL.len());
        let metrics = recorder.metrics().await;
        assert_eq!(metrics.denied_count, 0);
        assert_eq!(metrics.decision_count, DecisionType::ALL.len() as u64);
        assert_eq!(metrics.by_type.len(), DecisionType::ALL.len());
    }

    #[tokio::test]
    async fn test_semi_autonomous_denies_resource_allocation_only() {
        let (recorder, _) = recorder(AutonomyLevel::SemiAutonomous);
        let cancel = CancelSignal::new();

        let denied = recorder
            .make_decision(
                DecisionType::ResourceAllocation,
                DecisionContext::new("more budget?"),
                &cancel,
            )
            .await;
        assert!(matches!(denied, Err(DecisionError::PermissionDenied { .. })));

        let allowed = recorder
            .make_decision(
                DecisionType::RiskAssessment,
                DecisionContext::new("how risky?"),
                &cancel,
            )
            .await;
        assert!(allowed.is_ok());
    }

    #[tokio::test]
    async fn test_decision_fields_come_from_consensus() {
        let (recorder, _) = recorder(AutonomyLevel::FullyAutonomous);

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

        assert_eq!(decision.outcome, "continue");
        assert_eq!(decision.reasoning, "open leads");
        assert_eq!(decision.alternatives_considered, vec!["complete".to_string()]);
        assert_eq!(decision.evidence_used, vec!["item-1".to_string()]);
        assert_eq!(decision.oracles_consulted, vec!["panel".to_string()]);
        assert!((decision.confidence - 0.8).abs() < 1e-9);
        assert_eq!(decision.investigation_id.as_deref(), Some("inv-1"));
    }

    #[tokio::test]
    async fn test_history_is_ordered_and_filtered() {
        let (recorder, _) = recorder(AutonomyLevel::FullyAutonomous);
        let cancel = CancelSignal::new();

        for (investigation, question) in [("a", "first"), ("b", "second"), ("a", "third")] {
            recorder
                .make_decision(
                    DecisionType::RiskAssessment,
                    DecisionContext::new(question).for_investigation(investigation),
                    &cancel,
                )
                .await
                .unwrap();
        }

        let all = recorder.history().await;
        assert_eq!(all.len(), 3);

        let for_a = recorder.history_for("a").await;
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_a[0].id, all[0].id);
        assert_eq!(for_a[1].id, all[2].id);
    }

    #[tokio::test]
    async fn test_all_oracles_failing_records_nothing() {
        let recorder = DecisionRecorder::new(
            gateway(vec![FakeOracle::failing("down")], Duration::from_secs(5)),
            AutonomyLevel::FullyAutonomous,
        );

        let err = recorder
            .make_decision(
                DecisionType::RiskAssessment,
                DecisionContext::new("how risky?"),
                &CancelSignal::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DecisionError::Oracle(_)));
        assert!(recorder.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_recorded_decisions_are_persisted() {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
        let (recorder, _) = recorder(AutonomyLevel::FullyAutonomous);
        let recorder = recorder.with_storage(Arc::clone(&storage));

        let decision = recorder
            .make_decision(
                DecisionType::EvidencePrioritization,
                DecisionContext::new("what next?").for_investigation("inv-9"),
                &CancelSignal::new(),
            )
            .await
            .unwrap();

        let stored = storage.get_decisions("inv-9").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, decision.id);
        assert_eq!(stored[0].outcome, decision.outcome);
        assert_eq!(stored[0].decision_type, DecisionType::EvidencePrioritization);
    }
}

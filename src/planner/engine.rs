use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::recovery::{recovery_strategy, RecoveryStrategy};
use super::strategy::{default_actions, mentions, parse_strategy, scan_risk_indicators, SeededItem};
use super::types::*;
use crate::capability::{CapabilityRegistry, CapabilityRequest};
use crate::completion::parse_json_completion;
use crate::config::PlannerConfig;
use crate::consensus::{ConsensusEngine, ConsensusResult};
use crate::decision::{DecisionContext, DecisionRecorder, DecisionType};
use crate::error::{ActionError, DecisionError, OracleError, PlannerError, PlannerResult};
use crate::graph::{EvidenceNode, RelationshipKind, SharedGraph};
use crate::oracle::{CancelSignal, OracleGateway};
use crate::prompts::{ADAPT_INVESTIGATION_PROMPT, ANALYSIS_PROMPT, PLAN_INVESTIGATION_PROMPT};

/// Quality score given to capability output nodes.
const CAPABILITY_QUALITY: f64 = 0.8;

/// Longest finding kept in an action summary.
const SUMMARY_CHARS: usize = 200;

/// Result of a continuation check.
#[derive(Debug, Clone, PartialEq)]
pub enum Continuation {
    Continue,
    Stop {
        phase: Phase,
        reason: TerminationReason,
        detail: String,
    },
}

impl Continuation {
    fn stop(phase: Phase, reason: TerminationReason, detail: impl Into<String>) -> Self {
        Continuation::Stop {
            phase,
            reason,
            detail: detail.into(),
        }
    }
}

/// How one queued action ended after retries.
enum ActionOutcome {
    Completed(ActionResult),
    Skipped,
    Stop(Phase, TerminationReason, String),
}

/// What a single adaptation attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdaptOutcome {
    Adapted,
    Skipped,
    Cancelled,
}

fn cancelled(detail: impl Into<String>) -> (Phase, TerminationReason, String) {
    (Phase::Aborted, TerminationReason::Cancelled, detail.into())
}

/// Drives one investigation through its phases.
///
/// The planner itself is stateless between investigations; all per-run state
/// lives in the [`InvestigationPlan`] and the [`SharedGraph`] passed in.
pub struct InvestigationPlanner {
    gateway: OracleGateway,
    consensus: ConsensusEngine,
    capabilities: CapabilityRegistry,
    recorder: Arc<DecisionRecorder>,
    config: PlannerConfig,
}

impl InvestigationPlanner {
    pub fn new(
        gateway: OracleGateway,
        capabilities: CapabilityRegistry,
        recorder: Arc<DecisionRecorder>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            gateway,
            consensus: ConsensusEngine::new(),
            capabilities,
            recorder,
            config,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn recorder(&self) -> &Arc<DecisionRecorder> {
        &self.recorder
    }

    // ========================================================================
    // Start
    // ========================================================================

    /// An empty plan in `Initializing` with resources sized for `priority`.
    pub fn new_plan(
        &self,
        investigation_id: &str,
        investigation_type: InvestigationType,
        priority: Priority,
    ) -> InvestigationPlan {
        let resources =
            ResourceAllocation::for_priority(priority, &self.config, self.gateway.oracle_count());
        InvestigationPlan::new(investigation_id, investigation_type, priority, resources)
    }

    /// Validate the input, seed the graph and build the initial action queue.
    ///
    /// Returns the plan in `Planning`. Fails if validation fails or if no
    /// oracle could produce a strategy.
    pub async fn start(
        &self,
        investigation_id: &str,
        items: Vec<EvidenceItem>,
        investigation_type: InvestigationType,
        priority: Priority,
        graph: &SharedGraph,
        cancel: &CancelSignal,
    ) -> PlannerResult<InvestigationPlan> {
        let seeded = validate(investigation_id, items)?;
        let mut plan = self.new_plan(investigation_id, investigation_type, priority);

        info!(
            investigation_id = %investigation_id,
            investigation_type = investigation_type.as_str(),
            items = seeded.len(),
            "Starting investigation"
        );

        for item in &seeded {
            let node = EvidenceNode::new(
                &item.node_id,
                format!("raw_{}", item.kind),
                json!({ "kind": item.kind, "content": item.content }),
            )
            .with_confidence(1.0)
            .with_quality(1.0);
            graph.add_evidence(node)?;
        }
        for haystack in &seeded {
            for needle in &seeded {
                if mentions(haystack, needle) {
                    graph.add_relationship(
                        &haystack.node_id,
                        &needle.node_id,
                        RelationshipKind::Contains,
                        1.0,
                        json!({}),
                    )?;
                }
            }
        }

        plan.risk = RiskAssessment::from_indicators(scan_risk_indicators(&seeded, investigation_type));
        plan.set_phase(Phase::Planning);

        let context = json!({
            "investigation_id": investigation_id,
            "investigation_type": investigation_type,
            "priority": priority,
            "evidence": seeded
                .iter()
                .map(|i| json!({ "id": i.node_id, "kind": i.kind, "content": i.content }))
                .collect::<Vec<_>>(),
            "risk": plan.risk,
            "capabilities": self.capabilities.names(),
        });

        let strategy = self
            .consensus
            .query::<PlannerError>(&self.gateway, PLAN_INVESTIGATION_PROMPT, &context, cancel)
            .await?;

        plan.confidence_score = strategy.final_confidence;
        plan.resources.tokens_used += strategy.tokens_used();
        plan.resources.cost_spent += strategy.cost_estimate();

        let actions = match parse_strategy(&strategy.consensus_decision) {
            Some(parsed) => {
                plan.strategy_rationale = parsed.rationale;
                parsed.actions
            }
            None => {
                warn!(
                    investigation_id = %investigation_id,
                    "Strategy not parseable, using default action queue"
                );
                default_actions(&seeded)
            }
        };
        plan.enqueue(actions);

        info!(
            investigation_id = %investigation_id,
            actions = plan.planned_actions.len(),
            confidence = plan.confidence_score,
            risk = ?plan.risk.level,
            "Investigation planned"
        );

        Ok(plan)
    }

    // ========================================================================
    // Run loop
    // ========================================================================

    /// Execute the queue until the plan reaches a terminal phase.
    ///
    /// Actions run strictly one at a time. Whatever happens, the plan ends in
    /// `Paused`, `Completed` or `Aborted` with a `Termination` attached.
    pub async fn run(
        &self,
        plan: &mut InvestigationPlan,
        graph: &SharedGraph,
        cancel: &CancelSignal,
    ) -> TerminationReason {
        self.run_with_progress(plan, graph, cancel, |_| {}).await
    }

    /// Like [`run`](Self::run), handing `progress` the plan after every phase
    /// change and every finished action.
    pub async fn run_with_progress<F>(
        &self,
        plan: &mut InvestigationPlan,
        graph: &SharedGraph,
        cancel: &CancelSignal,
        progress: F,
    ) -> TerminationReason
    where
        F: Fn(&InvestigationPlan) + Send + Sync,
    {
        plan.set_phase(Phase::Executing);
        progress(&*plan);

        let (phase, reason, detail) = loop {
            if cancel.is_cancelled() {
                break cancelled("cancelled between actions");
            }

            let Some(action) = plan.planned_actions.pop_front() else {
                break (
                    Phase::Completed,
                    TerminationReason::PlanExhausted,
                    "no actions left".to_string(),
                );
            };
            let action_id = action.id.clone();

            match self.run_action(plan, action, graph, cancel).await {
                ActionOutcome::Completed(result) => {
                    progress(&*plan);
                    let fresh = plan.risk.new_indicators(&result.risk_indicators);
                    let adapt = self.should_adapt(&result, plan);
                    plan.risk.absorb(&fresh);
                    if adapt {
                        let trigger = if fresh.is_empty() {
                            format!(
                                "low confidence {:.2} below {:.2}",
                                result.confidence, self.config.adaptation_threshold
                            )
                        } else {
                            format!("new risk indicators: {}", fresh.join(", "))
                        };
                        let outcome = self
                            .adapt(plan, &action_id, trigger, &result, graph, cancel, &progress)
                            .await;
                        if outcome == AdaptOutcome::Cancelled {
                            break cancelled(format!("cancelled while adapting after {}", action_id));
                        }
                    }
                }
                ActionOutcome::Skipped => progress(&*plan),
                ActionOutcome::Stop(phase, reason, detail) => break (phase, reason, detail),
            }

            plan.confidence_score = plan.cumulative_confidence();

            if cancel.is_cancelled() {
                break cancelled(format!("cancelled after {}", action_id));
            }

            match self.decide_continue(plan, graph, cancel).await {
                Continuation::Continue => {}
                Continuation::Stop {
                    phase,
                    reason,
                    detail,
                } => break (phase, reason, detail),
            }
        };

        let reason = self.terminate(plan, phase, reason, &detail);
        progress(&*plan);
        reason
    }

    /// Run one action to completion, retrying in place as recovery dictates.
    ///
    /// The action lands in `completed_actions` exactly once.
    async fn run_action(
        &self,
        plan: &mut InvestigationPlan,
        mut action: PlannedAction,
        graph: &SharedGraph,
        cancel: &CancelSignal,
    ) -> ActionOutcome {
        plan.resources.actions_used += 1;
        let retry_delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            action.status = ActionStatus::Executing;
            action.attempts += 1;
            if action.started_at.is_none() {
                action.started_at = Some(Utc::now());
            }

            debug!(
                investigation_id = %plan.id,
                action_id = %action.id,
                action_type = action.kind.type_name(),
                attempt = action.attempts,
                "Executing action"
            );

            let error = match self.execute(plan, &action, graph, cancel).await {
                Ok(result) => {
                    action.status = ActionStatus::Completed;
                    action.completed_at = Some(Utc::now());
                    action.error = None;
                    action.result = Some(result.clone());

                    plan.resources.tokens_used += result.tokens_used;
                    plan.resources.cost_spent += result.cost;

                    info!(
                        investigation_id = %plan.id,
                        action_id = %action.id,
                        confidence = result.confidence,
                        evidence = result.evidence_ids.len(),
                        "Action completed"
                    );
                    plan.completed_actions.push(action);
                    plan.touch();
                    return ActionOutcome::Completed(result);
                }
                Err(error) => error,
            };

            if matches!(error, ActionError::Cancelled) {
                return Self::fail(plan, action, "cancelled".to_string(), None);
            }

            let strategy =
                recovery_strategy(&error, action.critical, action.attempts, self.config.max_retries);
            warn!(
                investigation_id = %plan.id,
                action_id = %action.id,
                attempt = action.attempts,
                critical = action.critical,
                recovery = %strategy,
                error = %error,
                "Action failed"
            );
            action.error = Some(error.to_string());
            action.recovery = Some(strategy);

            match strategy {
                RecoveryStrategy::Retry => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Self::fail(plan, action, "cancelled".to_string(), None);
                        }
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                }
                RecoveryStrategy::Skip => {
                    action.status = ActionStatus::Skipped;
                    action.completed_at = Some(Utc::now());
                    plan.completed_actions.push(action);
                    plan.touch();
                    return ActionOutcome::Skipped;
                }
                RecoveryStrategy::Abort => {
                    let detail = format!("action {} failed: {}", action.id, error);
                    return Self::fail(plan, action, detail, Some(TerminationReason::ActionAborted));
                }
            }
        }
    }

    /// Record `action` as failed and stop; no reason means cancellation.
    fn fail(
        plan: &mut InvestigationPlan,
        mut action: PlannedAction,
        detail: String,
        reason: Option<TerminationReason>,
    ) -> ActionOutcome {
        action.status = ActionStatus::Failed;
        action.completed_at = Some(Utc::now());
        if action.error.is_none() {
            action.error = Some(detail.clone());
        }
        let detail = match reason {
            Some(_) => detail,
            None => format!("cancelled during {}", action.id),
        };
        plan.completed_actions.push(action);
        plan.touch();
        ActionOutcome::Stop(
            Phase::Aborted,
            reason.unwrap_or(TerminationReason::Cancelled),
            detail,
        )
    }

    fn terminate(
        &self,
        plan: &mut InvestigationPlan,
        phase: Phase,
        reason: TerminationReason,
        detail: &str,
    ) -> TerminationReason {
        plan.set_phase(phase);
        plan.termination = Some(Termination {
            reason,
            detail: detail.to_string(),
            at: Utc::now(),
        });

        info!(
            investigation_id = %plan.id,
            phase = %phase,
            reason = ?reason,
            detail = %detail,
            completed = plan.completed_actions.len(),
            remaining = plan.planned_actions.len(),
            confidence = plan.confidence_score,
            "Investigation stopped"
        );
        reason
    }

    // ========================================================================
    // Execute
    // ========================================================================

    /// Perform one action and write its evidence into the graph.
    pub async fn execute(
        &self,
        plan: &InvestigationPlan,
        action: &PlannedAction,
        graph: &SharedGraph,
        cancel: &CancelSignal,
    ) -> Result<ActionResult, ActionError> {
        if cancel.is_cancelled() {
            return Err(ActionError::Cancelled);
        }

        let outcome = match &action.kind {
            ActionKind::CapabilityCall {
                capability,
                target,
                source_evidence,
                options,
            } => {
                self.execute_capability(
                    action,
                    capability,
                    target,
                    source_evidence.as_deref(),
                    options,
                    graph,
                    cancel,
                )
                .await
            }
            ActionKind::AiAnalysis {
                focus,
                evidence_ids,
            } => {
                self.execute_analysis(plan, action, focus, evidence_ids, graph, cancel)
                    .await
            }
            ActionKind::OracleQuery { prompt, oracles } => {
                self.execute_oracle_query(plan, action, prompt, oracles.as_deref(), graph, cancel)
                    .await
            }
        };

        outcome.map_err(|e| match e {
            ActionError::Oracle(OracleError::Cancelled) => ActionError::Cancelled,
            other => other,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_capability(
        &self,
        action: &PlannedAction,
        capability: &str,
        target: &str,
        source_evidence: Option<&str>,
        options: &Value,
        graph: &SharedGraph,
        cancel: &CancelSignal,
    ) -> Result<ActionResult, ActionError> {
        let request = CapabilityRequest {
            capability: capability.to_string(),
            target: target.to_string(),
            options: options.clone(),
        };

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ActionError::Cancelled),
            result = self.capabilities.invoke(&request) => result?,
        };

        let node_id = format!("{}:result", action.id);
        graph.add_evidence(
            EvidenceNode::new(
                &node_id,
                format!("{}_result", capability),
                json!({ "capability": capability, "target": target, "data": output.data }),
            )
            .with_confidence(output.confidence)
            .with_quality(CAPABILITY_QUALITY),
        )?;

        if let Some(source) = source_evidence {
            if graph.contains(source) {
                graph.add_relationship(
                    &node_id,
                    source,
                    RelationshipKind::OriginatedFrom,
                    output.confidence,
                    json!({ "action_id": action.id }),
                )?;
            } else {
                warn!(action_id = %action.id, source = %source, "Source evidence not in graph");
            }
        }

        Ok(ActionResult {
            evidence_ids: vec![node_id],
            confidence: output.confidence,
            risk_indicators: output.risk_indicators,
            summary: format!("{} on {}", capability, target),
            tokens_used: 0,
            cost: 0.0,
        })
    }

    async fn execute_analysis(
        &self,
        plan: &InvestigationPlan,
        action: &PlannedAction,
        focus: &str,
        evidence_ids: &[String],
        graph: &SharedGraph,
        cancel: &CancelSignal,
    ) -> Result<ActionResult, ActionError> {
        let (referenced, evidence) = graph.read(|g| {
            let ids: Vec<String> = if evidence_ids.is_empty() {
                g.nodes()
                    .iter()
                    .filter(|n| n.kind.starts_with("raw_"))
                    .map(|n| n.id.clone())
                    .collect()
            } else {
                evidence_ids.iter().filter(|id| g.contains(id)).cloned().collect()
            };
            let evidence: Vec<Value> = ids
                .iter()
                .filter_map(|id| g.node(id))
                .map(|n| json!({ "id": n.id, "kind": n.kind, "payload": n.payload }))
                .collect();
            (ids, evidence)
        });

        let prompt = format!("{}\n\nFocus: {}", ANALYSIS_PROMPT, focus);
        let context = json!({
            "investigation_id": plan.id,
            "investigation_type": plan.investigation_type,
            "focus": focus,
            "evidence": evidence,
            "known_risk_indicators": plan.risk.indicators,
        });

        let consensus = self
            .consensus
            .query::<ActionError>(&self.gateway, &prompt, &context, cancel)
            .await?;

        record_finding(action, focus, &consensus, &referenced, graph)
    }

    async fn execute_oracle_query(
        &self,
        plan: &InvestigationPlan,
        action: &PlannedAction,
        prompt: &str,
        oracles: Option<&[String]>,
        graph: &SharedGraph,
        cancel: &CancelSignal,
    ) -> Result<ActionResult, ActionError> {
        let (referenced, evidence) = graph.read(|g| {
            let raw: Vec<String> = g
                .nodes()
                .iter()
                .filter(|n| n.kind.starts_with("raw_"))
                .map(|n| n.id.clone())
                .collect();
            let evidence: Vec<Value> = g
                .nodes()
                .iter()
                .map(|n| json!({ "id": n.id, "kind": n.kind }))
                .collect();
            (raw, evidence)
        });

        let context = json!({
            "investigation_id": plan.id,
            "investigation_type": plan.investigation_type,
            "risk": plan.risk,
            "evidence": evidence,
        });

        let consensus = self
            .consensus
            .query_subset::<ActionError>(&self.gateway, prompt, &context, oracles, cancel)
            .await?;

        record_finding(action, prompt, &consensus, &referenced, graph)
    }

    // ========================================================================
    // Adaptation
    // ========================================================================

    /// Weak or alarming results trigger a strategy re-query.
    pub fn should_adapt(&self, result: &ActionResult, plan: &InvestigationPlan) -> bool {
        result.confidence < self.config.adaptation_threshold
            || !plan.risk.new_indicators(&result.risk_indicators).is_empty()
    }

    /// Re-query the strategy and append whatever it proposes.
    ///
    /// A cancelled query records nothing and leaves the plan in `Adapting`
    /// for the caller to terminate.
    #[allow(clippy::too_many_arguments)]
    async fn adapt<F>(
        &self,
        plan: &mut InvestigationPlan,
        after_action: &str,
        trigger: String,
        result: &ActionResult,
        graph: &SharedGraph,
        cancel: &CancelSignal,
        progress: &F,
    ) -> AdaptOutcome
    where
        F: Fn(&InvestigationPlan) + Send + Sync,
    {
        if plan.resources.adaptations_exhausted() {
            debug!(
                investigation_id = %plan.id,
                adaptations = plan.resources.adaptations_used,
                "Adaptation budget spent, not re-planning"
            );
            return AdaptOutcome::Skipped;
        }

        plan.set_phase(Phase::Adapting);
        progress(&*plan);
        info!(investigation_id = %plan.id, trigger = %trigger, "Adapting investigation");

        let context = json!({
            "investigation_id": plan.id,
            "investigation_type": plan.investigation_type,
            "trigger": trigger,
            "last_result": result,
            "risk": plan.risk,
            "completed_actions": plan
                .completed_actions
                .iter()
                .map(|a| json!({ "id": a.id, "action": a.kind, "status": a.status }))
                .collect::<Vec<_>>(),
            "remaining_actions": plan.planned_actions.len(),
            "evidence_nodes": graph.read(|g| g.node_count()),
            "capabilities": self.capabilities.names(),
        });

        let (added_actions, confidence) = match self
            .consensus
            .query::<PlannerError>(&self.gateway, ADAPT_INVESTIGATION_PROMPT, &context, cancel)
            .await
        {
            Ok(consensus) => {
                plan.resources.tokens_used += consensus.tokens_used();
                plan.resources.cost_spent += consensus.cost_estimate();
                let added = parse_strategy(&consensus.consensus_decision)
                    .map(|parsed| plan.enqueue(parsed.actions))
                    .unwrap_or_default();
                (added, consensus.final_confidence)
            }
            Err(PlannerError::Oracle(OracleError::Cancelled)) => {
                info!(investigation_id = %plan.id, "Adaptation cancelled");
                return AdaptOutcome::Cancelled;
            }
            Err(e) => {
                warn!(investigation_id = %plan.id, error = %e, "Adaptation query failed");
                (Vec::new(), 0.0)
            }
        };

        plan.resources.adaptations_used += 1;
        plan.adaptation_history.push(Adaptation {
            timestamp: Utc::now(),
            after_action: after_action.to_string(),
            trigger,
            added_actions,
            confidence,
        });
        plan.set_phase(Phase::Executing);
        progress(&*plan);
        AdaptOutcome::Adapted
    }

    // ========================================================================
    // Continuation
    // ========================================================================

    /// Budget checks first, then an autonomy-gated continuation decision.
    pub async fn decide_continue(
        &self,
        plan: &InvestigationPlan,
        graph: &SharedGraph,
        cancel: &CancelSignal,
    ) -> Continuation {
        let resources = &plan.resources;
        if resources.actions_exhausted() {
            return Continuation::stop(
                Phase::Completed,
                TerminationReason::BudgetExhausted,
                format!("{} of {} actions used", resources.actions_used, resources.max_actions),
            );
        }
        let elapsed = plan.elapsed_secs();
        if elapsed >= resources.time_budget_secs {
            return Continuation::stop(
                Phase::Completed,
                TerminationReason::TimeExhausted,
                format!("{}s of {}s used", elapsed, resources.time_budget_secs),
            );
        }
        if plan.planned_actions.is_empty() {
            return Continuation::stop(
                Phase::Completed,
                TerminationReason::PlanExhausted,
                "no actions left",
            );
        }

        let recent_evidence: Vec<String> = plan
            .completed_actions
            .iter()
            .rev()
            .find_map(|a| a.result.as_ref())
            .map(|r| r.evidence_ids.clone())
            .unwrap_or_default();

        let context = DecisionContext::new(format!(
            "Investigation {} has finished {} actions with {} queued. Should it continue?",
            plan.id,
            plan.completed_actions.len(),
            plan.planned_actions.len()
        ))
        .for_investigation(&plan.id)
        .with_evidence(recent_evidence)
        .with_data(json!({
            "confidence_score": plan.confidence_score,
            "risk": plan.risk,
            "resources": plan.resources,
            "next_action": plan.planned_actions.front().map(|a| &a.kind),
            "evidence_nodes": graph.read(|g| g.node_count()),
            "elapsed_secs": elapsed,
        }));

        match self
            .recorder
            .make_decision(DecisionType::InvestigationContinuation, context, cancel)
            .await
        {
            Ok(decision) => match parse_continuation(&decision.outcome) {
                ContinuationOutcome::Continue => Continuation::Continue,
                ContinuationOutcome::Complete => Continuation::stop(
                    Phase::Completed,
                    TerminationReason::DecisionComplete,
                    decision.reasoning,
                ),
                ContinuationOutcome::Pause => Continuation::stop(
                    Phase::Paused,
                    TerminationReason::DecisionPause,
                    decision.reasoning,
                ),
                ContinuationOutcome::Abort => Continuation::stop(
                    Phase::Aborted,
                    TerminationReason::DecisionAbort,
                    decision.reasoning,
                ),
            },
            Err(e @ DecisionError::PermissionDenied { .. }) => Continuation::stop(
                Phase::Paused,
                TerminationReason::PermissionDenied,
                e.to_string(),
            ),
            Err(DecisionError::Oracle(OracleError::Cancelled)) => Continuation::stop(
                Phase::Aborted,
                TerminationReason::Cancelled,
                "cancelled during continuation decision",
            ),
            Err(e) => Continuation::stop(
                Phase::Paused,
                TerminationReason::DecisionUnavailable,
                e.to_string(),
            ),
        }
    }
}

impl std::fmt::Debug for InvestigationPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvestigationPlanner")
            .field("gateway", &self.gateway)
            .field("capabilities", &self.capabilities)
            .field("config", &self.config)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContinuationOutcome {
    Continue,
    Complete,
    Pause,
    Abort,
}

/// Map a free-text decision onto the four outcomes; unknown text continues.
fn parse_continuation(outcome: &str) -> ContinuationOutcome {
    let lowered = outcome.trim().to_lowercase();
    if lowered.starts_with("abort") {
        ContinuationOutcome::Abort
    } else if lowered.starts_with("pause") {
        ContinuationOutcome::Pause
    } else if lowered.starts_with("complete") || lowered.starts_with("stop") {
        ContinuationOutcome::Complete
    } else {
        ContinuationOutcome::Continue
    }
}

/// Check input and assign node ids to items.
fn validate(investigation_id: &str, items: Vec<EvidenceItem>) -> PlannerResult<Vec<SeededItem>> {
    if investigation_id.trim().is_empty() {
        return Err(PlannerError::Validation {
            field: "investigation_id".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if items.is_empty() {
        return Err(PlannerError::Validation {
            field: "evidence_items".to_string(),
            reason: "at least one item is required".to_string(),
        });
    }

    let mut seen = HashSet::new();
    let mut seeded = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if item.content.trim().is_empty() {
            return Err(PlannerError::Validation {
                field: format!("evidence_items[{}].content", index),
                reason: "must not be blank".to_string(),
            });
        }
        let node_id = item
            .id
            .unwrap_or_else(|| format!("item-{}", index + 1));
        if !seen.insert(node_id.clone()) {
            return Err(PlannerError::Validation {
                field: format!("evidence_items[{}].id", index),
                reason: format!("duplicate id {}", node_id),
            });
        }
        seeded.push(SeededItem {
            node_id,
            kind: item.kind,
            content: item.content,
        });
    }
    Ok(seeded)
}

/// Write an oracle finding (and its dissent) into the graph.
fn record_finding(
    action: &PlannedAction,
    focus: &str,
    consensus: &ConsensusResult,
    referenced: &[String],
    graph: &SharedGraph,
) -> Result<ActionResult, ActionError> {
    let parsed = parse_json_completion(&consensus.consensus_decision);
    let finding = parsed
        .as_ref()
        .and_then(|v| v.get("finding"))
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| consensus.consensus_decision.clone());
    let risk_indicators: Vec<String> = parsed
        .as_ref()
        .and_then(|v| v.get("risk_indicators"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let node_id = format!("{}:analysis", action.id);
    graph.add_evidence(
        EvidenceNode::new(
            &node_id,
            "analysis",
            json!({
                "focus": focus,
                "finding": finding,
                "oracle": consensus.consensus_oracle,
                "oracles_consulted": consensus.oracles_consulted(),
                "agreement_score": consensus.agreement_score,
            }),
        )
        .with_confidence(consensus.final_confidence)
        .with_quality(consensus.agreement_score),
    )?;

    for id in referenced {
        graph.add_relationship(
            &node_id,
            id,
            RelationshipKind::References,
            consensus.final_confidence,
            json!({}),
        )?;
    }

    let mut evidence_ids = vec![node_id.clone()];
    for (index, dissent) in consensus.dissenting_opinions.iter().enumerate() {
        let dissent_id = format!("{}:dissent-{}", action.id, index + 1);
        graph.add_evidence(
            EvidenceNode::new(
                &dissent_id,
                "dissenting_opinion",
                json!({
                    "oracle": dissent.oracle,
                    "output": dissent.output,
                    "confidence": dissent.confidence,
                }),
            )
            .with_confidence(dissent.confidence),
        )?;
        graph.add_relationship(
            &dissent_id,
            &node_id,
            RelationshipKind::Contradicts,
            (dissent.confidence - consensus.mean_confidence).abs(),
            json!({ "oracle": dissent.oracle }),
        )?;
        evidence_ids.push(dissent_id);
    }

    Ok(ActionResult {
        evidence_ids,
        confidence: consensus.final_confidence,
        risk_indicators,
        summary: finding.chars().take(SUMMARY_CHARS).collect(),
        tokens_used: consensus.tokens_used(),
        cost: consensus.cost_estimate(),
    })
}

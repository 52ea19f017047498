use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RecoveryStrategy;
use crate::config::PlannerConfig;
use crate::graph::GraphExport;

// ============================================================================
// Investigation Input
// ============================================================================

/// Kind of a submitted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Url,
    Message,
    Email,
    Image,
    Domain,
    Phone,
    Document,
    Text,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Url => "url",
            EvidenceKind::Message => "message",
            EvidenceKind::Email => "email",
            EvidenceKind::Image => "image",
            EvidenceKind::Domain => "domain",
            EvidenceKind::Phone => "phone",
            EvidenceKind::Document => "document",
            EvidenceKind::Text => "text",
        }
    }

    /// Whether the artifact carries free text that can mention other artifacts.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            EvidenceKind::Message | EvidenceKind::Email | EvidenceKind::Document | EvidenceKind::Text
        )
    }
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EvidenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "url" => Ok(EvidenceKind::Url),
            "message" => Ok(EvidenceKind::Message),
            "email" => Ok(EvidenceKind::Email),
            "image" => Ok(EvidenceKind::Image),
            "domain" => Ok(EvidenceKind::Domain),
            "phone" => Ok(EvidenceKind::Phone),
            "document" => Ok(EvidenceKind::Document),
            "text" => Ok(EvidenceKind::Text),
            _ => Err(format!("Unknown evidence kind: {}", s)),
        }
    }
}

/// A raw artifact submitted for investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Caller-chosen id; generated as `item-<n>` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub kind: EvidenceKind,
    pub content: String,
}

impl EvidenceItem {
    pub fn new(kind: EvidenceKind, content: impl Into<String>) -> Self {
        Self {
            id: None,
            kind,
            content: content.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// What the investigation is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationType {
    Phishing,
    Scam,
    Fraud,
    Impersonation,
    General,
}

impl InvestigationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationType::Phishing => "phishing",
            InvestigationType::Scam => "scam",
            InvestigationType::Fraud => "fraud",
            InvestigationType::Impersonation => "impersonation",
            InvestigationType::General => "general",
        }
    }
}

impl std::str::FromStr for InvestigationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "phishing" => Ok(InvestigationType::Phishing),
            "scam" => Ok(InvestigationType::Scam),
            "fraud" => Ok(InvestigationType::Fraud),
            "impersonation" => Ok(InvestigationType::Impersonation),
            "general" => Ok(InvestigationType::General),
            _ => Err(format!("Unknown investigation type: {}", s)),
        }
    }
}

/// Investigation priority; scales the resource allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Budget multiplier relative to `Normal`.
    fn budget_factor(&self) -> f64 {
        match self {
            Priority::Low => 0.5,
            Priority::Normal => 1.0,
            Priority::High => 1.5,
            Priority::Critical => 3.0,
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" | "medium" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

// ============================================================================
// Plan State
// ============================================================================

/// Investigation lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Initializing,
    Planning,
    Executing,
    Adapting,
    Paused,
    Completed,
    Aborted,
}

impl Phase {
    /// Paused, Completed and Aborted accept no further actions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Paused | Phase::Completed | Phase::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initializing => "INITIALIZING",
            Phase::Planning => "PLANNING",
            Phase::Executing => "EXECUTING",
            Phase::Adapting => "ADAPTING",
            Phase::Paused => "PAUSED",
            Phase::Completed => "COMPLETED",
            Phase::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INITIALIZING" => Ok(Phase::Initializing),
            "PLANNING" => Ok(Phase::Planning),
            "EXECUTING" => Ok(Phase::Executing),
            "ADAPTING" => Ok(Phase::Adapting),
            "PAUSED" => Ok(Phase::Paused),
            "COMPLETED" => Ok(Phase::Completed),
            "ABORTED" => Ok(Phase::Aborted),
            _ => Err(format!("Unknown phase: {}", s)),
        }
    }
}

/// Lifecycle of a single planned action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Planned,
    Executing,
    Completed,
    Failed,
    Skipped,
}

/// What an action does, with a typed payload per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Free-form question to the oracle panel (or a subset of it).
    OracleQuery {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        oracles: Option<Vec<String>>,
    },
    /// Call to an external capability such as OCR or domain analysis.
    CapabilityCall {
        capability: String,
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_evidence: Option<String>,
        #[serde(default)]
        options: serde_json::Value,
    },
    /// Oracle analysis of evidence already in the graph.
    AiAnalysis {
        focus: String,
        #[serde(default)]
        evidence_ids: Vec<String>,
    },
}

impl ActionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::OracleQuery { .. } => "oracle_query",
            ActionKind::CapabilityCall { .. } => "capability_call",
            ActionKind::AiAnalysis { .. } => "ai_analysis",
        }
    }
}

/// Outcome of a successfully executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Evidence nodes written by the action.
    pub evidence_ids: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub risk_indicators: Vec<String>,
    pub summary: String,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub cost: f64,
}

/// One step of the investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub id: String,
    pub kind: ActionKind,
    pub status: ActionStatus,
    /// Critical actions abort the investigation when they cannot be completed.
    #[serde(default)]
    pub critical: bool,
    /// Execution attempts so far.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Recovery applied after the last failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryStrategy>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PlannedAction {
    pub fn new(id: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: ActionStatus::Planned,
            critical: false,
            attempts: 0,
            result: None,
            error: None,
            recovery: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }
}

/// Coarse risk bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.75 {
            RiskLevel::Critical
        } else if score >= 0.5 {
            RiskLevel::High
        } else if score >= 0.25 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Risk snapshot carried by the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// 0.0-1.0
    pub score: f64,
    /// Distinct indicators seen so far, in discovery order.
    pub indicators: Vec<String>,
}

/// Score contributed by each distinct indicator.
const INDICATOR_WEIGHT: f64 = 0.15;

impl Default for RiskAssessment {
    fn default() -> Self {
        Self::from_indicators(Vec::new())
    }
}

impl RiskAssessment {
    pub fn from_indicators(indicators: Vec<String>) -> Self {
        let mut assessment = Self {
            level: RiskLevel::Low,
            score: 0.0,
            indicators: Vec::new(),
        };
        assessment.absorb(&indicators);
        assessment
    }

    /// Indicators in `candidates` not yet known, deduplicated.
    pub fn new_indicators(&self, candidates: &[String]) -> Vec<String> {
        let mut fresh: Vec<String> = Vec::new();
        for candidate in candidates {
            let normalized = candidate.trim().to_lowercase();
            if normalized.is_empty() {
                continue;
            }
            if !self.indicators.contains(&normalized) && !fresh.contains(&normalized) {
                fresh.push(normalized);
            }
        }
        fresh
    }

    /// Merge indicators and recompute score and level.
    pub fn absorb(&mut self, indicators: &[String]) {
        let fresh = self.new_indicators(indicators);
        self.indicators.extend(fresh);
        self.score = (self.indicators.len() as f64 * INDICATOR_WEIGHT).min(1.0);
        self.level = RiskLevel::from_score(self.score);
    }
}

/// Budget for one investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub max_actions: u32,
    pub actions_used: u32,
    pub max_adaptations: u32,
    pub adaptations_used: u32,
    pub time_budget_secs: u64,
    pub oracle_count: usize,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub cost_spent: f64,
}

/// Actions allowed at `Normal` priority.
const BASE_MAX_ACTIONS: f64 = 10.0;

impl ResourceAllocation {
    /// Scale the configured budget by priority.
    pub fn for_priority(priority: Priority, config: &PlannerConfig, oracle_count: usize) -> Self {
        let factor = priority.budget_factor();
        Self {
            max_actions: (BASE_MAX_ACTIONS * factor).round() as u32,
            actions_used: 0,
            max_adaptations: config.max_adaptations,
            adaptations_used: 0,
            time_budget_secs: (config.time_budget_secs as f64 * factor).round() as u64,
            oracle_count,
            tokens_used: 0,
            cost_spent: 0.0,
        }
    }

    pub fn actions_exhausted(&self) -> bool {
        self.actions_used >= self.max_actions
    }

    pub fn adaptations_exhausted(&self) -> bool {
        self.adaptations_used >= self.max_adaptations
    }
}

/// A strategy re-query triggered by a weak or alarming result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adaptation {
    pub timestamp: DateTime<Utc>,
    /// Action whose result triggered the adaptation.
    pub after_action: String,
    pub trigger: String,
    /// Ids of appended actions (possibly none).
    pub added_actions: Vec<String>,
    /// Consensus confidence of the new strategy; zero when the re-query failed.
    pub confidence: f64,
}

/// Why an investigation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Queue drained normally.
    PlanExhausted,
    BudgetExhausted,
    TimeExhausted,
    /// Continuation decision said the evidence suffices.
    DecisionComplete,
    /// Continuation decision asked for an operator.
    DecisionPause,
    /// Continuation decision asked to stop.
    DecisionAbort,
    /// Autonomy level forbids deciding to continue.
    PermissionDenied,
    /// Continuation decision could not be made.
    DecisionUnavailable,
    Cancelled,
    /// A failed action was classified as abort.
    ActionAborted,
}

/// Terminal record attached to a finished plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Termination {
    pub reason: TerminationReason,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// The mutable record of one investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationPlan {
    pub id: String,
    pub investigation_type: InvestigationType,
    pub priority: Priority,
    pub phase: Phase,
    /// Queue of actions still to run, in order.
    pub planned_actions: VecDeque<PlannedAction>,
    /// Append-only audit list of finished actions (completed, skipped or failed).
    pub completed_actions: Vec<PlannedAction>,
    pub risk: RiskAssessment,
    pub resources: ResourceAllocation,
    pub adaptation_history: Vec<Adaptation>,
    pub confidence_score: f64,
    /// Strategy rationale from the planning consensus, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
    /// Sequence for action ids.
    #[serde(default)]
    pub action_seq: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvestigationPlan {
    pub fn new(
        id: impl Into<String>,
        investigation_type: InvestigationType,
        priority: Priority,
        resources: ResourceAllocation,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            investigation_type,
            priority,
            phase: Phase::Initializing,
            planned_actions: VecDeque::new(),
            completed_actions: Vec::new(),
            risk: RiskAssessment::default(),
            resources,
            adaptation_history: Vec::new(),
            confidence_score: 0.0,
            strategy_rationale: None,
            termination: None,
            action_seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Next action id, unique within the plan.
    pub fn next_action_id(&mut self) -> String {
        self.action_seq += 1;
        format!("action-{}", self.action_seq)
    }

    /// Append actions to the end of the queue, assigning fresh ids.
    pub fn enqueue(&mut self, actions: Vec<(ActionKind, bool)>) -> Vec<String> {
        let mut ids = Vec::with_capacity(actions.len());
        for (kind, critical) in actions {
            let id = self.next_action_id();
            ids.push(id.clone());
            self.planned_actions
                .push_back(PlannedAction::new(id, kind).critical(critical));
        }
        self.touch();
        ids
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Mean confidence over completed results, or the strategy confidence
    /// before anything has completed.
    pub fn cumulative_confidence(&self) -> f64 {
        let confidences: Vec<f64> = self
            .completed_actions
            .iter()
            .filter_map(|a| a.result.as_ref().map(|r| r.confidence))
            .collect();
        if confidences.is_empty() {
            self.confidence_score
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        }
    }

    /// Seconds since the plan was created.
    pub fn elapsed_secs(&self) -> u64 {
        (Utc::now() - self.created_at).num_seconds().max(0) as u64
    }

    /// Whether the plan reached a terminal phase.
    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// A plan together with its evidence graph, as handed to report consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub plan: InvestigationPlan,
    pub graph: GraphExport,
}

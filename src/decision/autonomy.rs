use serde::{Deserialize, Serialize};

/// How much the orchestrator may decide without operator approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Every decision needs an operator.
    Manual,
    /// Only model selection is automatic.
    Assisted,
    /// Everything except resource allocation is automatic.
    SemiAutonomous,
    /// Everything is automatic.
    FullyAutonomous,
}

/// Kinds of decisions the recorder can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    InvestigationStrategy,
    ModelSelection,
    ResourceAllocation,
    RiskAssessment,
    EvidencePrioritization,
    InvestigationContinuation,
}

impl DecisionType {
    pub const ALL: [DecisionType; 6] = [
        DecisionType::InvestigationStrategy,
        DecisionType::ModelSelection,
        DecisionType::ResourceAllocation,
        DecisionType::RiskAssessment,
        DecisionType::EvidencePrioritization,
        DecisionType::InvestigationContinuation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::InvestigationStrategy => "investigation_strategy",
            DecisionType::ModelSelection => "model_selection",
            DecisionType::ResourceAllocation => "resource_allocation",
            DecisionType::RiskAssessment => "risk_assessment",
            DecisionType::EvidencePrioritization => "evidence_prioritization",
            DecisionType::InvestigationContinuation => "investigation_continuation",
        }
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DecisionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        DecisionType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("Unknown decision type: {}", s))
    }
}

impl AutonomyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyLevel::Manual => "manual",
            AutonomyLevel::Assisted => "assisted",
            AutonomyLevel::SemiAutonomous => "semi_autonomous",
            AutonomyLevel::FullyAutonomous => "fully_autonomous",
        }
    }

    /// The fixed permission table.
    pub fn permits(&self, decision_type: DecisionType) -> bool {
        match self {
            AutonomyLevel::Manual => false,
            AutonomyLevel::Assisted => decision_type == DecisionType::ModelSelection,
            AutonomyLevel::SemiAutonomous => decision_type != DecisionType::ResourceAllocation,
            AutonomyLevel::FullyAutonomous => true,
        }
    }
}

impl std::fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AutonomyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "manual" => Ok(AutonomyLevel::Manual),
            "assisted" => Ok(AutonomyLevel::Assisted),
            "semi_autonomous" => Ok(AutonomyLevel::SemiAutonomous),
            "fully_autonomous" => Ok(AutonomyLevel::FullyAutonomous),
            _ => Err(format!("Unknown autonomy level: {}", s)),
        }
    }
}

use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Planner error: {0}")]
    Planner(#[from] PlannerError),

    #[error("Decision error: {0}")]
    Decision(#[from] DecisionError),

    #[error("Investigation not found: {investigation_id}")]
    InvestigationNotFound { investigation_id: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Evidence graph errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Evidence already exists: {id}")]
    AlreadyExists { id: String },

    #[error("Unknown evidence node: {id}")]
    UnknownNode { id: String },

    #[error("Invalid relationship type: {kind}")]
    InvalidRelationship { kind: String },

    #[error("Self-referencing relationship on node: {id}")]
    SelfLoop { id: String },
}

/// Oracle gateway errors
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("All oracles failed ({attempted} attempted)")]
    AllOraclesFailed { attempted: usize },

    #[error("Oracle {oracle} timed out after {timeout_ms}ms")]
    Timeout { oracle: String, timeout_ms: u64 },

    #[error("Oracle call cancelled")]
    Cancelled,

    #[error("Oracle {oracle} unavailable: {message} (retries: {retries})")]
    Unavailable {
        oracle: String,
        message: String,
        retries: u32,
    },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Consensus computation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("Consensus requires at least one oracle response")]
    NoResponses,
}

/// External capability errors.
///
/// The variant is the classification used by recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("Transient capability failure in {capability}: {message}")]
    Transient { capability: String, message: String },

    #[error("Capability unavailable: {capability}")]
    Unavailable { capability: String },

    #[error("Invalid input for {capability}: {message}")]
    InvalidInput { capability: String, message: String },

    #[error("Fatal capability failure in {capability}: {message}")]
    Fatal { capability: String, message: String },
}

/// Investigation planner errors
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Strategy query failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Strategy consensus failed: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("Evidence graph rejected seed: {0}")]
    Graph(#[from] GraphError),
}

/// Failure while executing one planned action.
///
/// Classified by the planner's recovery policy; never returned to callers.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Capability failed: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Oracle query failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Consensus failed: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("Evidence graph rejected result: {0}")]
    Graph(#[from] GraphError),

    #[error("Action cancelled")]
    Cancelled,
}

/// Decision recorder errors
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("Permission denied: {decision_type} not allowed at autonomy level {autonomy_level}")]
    PermissionDenied {
        decision_type: String,
        autonomy_level: String,
    },

    #[error("Decision query failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Decision consensus failed: {0}")]
    Consensus(#[from] ConsensusError),
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl From<ConsensusError> for AppError {
    fn from(err: ConsensusError) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for oracle operations
pub type OracleResult<T> = Result<T, OracleError>;

/// Result type alias for capability invocations
pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Result type alias for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;

/// Result type alias for decision operations
pub type DecisionResult<T> = Result<T, DecisionError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

//! Failure classification for planned actions.

use serde::{Deserialize, Serialize};

use crate::error::{ActionError, CapabilityError, OracleError};

/// What to do with an action that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Record the failure and move on.
    Skip,
    /// Run the same action again.
    Retry,
    /// Stop the investigation.
    Abort,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::Skip => "skip",
            RecoveryStrategy::Retry => "retry",
            RecoveryStrategy::Abort => "abort",
        }
    }
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error class as seen by the recovery table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureClass {
    /// Worth another attempt.
    Transient,
    /// Will not succeed on retry but the investigation can go on.
    Permanent,
    /// Nothing sensible to do but stop.
    Fatal,
}

fn classify(error: &ActionError) -> FailureClass {
    match error {
        ActionError::Capability(CapabilityError::Transient { .. }) => FailureClass::Transient,
        ActionError::Capability(CapabilityError::Unavailable { .. })
        | ActionError::Capability(CapabilityError::InvalidInput { .. }) => FailureClass::Permanent,
        ActionError::Capability(CapabilityError::Fatal { .. }) => FailureClass::Fatal,
        ActionError::Oracle(OracleError::AllOraclesFailed { .. })
        | ActionError::Oracle(OracleError::Timeout { .. })
        | ActionError::Oracle(OracleError::Unavailable { .. }) => FailureClass::Transient,
        ActionError::Oracle(_) | ActionError::Consensus(_) | ActionError::Graph(_) => {
            FailureClass::Fatal
        }
        ActionError::Cancelled => FailureClass::Fatal,
    }
}

/// Pick the recovery for a failed action.
///
/// `attempts` counts executions so far, including the one that just failed.
pub fn recovery_strategy(
    error: &ActionError,
    critical: bool,
    attempts: u32,
    max_retries: u32,
) -> RecoveryStrategy {
    let give_up = if critical {
        RecoveryStrategy::Abort
    } else {
        RecoveryStrategy::Skip
    };

    match classify(error) {
        FailureClass::Transient if attempts <= max_retries => RecoveryStrategy::Retry,
        FailureClass::Transient | FailureClass::Permanent => give_up,
        FailureClass::Fatal => RecoveryStrategy::Abort,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConsensusError, GraphError};

    fn transient() -> ActionError {
        ActionError::Capability(CapabilityError::Transient {
            capability: "web_intelligence".to_string(),
            message: "503".to_string(),
        })
    }

    #[test]
    fn test_transient_retries_until_exhausted() {
        assert_eq!(recovery_strategy(&transient(), false, 1, 2), RecoveryStrategy::Retry);
        assert_eq!(recovery_strategy(&transient(), false, 2, 2), RecoveryStrategy::Retry);
        assert_eq!(recovery_strategy(&transient(), false, 3, 2), RecoveryStrategy::Skip);
        assert_eq!(recovery_strategy(&transient(), true, 3, 2), RecoveryStrategy::Abort);
    }

    #[test]
    fn test_zero_retries_never_retries() {
        assert_eq!(recovery_strategy(&transient(), false, 1, 0), RecoveryStrategy::Skip);
    }

    #[test]
    fn test_oracle_outage_is_transient() {
        let err = ActionError::Oracle(OracleError::AllOraclesFailed { attempted: 3 });
        assert_eq!(recovery_strategy(&err, false, 1, 1), RecoveryStrategy::Retry);
        let err = ActionError::Oracle(OracleError::Timeout {
            oracle: "a".to_string(),
            timeout_ms: 10,
        });
        assert_eq!(recovery_strategy(&err, true, 2, 1), RecoveryStrategy::Abort);
    }

    #[test]
    fn test_permanent_failures_skip_or_abort() {
        let unavailable = ActionError::Capability(CapabilityError::Unavailable {
            capability: "ocr".to_string(),
        });
        assert_eq!(recovery_strategy(&unavailable, false, 1, 3), RecoveryStrategy::Skip);
        assert_eq!(recovery_strategy(&unavailable, true, 1, 3), RecoveryStrategy::Abort);

        let invalid = ActionError::Capability(CapabilityError::InvalidInput {
            capability: "ocr".to_string(),
            message: "not an image".to_string(),
        });
        assert_eq!(recovery_strategy(&invalid, false, 1, 3), RecoveryStrategy::Skip);
    }

    #[test]
    fn test_fatal_and_unclassified_abort() {
        let fatal = ActionError::Capability(CapabilityError::Fatal {
            capability: "ocr".to_string(),
            message: "corrupt".to_string(),
        });
        assert_eq!(recovery_strategy(&fatal, false, 1, 3), RecoveryStrategy::Abort);

        let graph = ActionError::Graph(GraphError::AlreadyExists {
            id: "x".to_string(),
        });
        assert_eq!(recovery_strategy(&graph, false, 1, 3), RecoveryStrategy::Abort);

        let consensus = ActionError::Consensus(ConsensusError::NoResponses);
        assert_eq!(recovery_strategy(&consensus, false, 1, 3), RecoveryStrategy::Abort);
    }
}

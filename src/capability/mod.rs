//! External capability collaborators (web intelligence, OCR, domain analysis).
//!
//! Concrete scrapers and OCR engines live outside this crate; the planner
//! only sees the [`Capability`] contract and a name-keyed
//! [`CapabilityRegistry`]. [`OracleCapability`] routes a capability to the
//! oracle panel when no dedicated backend is registered.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::completion::parse_json_completion;
use crate::consensus::ConsensusEngine;
use crate::error::{CapabilityError, CapabilityResult, ConsensusError, OracleError};
use crate::oracle::{CancelSignal, OracleGateway};

/// Well-known capability names.
pub const WEB_INTELLIGENCE: &str = "web_intelligence";
pub const DOMAIN_ANALYSIS: &str = "domain_analysis";
pub const OCR: &str = "ocr";

/// A single capability invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    /// Registered capability name.
    pub capability: String,
    /// What to examine (URL, domain, image reference, ...).
    pub target: String,
    /// Capability-specific options.
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Structured result of a capability call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutput {
    pub data: serde_json::Value,
    /// Confidence in the result (0.0-1.0).
    pub confidence: f64,
    /// Risk indicators surfaced by the call.
    #[serde(default)]
    pub risk_indicators: Vec<String>,
}

impl CapabilityOutput {
    pub fn new(data: serde_json::Value, confidence: f64) -> Self {
        Self {
            data,
            confidence: confidence.clamp(0.0, 1.0),
            risk_indicators: Vec::new(),
        }
    }

    pub fn with_risk_indicators(mut self, indicators: Vec<String>) -> Self {
        self.risk_indicators = indicators;
        self
    }
}

/// An external capability.
///
/// Errors must be classified into a [`CapabilityError`] variant; the planner's
/// recovery policy depends on it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Capability: Send + Sync {
    async fn invoke(&self, request: &CapabilityRequest) -> CapabilityResult<CapabilityOutput>;
}

/// Name-keyed set of capabilities.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a capability under `name`.
    pub fn register(mut self, name: impl Into<String>, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.insert(name.into(), capability);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch a request. Unregistered names fail with `Unavailable`.
    pub async fn invoke(&self, request: &CapabilityRequest) -> CapabilityResult<CapabilityOutput> {
        let capability = self.capabilities.get(&request.capability).ok_or_else(|| {
            warn!(capability = %request.capability, "Capability not registered");
            CapabilityError::Unavailable {
                capability: request.capability.clone(),
            }
        })?;

        debug!(capability = %request.capability, target = %request.target, "Invoking capability");
        capability.invoke(request).await
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}

// ============================================================================
// Oracle-backed capability
// ============================================================================

/// Capability answered by the oracle panel instead of a dedicated backend.
pub struct OracleCapability {
    gateway: OracleGateway,
    consensus: ConsensusEngine,
}

impl OracleCapability {
    pub fn new(gateway: OracleGateway) -> Self {
        Self {
            gateway,
            consensus: ConsensusEngine::new(),
        }
    }
}

#[async_trait]
impl Capability for OracleCapability {
    async fn invoke(&self, request: &CapabilityRequest) -> CapabilityResult<CapabilityOutput> {
        let prompt = format!(
            "Perform {} on the target and report findings as JSON with \"finding\", \"risk_indicators\" and \"confidence\".\n\nTarget: {}",
            request.capability, request.target
        );
        let context = serde_json::json!({ "options": request.options });

        // Cancellation is applied by the caller dropping this future.
        let never = CancelSignal::new();
        let result = self
            .consensus
            .query::<OracleCapabilityError>(&self.gateway, &prompt, &context, &never)
            .await
            .map_err(|e| CapabilityError::Transient {
                capability: request.capability.clone(),
                message: e.0,
            })?;

        let parsed = parse_json_completion(&result.consensus_decision);
        let risk_indicators = parsed
            .as_ref()
            .and_then(|v| v.get("risk_indicators"))
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(CapabilityOutput::new(
            parsed.unwrap_or_else(|| serde_json::json!({ "finding": result.consensus_decision })),
            result.final_confidence,
        )
        .with_risk_indicators(risk_indicators))
    }
}

/// Flattened failure from the oracle panel.
struct OracleCapabilityError(String);

impl From<OracleError> for OracleCapabilityError {
    fn from(err: OracleError) -> Self {
        Self(err.to_string())
    }
}

impl From<ConsensusError> for OracleCapabilityError {
    fn from(err: ConsensusError) -> Self {
        Self(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(capability: &str) -> CapabilityRequest {
        CapabilityRequest {
            capability: capability.to_string(),
            target: "example.com".to_string(),
            options: json!({}),
        }
    }

    #[tokio::test]
    async fn test_registry_dispatches_by_name() {
        let mut mock = MockCapability::new();
        mock.expect_invoke()
            .times(1)
            .returning(|req| Ok(CapabilityOutput::new(json!({ "target": req.target }), 0.8)));

        let registry = CapabilityRegistry::new().register(DOMAIN_ANALYSIS, Arc::new(mock));
        let output = registry.invoke(&request(DOMAIN_ANALYSIS)).await.unwrap();
        assert_eq!(output.data["target"], "example.com");
        assert!((output.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_registry_unknown_capability_unavailable() {
        let registry = CapabilityRegistry::new();
        let err = registry.invoke(&request(OCR)).await.unwrap_err();
        assert_eq!(
            err,
            CapabilityError::Unavailable {
                capability: OCR.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_registry_propagates_classified_error() {
        let mut mock = MockCapability::new();
        mock.expect_invoke().returning(|req| {
            Err(CapabilityError::Transient {
                capability: req.capability.clone(),
                message: "rate limited".to_string(),
            })
        });
        let registry = CapabilityRegistry::new().register(WEB_INTELLIGENCE, Arc::new(mock));
        let err = registry.invoke(&request(WEB_INTELLIGENCE)).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Transient { .. }));
    }

    #[test]
    fn test_registry_names_sorted() {
        let registry = CapabilityRegistry::new()
            .register(WEB_INTELLIGENCE, Arc::new(MockCapability::new()))
            .register(DOMAIN_ANALYSIS, Arc::new(MockCapability::new()));
        assert_eq!(registry.names(), vec![DOMAIN_ANALYSIS, WEB_INTELLIGENCE]);
        assert!(registry.contains(DOMAIN_ANALYSIS));
        assert!(!registry.contains(OCR));
    }

    #[test]
    fn test_output_clamps_confidence() {
        assert!((CapabilityOutput::new(json!(null), 3.0).confidence - 1.0).abs() < f64::EPSILON);
    }
}

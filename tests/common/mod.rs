//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use investigation_orchestrator::capability::{Capability, CapabilityOutput, CapabilityRequest};
use investigation_orchestrator::error::{CapabilityResult, OracleError, OracleResult};
use investigation_orchestrator::oracle::{Oracle, OracleGateway, OracleReply, TokenBucket};

/// How a fake oracle answers.
#[derive(Clone)]
pub enum Behaviour {
    /// Answer with `text` (chosen per prompt) and a fixed confidence.
    Reply { confidence: f64, delay: Duration },
    /// Fail every call.
    Fail,
    /// Never answer in any reasonable time.
    Hang,
}

/// Oracle that answers by prompt prefix.
pub struct FakeOracle {
    pub name: String,
    pub behaviour: Behaviour,
    pub plan: String,
    pub decision: String,
    pub fallback: String,
    pub calls: Arc<AtomicUsize>,
}

impl FakeOracle {
    pub fn new(name: &str, confidence: f64) -> Self {
        Self {
            name: name.to_string(),
            behaviour: Behaviour::Reply {
                confidence,
                delay: Duration::ZERO,
            },
            plan: r#"{"actions": [{"type": "ai_analysis", "focus": "overall"}]}"#.to_string(),
            decision: r#"{"decision": "continue", "reasoning": "more to check"}"#.to_string(),
            fallback: format!(r#"{{"finding": "{} looked", "risk_indicators": []}}"#, name),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            behaviour: Behaviour::Fail,
            ..Self::new(name, 0.0)
        }
    }

    pub fn hanging(name: &str) -> Self {
        Self {
            behaviour: Behaviour::Hang,
            ..Self::new(name, 0.0)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        if let Behaviour::Reply { confidence, .. } = self.behaviour {
            self.behaviour = Behaviour::Reply { confidence, delay };
        }
        self
    }

    pub fn with_plan(mut self, plan: &str) -> Self {
        self.plan = plan.to_string();
        self
    }

    pub fn with_decision(mut self, decision: &str) -> Self {
        self.decision = decision.to_string();
        self
    }

    pub fn with_fallback(mut self, text: &str) -> Self {
        self.fallback = text.to_string();
        self
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Oracle for FakeOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, prompt: &str, _context: &Value) -> OracleResult<OracleReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Fail => Err(OracleError::Api {
                status: 500,
                message: format!("{} is down", self.name),
            }),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(OracleError::InvalidResponse {
                    message: "unreachable".to_string(),
                })
            }
            Behaviour::Reply { confidence, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                let text = if prompt.starts_with("Plan an investigation") {
                    &self.plan
                } else if prompt.starts_with("Make the decision") {
                    &self.decision
                } else {
                    &self.fallback
                };
                Ok(OracleReply::new(text.clone(), "fake")
                    .with_confidence(*confidence)
                    .with_usage(10, 0.001))
            }
        }
    }
}

/// Gateway over the given fakes with no rate limiting.
pub fn gateway(oracles: Vec<FakeOracle>, timeout: Duration) -> OracleGateway {
    gateway_with_limiter(oracles, TokenBucket::unlimited(), timeout)
}

pub fn gateway_with_limiter(
    oracles: Vec<FakeOracle>,
    limiter: TokenBucket,
    timeout: Duration,
) -> OracleGateway {
    let oracles: Vec<Arc<dyn Oracle>> = oracles
        .into_iter()
        .map(|o| Arc::new(o) as Arc<dyn Oracle>)
        .collect();
    OracleGateway::new(oracles, Arc::new(limiter), timeout)
}

/// Capability that always succeeds with a fixed confidence.
pub struct StaticCapability {
    pub confidence: f64,
    pub risk_indicators: Vec<String>,
}

#[async_trait]
impl Capability for StaticCapability {
    async fn invoke(&self, request: &CapabilityRequest) -> CapabilityResult<CapabilityOutput> {
        Ok(CapabilityOutput::new(
            serde_json::json!({ "capability": request.capability, "target": request.target }),
            self.confidence,
        )
        .with_risk_indicators(self.risk_indicators.clone()))
    }
}

//! Analysis oracles and the concurrent gateway that fans prompts out to them.
//!
//! - [`Oracle`]: the outbound collaborator contract
//! - [`OracleGateway`]: bounded, timeout-guarded fan-out to N oracles
//! - [`TokenBucket`]: provider rate-limit guard shared by every investigation
//! - [`CancelSignal`]: cooperative cancellation threaded into oracle calls
//! - [`LangbaseOracle`]: HTTP oracle backed by a Langbase pipe

mod cancel;
mod gateway;
mod langbase;
mod rate_limit;

pub use cancel::*;
pub use gateway::*;
pub use langbase::*;
pub use rate_limit::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OracleResult;

/// What an oracle returns for a single prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleReply {
    /// Free-form or JSON findings.
    pub text: String,
    /// Self-reported confidence, if the oracle gives one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<f64>,
    /// Backend that produced the reply.
    pub provider: String,
}

impl OracleReply {
    /// Create a reply with only text.
    pub fn new(text: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
            tokens_used: None,
            cost_estimate: None,
            provider: provider.into(),
        }
    }

    /// Attach a self-reported confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Attach usage metrics.
    pub fn with_usage(mut self, tokens_used: u32, cost_estimate: f64) -> Self {
        self.tokens_used = Some(tokens_used);
        self.cost_estimate = Some(cost_estimate);
        self
    }
}

/// One successful oracle answer as seen by consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleResponse {
    /// Oracle name as configured in the gateway.
    pub oracle: String,
    /// Raw output text.
    pub output: String,
    /// Self-reported confidence; consensus falls back to a text heuristic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl OracleResponse {
    /// Build a response directly (used by tests and replay).
    pub fn new(oracle: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            oracle: oracle.into(),
            output: output.into(),
            confidence: None,
            tokens_used: None,
            cost_estimate: None,
            latency_ms: None,
        }
    }

    /// Attach a self-reported confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub(crate) fn from_reply(oracle: &str, reply: OracleReply, latency_ms: u64) -> Self {
        Self {
            oracle: oracle.to_string(),
            output: reply.text,
            confidence: reply.confidence,
            tokens_used: reply.tokens_used,
            cost_estimate: reply.cost_estimate,
            latency_ms: Some(latency_ms),
        }
    }
}

/// An external analysis backend.
///
/// The gateway assumes nothing beyond this contract.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Stable name used in logs, consensus output and oracle selection.
    fn name(&self) -> &str;

    /// Answer a prompt with supporting context.
    async fn query(&self, prompt: &str, context: &serde_json::Value) -> OracleResult<OracleReply>;
}

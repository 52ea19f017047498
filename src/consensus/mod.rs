//! Multi-oracle consensus.
//!
//! Separates "what the oracles said" from "how much to trust the aggregate":
//! the gateway collects responses, [`ConsensusEngine::consensus`] is a pure
//! function over them.
//!
//! - Confidence per response: the oracle's own figure if present, otherwise a
//!   keyword heuristic over the text (see [`heuristic_confidence`]).
//! - Decision: the most confident response, earliest wins ties.
//! - Agreement: `clamp(1 - variance(confidences), 0, 1)`.
//! - Final confidence: `clamp(mean * agreement, 0, 1)`.
//! - Dissent: responses more than 0.3 away from the mean.


use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConsensusError, OracleError};
use crate::oracle::{CancelSignal, OracleGateway, OracleResponse};

/// Confidence used when neither the oracle nor the heuristic gives one.
pub const DEFAULT_CONFIDENCE: f64 = 0.6;

/// Distance from the mean beyond which a response counts as dissent.
pub const DISSENT_THRESHOLD: f64 = 0.3;

/// Keyword tiers, checked in order; the first tier with a match wins.
const CONFIDENCE_TIERS: &[(&[&str], f64)] = &[
    (&["very confident", "certain"], 0.9),
    (&["confident", "likely"], 0.7),
    (&["possible", "might"], 0.5),
    (&["uncertain", "unclear"], 0.3),
];

/// One response with its resolved confidence and normalised weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedOpinion {
    pub oracle: String,
    pub output: String,
    pub confidence: f64,
    /// `confidence / sum(confidences)`; uniform when every confidence is zero.
    pub weight: f64,
}

/// The combined view of several oracle responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Input responses in gateway order.
    pub responses: Vec<OracleResponse>,
    /// Resolved confidence per response, parallel to `responses`.
    pub confidences: Vec<f64>,
    /// Output of the most confident response.
    pub consensus_decision: String,
    /// Oracle that produced `consensus_decision`.
    pub consensus_oracle: String,
    /// How closely the oracles' confidences agree (0.0-1.0).
    pub agreement_score: f64,
    /// Every opinion weighted by confidence, heaviest first.
    pub confidence_weighted_result: Vec<WeightedOpinion>,
    /// Opinions far from the mean confidence.
    pub dissenting_opinions: Vec<WeightedOpinion>,
    /// Mean confidence discounted by disagreement (0.0-1.0).
    pub final_confidence: f64,
    pub mean_confidence: f64,
}

impl ConsensusResult {
    /// Names of the oracles that contributed.
    pub fn oracles_consulted(&self) -> Vec<String> {
        self.responses.iter().map(|r| r.oracle.clone()).collect()
    }

    /// Total tokens reported by the contributing oracles.
    pub fn tokens_used(&self) -> u64 {
        self.responses
            .iter()
            .filter_map(|r| r.tokens_used)
            .map(u64::from)
            .sum()
    }

    /// Total cost reported by the contributing oracles.
    pub fn cost_estimate(&self) -> f64 {
        self.responses.iter().filter_map(|r| r.cost_estimate).sum()
    }
}

/// Estimate confidence from hedging language.
///
/// Legacy keyword tiers: "very confident"/"certain" 0.9, "confident"/"likely"
/// 0.7, "possible"/"might" 0.5, "uncertain"/"unclear" 0.3, else 0.6. Matching
/// is case-insensitive on whole words, so "uncertain" does not hit "certain".
pub fn heuristic_confidence(text: &str) -> f64 {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    CONFIDENCE_TIERS
        .iter()
        .find(|(phrases, _)| phrases.iter().any(|phrase| contains_phrase(&words, phrase)))
        .map(|(_, confidence)| *confidence)
        .unwrap_or(DEFAULT_CONFIDENCE)
}

fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words
        .windows(needle.len())
        .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
}

/// Resolve a response's confidence: reported figure first, heuristic otherwise.
pub fn extract_confidence(response: &OracleResponse) -> f64 {
    match response.confidence {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => heuristic_confidence(&response.output),
    }
}

/// Combines oracle responses into one decision.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    dissent_threshold: f64,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self {
            dissent_threshold: DISSENT_THRESHOLD,
        }
    }
}

impl ConsensusEngine {
    /// Create an engine with the standard dissent threshold.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the dissent threshold.
    pub fn with_dissent_threshold(mut self, threshold: f64) -> Self {
        self.dissent_threshold = threshold;
        self
    }

    /// Combine responses. Empty input fails rather than yielding a zero result.
    pub fn consensus(
        &self,
        responses: Vec<OracleResponse>,
    ) -> Result<ConsensusResult, ConsensusError> {
        if responses.is_empty() {
            return Err(ConsensusError::NoResponses);
        }

        let confidences: Vec<f64> = responses.iter().map(extract_confidence).collect();
        let n = confidences.len() as f64;
        let mean = confidences.iter().sum::<f64>() / n;
        let variance = confidences.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;

        let agreement_score = (1.0 - variance).clamp(0.0, 1.0);
        let final_confidence = (mean * agreement_score).clamp(0.0, 1.0);

        // Strict comparison keeps the earliest response on ties.
        let mut best = 0;
        for (i, &c) in confidences.iter().enumerate().skip(1) {
            if c > confidences[best] {
                best = i;
            }
        }

        let total: f64 = confidences.iter().sum();
        let opinions: Vec<WeightedOpinion> = responses
            .iter()
            .zip(&confidences)
            .map(|(response, &confidence)| WeightedOpinion {
                oracle: response.oracle.clone(),
                output: response.output.clone(),
                confidence,
                weight: if total > 0.0 { confidence / total } else { 1.0 / n },
            })
            .collect();

        let dissenting_opinions: Vec<WeightedOpinion> = opinions
            .iter()
            .filter(|o| (o.confidence - mean).abs() > self.dissent_threshold)
            .cloned()
            .collect();

        let mut confidence_weighted_result = opinions;
        confidence_weighted_result.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        debug!(
            responses = responses.len(),
            mean_confidence = mean,
            agreement_score,
            final_confidence,
            dissenters = dissenting_opinions.len(),
            "Consensus computed"
        );

        Ok(ConsensusResult {
            consensus_decision: responses[best].output.clone(),
            consensus_oracle: responses[best].oracle.clone(),
            responses,
            confidences,
            agreement_score,
            confidence_weighted_result,
            dissenting_opinions,
            final_confidence,
            mean_confidence: mean,
        })
    }

    /// Fan a prompt out through the gateway and combine the answers.
    pub async fn query<E>(
        &self,
        gateway: &OracleGateway,
        prompt: &str,
        context: &serde_json::Value,
        cancel: &CancelSignal,
    ) -> Result<ConsensusResult, E>
    where
        E: From<OracleError> + From<ConsensusError>,
    {
        let responses = gateway.query(prompt, context, cancel).await?;
        Ok(self.consensus(responses)?)
    }

    /// Like [`ConsensusEngine::query`] restricted to a subset of oracles.
    pub async fn query_subset<E>(
        &self,
        gateway: &OracleGateway,
        prompt: &str,
        context: &serde_json::Value,
        oracle_set: Option<&[String]>,
        cancel: &CancelSignal,
    ) -> Result<ConsensusResult, E>
    where
        E: From<OracleError> + From<ConsensusError>,
    {
        let responses = gateway
            .query_oracles(prompt, context, oracle_set, gateway.default_timeout(), cancel)
            .await?;
        Ok(self.consensus(responses)?)
    }
}

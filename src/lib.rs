//! # Investigation Orchestrator
//!
//! Investigates submitted artifacts (URLs, messages, images, ...) by
//! coordinating several independent analysis oracles, correlating what they
//! find into an evidence graph and adaptively deciding what to look at next.
//!
//! ## Components
//!
//! - **Evidence Graph**: append-only arena graph with clustering, importance
//!   ranking and contradiction detection
//! - **Oracle Gateway**: timeout-guarded, rate-limited, cancellable fan-out
//!   to N oracles (Langbase pipes in production)
//! - **Consensus Engine**: agreement, dissent and final confidence over the
//!   oracle answers
//! - **Investigation Planner**: the phase state machine that executes,
//!   adapts and stops investigations
//! - **Decision Recorder**: autonomy-gated decisions with an audit history
//!
//! ## Architecture
//!
//! ```text
//! start_investigation → Planner ──→ Capabilities (web, OCR, domain)
//!                          │  └───→ Oracle Gateway → Langbase Pipes (HTTP)
//!                          ↓                ↓
//!                    Evidence Graph   Consensus Engine → Decision Recorder
//!                          ↓
//!                    SQLite (snapshots, decisions)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use investigation_orchestrator::{Config, Orchestrator, OrchestratorSettings};
//! use investigation_orchestrator::capability::CapabilityRegistry;
//! use investigation_orchestrator::oracle::{OracleGateway, TokenBucket};
//! use investigation_orchestrator::planner::{EvidenceItem, EvidenceKind, InvestigationType, Priority};
//!
//! let config = Config::from_env()?;
//! let gateway = OracleGateway::new(oracles, Arc::new(TokenBucket::from_config(&config.rate_limit)), timeout);
//! let orchestrator = Orchestrator::new(gateway, CapabilityRegistry::new(), None, OrchestratorSettings::from_config(&config));
//! orchestrator
//!     .start_investigation("inv-1", vec![EvidenceItem::new(EvidenceKind::Url, "https://example.com")], InvestigationType::Phishing, Priority::High)
//!     .await?;
//! let snapshot = orchestrator.wait("inv-1").await?;
//! ```

/// External capabilities (web intelligence, OCR, domain analysis).
pub mod capability;
mod completion;
/// Configuration management.
pub mod config;
/// Multi-oracle consensus.
pub mod consensus;
/// Autonomy-gated decision making and history.
pub mod decision;
/// Error types and result aliases for the application.
pub mod error;
/// Evidence graph and its analytics.
pub mod graph;
/// Oracle contract, gateway, rate limiting and cancellation.
pub mod oracle;
/// Process-level facade over running investigations.
pub mod orchestrator;
/// Investigation planning and execution.
pub mod planner;
/// Prompts sent to the oracles.
pub mod prompts;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::{Orchestrator, OrchestratorMetrics, OrchestratorSettings};

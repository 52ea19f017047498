//! Persistence of investigation snapshots and recorded decisions.
//!
//! Snapshots are stored whole, as the versioned JSON export handed to report
//! consumers; decisions are stored one row each and read back per
//! investigation in recording order.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::error::StorageResult;
use crate::planner::{Phase, PlanSnapshot};

/// One row of the investigation listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationSummary {
    pub id: String,
    pub phase: Phase,
    pub confidence_score: f64,
    pub node_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvestigationSummary {
    pub fn from_snapshot(snapshot: &PlanSnapshot) -> Self {
        Self {
            id: snapshot.plan.id.clone(),
            phase: snapshot.plan.phase,
            confidence_score: snapshot.plan.confidence_score,
            node_count: snapshot.graph.metrics.node_count,
            created_at: snapshot.plan.created_at,
            updated_at: snapshot.plan.updated_at,
        }
    }
}

/// Storage backend for investigations.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or replace the snapshot of an investigation.
    async fn save_snapshot(&self, snapshot: &PlanSnapshot) -> StorageResult<()>;
    /// Latest snapshot of an investigation.
    async fn get_snapshot(&self, investigation_id: &str) -> StorageResult<Option<PlanSnapshot>>;
    /// All investigations, most recently updated first.
    async fn list_investigations(&self) -> StorageResult<Vec<InvestigationSummary>>;

    /// Append a recorded decision.
    async fn save_decision(&self, decision: &Decision) -> StorageResult<()>;
    /// Decisions for an investigation in recording order.
    async fn get_decisions(&self, investigation_id: &str) -> StorageResult<Vec<Decision>>;
}

use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{InvestigationSummary, Storage};
use crate::config::DatabaseConfig;
use crate::decision::Decision;
use crate::error::{StorageError, StorageResult};
use crate::planner::{Phase, PlanSnapshot};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// In-memory database for tests and dry runs.
    ///
    /// Every SQLite in-memory connection is its own database, so the pool is
    /// pinned to a single connection that never expires.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_snapshot(&self, snapshot: &PlanSnapshot) -> StorageResult<()> {
        let payload = serde_json::to_string(snapshot)?;
        let plan = &snapshot.plan;

        sqlx::query(
            r#"
            INSERT INTO investigations
                (id, phase, confidence_score, node_count, snapshot, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                phase = excluded.phase,
                confidence_score = excluded.confidence_score,
                node_count = excluded.node_count,
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&plan.id)
        .bind(plan.phase.as_str())
        .bind(plan.confidence_score)
        .bind(snapshot.graph.metrics.node_count as i64)
        .bind(&payload)
        .bind(plan.created_at.to_rfc3339())
        .bind(plan.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(investigation_id = %plan.id, phase = %plan.phase, "Snapshot saved");
        Ok(())
    }

    async fn get_snapshot(&self, investigation_id: &str) -> StorageResult<Option<PlanSnapshot>> {
        let payload: Option<(String,)> =
            sqlx::query_as("SELECT snapshot FROM investigations WHERE id = ?")
                .bind(investigation_id)
                .fetch_optional(&self.pool)
                .await?;

        payload
            .map(|(json,)| serde_json::from_str(&json).map_err(StorageError::from))
            .transpose()
    }

    async fn list_investigations(&self) -> StorageResult<Vec<InvestigationSummary>> {
        let rows: Vec<InvestigationRow> = sqlx::query_as(
            r#"
            SELECT id, phase, confidence_score, node_count, created_at, updated_at
            FROM investigations
            ORDER BY updated_at DESC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(InvestigationSummary::try_from).collect()
    }

    async fn save_decision(&self, decision: &Decision) -> StorageResult<()> {
        let payload = serde_json::to_string(decision)?;

        sqlx::query(
            r#"
            INSERT INTO decisions (id, investigation_id, decision_type, confidence, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&decision.id)
        .bind(&decision.investigation_id)
        .bind(decision.decision_type.as_str())
        .bind(decision.confidence)
        .bind(&payload)
        .bind(decision.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_decisions(&self, investigation_id: &str) -> StorageResult<Vec<Decision>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT payload
            FROM decisions
            WHERE investigation_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(investigation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(json,)| serde_json::from_str(&json).map_err(StorageError::from))
            .collect()
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct InvestigationRow {
    id: String,
    phase: String,
    confidence_score: f64,
    node_count: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<InvestigationRow> for InvestigationSummary {
    type Error = StorageError;

    fn try_from(row: InvestigationRow) -> Result<Self, Self::Error> {
        use chrono::DateTime;

        let phase = Phase::from_str(&row.phase).map_err(|message| StorageError::Query { message })?;

        Ok(Self {
            id: row.id,
            phase,
            confidence_score: row.confidence_score,
            node_count: row.node_count.max(0) as usize,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
            updated_at: DateTime::parse_from_rfc3339(&row.updated_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
        })
    }
}

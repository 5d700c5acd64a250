//! SQLite workflow state repository implementation.
//!
//! Implements `WorkflowStateRepository` from `devteam-core`. One row per
//! session key holds the whole snapshot: the context and stats as JSON text,
//! the state duplicated in its own column for ad-hoc inspection, and the
//! write time. Every save replaces the row.

use chrono::{DateTime, Utc};
use devteam_core::repository::WorkflowStateRepository;
use devteam_types::error::RepositoryError;
use devteam_types::workflow::{WorkflowContext, WorkflowSnapshot, WorkflowStats};
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `WorkflowStateRepository`.
pub struct SqliteWorkflowStateRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowStateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct SessionRow {
    context: Option<String>,
    stats: Option<String>,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            context: row.try_get("context")?,
            stats: row.try_get("stats")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_snapshot(self) -> Result<WorkflowSnapshot, RepositoryError> {
        let context = self
            .context
            .map(|json| serde_json::from_str::<WorkflowContext>(&json))
            .transpose()
            .map_err(|e| RepositoryError::Corrupt(format!("invalid context JSON: {e}")))?;
        let stats = self
            .stats
            .map(|json| serde_json::from_str::<WorkflowStats>(&json))
            .transpose()
            .map_err(|e| RepositoryError::Corrupt(format!("invalid stats JSON: {e}")))?;

        Ok(WorkflowSnapshot {
            context,
            stats,
            saved_at: Some(parse_datetime(&self.updated_at)?),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Corrupt(format!("invalid datetime: {e}")))
}

fn to_json<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>, RepositoryError> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RepositoryError::Query(format!("failed to serialize snapshot: {e}")))
}

// ---------------------------------------------------------------------------
// WorkflowStateRepository implementation
// ---------------------------------------------------------------------------

impl WorkflowStateRepository for SqliteWorkflowStateRepository {
    async fn load(&self, key: &str) -> Result<Option<WorkflowSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT context, stats, updated_at FROM workflow_sessions WHERE session_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session =
                    SessionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session.into_snapshot()?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, snapshot: &WorkflowSnapshot) -> Result<(), RepositoryError> {
        let context = to_json(snapshot.context.as_ref())?;
        let stats = to_json(snapshot.stats.as_ref())?;
        let state = snapshot.context.as_ref().map(|c| c.state.as_str());
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"INSERT INTO workflow_sessions (session_key, context, stats, state, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (session_key) DO UPDATE SET
                   context = excluded.context,
                   stats = excluded.stats,
                   state = excluded.state,
                   updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(context)
        .bind(stats)
        .bind(state)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tracing::trace!(session_key = key, state = ?state, "workflow snapshot saved");
        Ok(())
    }
}

use argus_core::MonitorError;
use argus_core::models::{Change, NewChange};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// Repository for the append-only change history and the extraction
/// backlog (`analyzed = FALSE`).
#[derive(Clone)]
pub struct ChangeRepository {
    pool: Pool<Postgres>,
}

impl ChangeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, change: &NewChange) -> Result<Change, MonitorError> {
        let row = sqlx::query_as::<_, ChangeRow>(
            r#"
            INSERT INTO changes (source_id, prior_snapshot_id, new_snapshot_id, diff, detected_at, analyzed)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, source_id, prior_snapshot_id, new_snapshot_id, diff, detected_at, analyzed
            "#,
        )
        .bind(change.source_id)
        .bind(change.prior_snapshot_id)
        .bind(change.new_snapshot_id)
        .bind(&change.diff)
        .bind(change.detected_at)
        .bind(change.analyzed)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MonitorError::Database(e.to_string()))?;

        Ok(row.into())
    }

    /// Unanalyzed changes, oldest first. Baselines never show up: they
    /// are created already analyzed.
    pub async fn backlog(&self, limit: usize) -> Result<Vec<Change>, MonitorError> {
        let rows = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT id, source_id, prior_snapshot_id, new_snapshot_id, diff, detected_at, analyzed
            FROM changes
            WHERE analyzed = FALSE
            ORDER BY detected_at
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MonitorError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Most recently detected change for a source, baseline or not.
    pub async fn latest_for_source(
        &self,
        source_id: Uuid,
    ) -> Result<Option<Change>, MonitorError> {
        let row = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT id, source_id, prior_snapshot_id, new_snapshot_id, diff, detected_at, analyzed
            FROM changes
            WHERE source_id = $1
            ORDER BY detected_at DESC
            LIMIT 1
            "#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MonitorError::Database(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    pub async fn mark_analyzed(&self, change_id: Uuid) -> Result<(), MonitorError> {
        sqlx::query("UPDATE changes SET analyzed = TRUE WHERE id = $1")
            .bind(change_id)
            .execute(&self.pool)
            .await
            .map_err(|e| MonitorError::Database(e.to_string()))?;
        Ok(())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ChangeRow {
    id: Uuid,
    source_id: Uuid,
    prior_snapshot_id: Option<Uuid>,
    new_snapshot_id: Uuid,
    diff: String,
    detected_at: DateTime<Utc>,
    analyzed: bool,
}

impl From<ChangeRow> for Change {
    fn from(row: ChangeRow) -> Self {
        Change {
            id: row.id,
            source_id: row.source_id,
            prior_snapshot_id: row.prior_snapshot_id,
            new_snapshot_id: row.new_snapshot_id,
            diff: row.diff,
            detected_at: row.detected_at,
            analyzed: row.analyzed,
        }
    }
}

// -- Trait implementation --

impl argus_core::traits::ChangeStore for ChangeRepository {
    async fn insert(&self, change: &NewChange) -> Result<Change, MonitorError> {
        ChangeRepository::insert(self, change).await
    }

    async fn backlog(&self, limit: usize) -> Result<Vec<Change>, MonitorError> {
        ChangeRepository::backlog(self, limit).await
    }

    async fn latest_for_source(&self, source_id: Uuid) -> Result<Option<Change>, MonitorError> {
        ChangeRepository::latest_for_source(self, source_id).await
    }

    async fn mark_analyzed(&self, change_id: Uuid) -> Result<(), MonitorError> {
        ChangeRepository::mark_analyzed(self, change_id).await
    }
}

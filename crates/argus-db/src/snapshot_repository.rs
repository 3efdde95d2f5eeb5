use argus_core::MonitorError;
use argus_core::models::{FetchStatus, NewSnapshot, Snapshot};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// Repository for the append-only snapshot history.
///
/// Reads return only successful captures: an error snapshot keeps its
/// place in the per-source ordering but never participates in hash
/// comparison.
#[derive(Clone)]
pub struct SnapshotRepository {
    pool: Pool<Postgres>,
}

impl SnapshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, snapshot: &NewSnapshot) -> Result<Snapshot, MonitorError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            INSERT INTO snapshots (source_id, content, content_hash, captured_at, status, error_detail)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, source_id, content, content_hash, captured_at, status, error_detail
            "#,
        )
        .bind(snapshot.source_id)
        .bind(&snapshot.content)
        .bind(&snapshot.content_hash)
        .bind(snapshot.captured_at)
        .bind(snapshot.status.as_str())
        .bind(&snapshot.error_detail)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MonitorError::Database(e.to_string()))?;

        row.try_into()
    }

    /// Most recent successful snapshot for a source.
    pub async fn latest(&self, source_id: Uuid) -> Result<Option<Snapshot>, MonitorError> {
        self.nth_success(source_id, 0).await
    }

    /// Successful snapshot immediately before the latest one.
    pub async fn previous(&self, source_id: Uuid) -> Result<Option<Snapshot>, MonitorError> {
        self.nth_success(source_id, 1).await
    }

    async fn nth_success(
        &self,
        source_id: Uuid,
        offset: i64,
    ) -> Result<Option<Snapshot>, MonitorError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT id, source_id, content, content_hash, captured_at, status, error_detail
            FROM snapshots
            WHERE source_id = $1 AND status = 'success'
            ORDER BY captured_at DESC
            LIMIT 1 OFFSET $2
            "#,
        )
        .bind(source_id)
        .bind(offset)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MonitorError::Database(e.to_string()))?;

        row.map(TryInto::try_into).transpose()
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    source_id: Uuid,
    content: String,
    content_hash: String,
    captured_at: DateTime<Utc>,
    status: String,
    error_detail: Option<String>,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = MonitorError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let status: FetchStatus = row
            .status
            .parse()
            .map_err(|e: String| MonitorError::Database(e))?;
        Ok(Snapshot {
            id: row.id,
            source_id: row.source_id,
            content: row.content,
            content_hash: row.content_hash,
            captured_at: row.captured_at,
            status,
            error_detail: row.error_detail,
        })
    }
}

// -- Trait implementation --

impl argus_core::traits::SnapshotStore for SnapshotRepository {
    async fn insert(&self, snapshot: &NewSnapshot) -> Result<Snapshot, MonitorError> {
        SnapshotRepository::insert(self, snapshot).await
    }

    async fn latest(&self, source_id: Uuid) -> Result<Option<Snapshot>, MonitorError> {
        SnapshotRepository::latest(self, source_id).await
    }

    async fn previous(&self, source_id: Uuid) -> Result<Option<Snapshot>, MonitorError> {
        SnapshotRepository::previous(self, source_id).await
    }
}

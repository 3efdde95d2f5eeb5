use argus_core::MonitorError;
use argus_core::models::Source;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// Repository for monitored sources in PostgreSQL.
#[derive(Clone)]
pub struct SourceRepository {
    pool: Pool<Postgres>,
}

impl SourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a source, or refresh name/region/active when the URL is
    /// already registered. The URL is the stable identity; ids assigned
    /// by the database win over caller-side placeholders.
    pub async fn upsert(&self, source: &Source) -> Result<Source, MonitorError> {
        let row = sqlx::query_as::<_, SourceRow>(
            r#"
            INSERT INTO sources (name, url, region, active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (url) DO UPDATE
                SET name = EXCLUDED.name,
                    region = EXCLUDED.region,
                    active = EXCLUDED.active
            RETURNING id, name, url, region, active
            "#,
        )
        .bind(&source.name)
        .bind(&source.url)
        .bind(&source.region)
        .bind(source.active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MonitorError::Database(e.to_string()))?;

        Ok(row.into())
    }

    pub async fn list_active(&self) -> Result<Vec<Source>, MonitorError> {
        let rows = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT id, name, url, region, active
            FROM sources
            WHERE active = TRUE
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MonitorError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct SourceRow {
    id: Uuid,
    name: String,
    url: String,
    region: String,
    active: bool,
}

impl From<SourceRow> for Source {
    fn from(row: SourceRow) -> Self {
        Source {
            id: row.id,
            name: row.name,
            url: row.url,
            region: row.region,
            active: row.active,
        }
    }
}

// -- Trait implementation --

impl argus_core::traits::SourceStore for SourceRepository {
    async fn upsert(&self, source: &Source) -> Result<Source, MonitorError> {
        SourceRepository::upsert(self, source).await
    }

    async fn list_active(&self) -> Result<Vec<Source>, MonitorError> {
        SourceRepository::list_active(self).await
    }
}

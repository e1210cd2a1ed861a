use async_trait::async_trait;
use common::{OrderId, SagaId, SagaStatus, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::SagaError;
use crate::record::SagaRecord;
use crate::store::SagaStore;
use crate::Result;

const COLUMNS: &str = "saga_id, order_id, user_id, status, created_at, updated_at";

/// PostgreSQL-backed saga store (`saga_states` table).
#[derive(Clone)]
pub struct PostgresSagaStore {
    pool: PgPool,
}

impl PostgresSagaStore {
    /// Creates a new PostgreSQL saga store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: &PgRow) -> Result<SagaRecord> {
        let saga_id = SagaId::new(row.try_get::<String, _>("saga_id")?);
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<SagaStatus>()
            .map_err(|e| SagaError::UnrecognizedStatus {
                saga_id: saga_id.clone(),
                status: e.0,
            })?;

        Ok(SagaRecord {
            saga_id,
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl SagaStore for PostgresSagaStore {
    async fn insert(&self, record: SagaRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO saga_states (saga_id, order_id, user_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.saga_id.as_str())
        .bind(record.order_id.as_str())
        .bind(record.user_id.as_str())
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return SagaError::DuplicateSaga(record.saga_id.clone());
            }
            SagaError::Database(e)
        })?;
        Ok(())
    }

    async fn get(&self, saga_id: &SagaId) -> Result<Option<SagaRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM saga_states WHERE saga_id = $1"
        ))
        .bind(saga_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn find_by_order(
        &self,
        user_id: &UserId,
        order_id: &OrderId,
    ) -> Result<Option<SagaRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM saga_states WHERE user_id = $1 AND order_id = $2"
        ))
        .bind(user_id.as_str())
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn status_name(&self, user_id: &UserId, order_id: &OrderId) -> Result<Option<String>> {
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM saga_states WHERE user_id = $1 AND order_id = $2",
        )
        .bind(user_id.as_str())
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }

    #[tracing::instrument(skip(self), fields(saga_id = %saga_id))]
    async fn transition(
        &self,
        saga_id: &SagaId,
        from: SagaStatus,
        to: SagaStatus,
    ) -> Result<Option<SagaRecord>> {
        // GREATEST keeps updated_at monotonic under clock skew.
        let row = sqlx::query(&format!(
            r#"
            UPDATE saga_states
            SET status = $3, updated_at = GREATEST(NOW(), updated_at)
            WHERE saga_id = $1 AND status = $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(saga_id.as_str())
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list_by_status(&self, status: SagaStatus) -> Result<Vec<SagaRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM saga_states WHERE status = $1 ORDER BY created_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}

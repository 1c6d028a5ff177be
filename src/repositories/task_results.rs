//! Task Results Repository

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{query, query_as, FromRow, PgPool};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, FromRow)]
pub struct TaskRecord {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct PgTaskResultsRepository {
    pool: PgPool,
}

impl PgTaskResultsRepository {
    pub(crate) fn new(pool: PgPool) -> Self { Self { pool } }

    pub(crate) async fn record(
        &self,
        id: Uuid,
        name: &str,
        status: &str,
        result: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        query(
            "INSERT INTO task_results (id, name, status, result, error) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, result = EXCLUDED.result, \
             error = EXCLUDED.error, updated_at = NOW()",
        )
        .bind(id)
        .bind(name)
        .bind(status)
        .bind(result)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub(crate) async fn find(&self, id: Uuid) -> Result<Option<TaskRecord>, sqlx::Error> {
        query_as::<_, TaskRecord>("SELECT * FROM task_results WHERE id = $1").bind(id).fetch_optional(&self.pool).await
    }
}

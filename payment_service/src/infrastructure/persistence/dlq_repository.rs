use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::entities::DlqEntry;
use crate::domain::error::PaymentError;
use crate::domain::repository::DlqRepository;
use crate::infrastructure::persistence::models::DlqModel;

/// Lectura paginada de la dead-letter queue, lo más reciente primero.
pub struct PostgresDlqRepository {
    pool: PgPool,
}

impl PostgresDlqRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DlqRepository for PostgresDlqRepository {
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<DlqEntry>, PaymentError> {
        let models = sqlx::query_as::<_, DlqModel>(
            r#"
            SELECT * FROM payment_dlq
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PaymentError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }
}

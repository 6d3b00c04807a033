use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::entities::{Payment, Transaction};
use crate::domain::error::PaymentError;
use crate::domain::repository::PaymentRepository;
use crate::domain::types::PaymentId;
use crate::infrastructure::persistence::models::{PaymentModel, TransactionModel};

/// Lecturas de pagos para la API de estado.
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>, PaymentError> {
        let model_opt =
            sqlx::query_as::<_, PaymentModel>(r#"SELECT * FROM payments WHERE id = $1"#)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PaymentError::RepositoryError(e.to_string()))?;

        Ok(model_opt.map(|m| m.into()))
    }

    /// Transacción dueña del pago (exactamente una en el diseño actual).
    async fn find_transaction(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Transaction>, PaymentError> {
        let model_opt = sqlx::query_as::<_, TransactionModel>(
            r#"SELECT * FROM transactions WHERE payment_id = $1"#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PaymentError::RepositoryError(e.to_string()))?;

        Ok(model_opt.map(|m| m.into()))
    }
}

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::domain::entities::User;
use crate::domain::error::PaymentError;
use crate::domain::repository::UserRepository;
use crate::domain::types::UserId;
use crate::infrastructure::persistence::models::UserModel;

/// Repositorio de Usuarios basado en PostgreSQL.
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    /// Alta administrativa de un usuario con su balance inicial.
    async fn create(&self, balance: Decimal) -> Result<User, PaymentError> {
        let saved_model = sqlx::query_as::<_, UserModel>(
            r#"
            INSERT INTO users (balance)
            VALUES ($1)
            RETURNING *
            "#,
        )
        .bind(balance)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // El check de balance no negativo vive también en la BD.
            if e.to_string().contains("users_balance_chk") {
                PaymentError::ValidationError("balance must not be negative".to_string())
            } else {
                PaymentError::RepositoryError(e.to_string())
            }
        })?;

        Ok(saved_model.into())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, PaymentError> {
        let model_opt = sqlx::query_as::<_, UserModel>(
            r#"
            SELECT * FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PaymentError::RepositoryError(e.to_string()))?;

        Ok(model_opt.map(|m| m.into()))
    }
}

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};

use crate::domain::entities::{PaymentStatus, TransactionStatus, TransactionType};
use crate::domain::error::PaymentError;
use crate::domain::repository::{IntakeCommand, IntakeOutcome, IntakeRepository};
use crate::infrastructure::persistence::models::{PaymentModel, UserModel};

/// Protocolo de intake sobre PostgreSQL.
///
/// Cada alta ejecuta UNA transacción: lookup del usuario (con `FOR UPDATE`
/// en retiros), pre-chequeo de idempotencia y los inserts de pago,
/// transacción y tarea. La constraint única `(user_id, idempotency_key)` es
/// la autoridad final ante intakes concurrentes: si el pre-chequeo no ve el
/// duplicado pero el insert choca, se relee el pago existente.
pub struct PostgresIntakeRepository {
    pool: PgPool,
}

impl PostgresIntakeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn create_intake(
        &self,
        kind: TransactionType,
        cmd: IntakeCommand,
        check_funds: bool,
    ) -> Result<IntakeOutcome, PaymentError> {
        let mut tx = self.pool.begin().await.map_err(repo_err)?;

        let user_sql = if check_funds {
            "SELECT * FROM users WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT * FROM users WHERE id = $1"
        };
        let user = sqlx::query_as::<_, UserModel>(user_sql)
            .bind(cmd.user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(repo_err)?;
        let Some(user) = user else {
            return Err(PaymentError::UserNotFound(cmd.user_id));
        };

        if let Some(key) = &cmd.idempotency_key {
            let existing = sqlx::query_as::<_, PaymentModel>(
                r#"SELECT * FROM payments WHERE user_id = $1 AND idempotency_key = $2"#,
            )
            .bind(cmd.user_id)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(repo_err)?;

            if let Some(payment) = existing {
                return Ok(IntakeOutcome::Duplicate {
                    payment: payment.into(),
                });
            }
        }

        // En retiros el balance se valida bajo el lock de fila del usuario.
        // Un rechazo persiste el pago fallido igualmente, pero sin tarea:
        // no queda trabajo asíncrono que hacer.
        let funded = !check_funds || user.balance >= cmd.amount + cmd.commission;
        let (payment_status, last_error) = if funded {
            (PaymentStatus::New, None)
        } else {
            (PaymentStatus::Failed, Some("insufficient_funds"))
        };

        let inserted = sqlx::query_as::<_, PaymentModel>(
            r#"
            INSERT INTO payments (user_id, amount, commission, status, idempotency_key, last_error)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(cmd.user_id)
        .bind(cmd.amount)
        .bind(cmd.commission)
        .bind(payment_status)
        .bind(cmd.idempotency_key.as_deref())
        .bind(last_error)
        .fetch_one(&mut *tx)
        .await;

        let payment = match inserted {
            Ok(payment) => payment,
            Err(e) if e.to_string().contains("uq_payments_user_idempotency") => {
                // Perdimos la carrera contra otro intake con la misma clave.
                drop(tx);
                let existing = sqlx::query_as::<_, PaymentModel>(
                    r#"SELECT * FROM payments WHERE user_id = $1 AND idempotency_key = $2"#,
                )
                .bind(cmd.user_id)
                .bind(cmd.idempotency_key.as_deref())
                .fetch_one(&self.pool)
                .await
                .map_err(repo_err)?;
                return Ok(IntakeOutcome::Duplicate {
                    payment: existing.into(),
                });
            }
            Err(e) => return Err(repo_err(e)),
        };

        let transaction_status = if funded {
            TransactionStatus::Processing
        } else {
            TransactionStatus::Failed
        };
        insert_transaction(&mut tx, &cmd, &payment, kind, transaction_status).await?;

        if funded {
            sqlx::query(r#"INSERT INTO payment_tasks (payment_id) VALUES ($1)"#)
                .bind(payment.id)
                .execute(&mut *tx)
                .await
                .map_err(repo_err)?;
        }

        tx.commit().await.map_err(repo_err)?;

        if funded {
            Ok(IntakeOutcome::Accepted {
                payment_id: payment.id,
            })
        } else {
            Ok(IntakeOutcome::Rejected {
                payment_id: payment.id,
            })
        }
    }
}

async fn insert_transaction(
    tx: &mut SqlxTransaction<'_, Postgres>,
    cmd: &IntakeCommand,
    payment: &PaymentModel,
    kind: TransactionType,
    status: TransactionStatus,
) -> Result<(), PaymentError> {
    sqlx::query(
        r#"
        INSERT INTO transactions (user_id, payment_id, amount, commission, type, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(cmd.user_id)
    .bind(payment.id)
    .bind(cmd.amount)
    .bind(cmd.commission)
    .bind(kind)
    .bind(status)
    .execute(&mut **tx)
    .await
    .map_err(repo_err)?;
    Ok(())
}

fn repo_err(e: sqlx::Error) -> PaymentError {
    PaymentError::RepositoryError(e.to_string())
}

#[async_trait]
impl IntakeRepository for PostgresIntakeRepository {
    async fn create_deposit(&self, cmd: IntakeCommand) -> Result<IntakeOutcome, PaymentError> {
        self.create_intake(TransactionType::Deposit, cmd, false).await
    }

    async fn create_withdraw(&self, cmd: IntakeCommand) -> Result<IntakeOutcome, PaymentError> {
        self.create_intake(TransactionType::Withdraw, cmd, true).await
    }
}

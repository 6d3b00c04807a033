use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};

use crate::domain::entities::{PaymentStatus, TaskStatus, TransactionType};
use crate::domain::error::PaymentError;
use crate::domain::gateways::ChargePayload;
use crate::domain::repository::{ApplyOutcome, PaymentTaskRepository, ReservedTask};
use crate::domain::types::{PaymentId, TaskId};
use crate::infrastructure::persistence::models::{
    PaymentModel, PaymentTaskModel, TransactionModel, UserModel,
};

/// Motor durable de tareas sobre PostgreSQL.
///
/// Cada operación es UNA transacción con locks de fila adquiridos siempre en
/// el orden `payment_tasks -> payments -> transactions -> users`. El orden
/// entre pagos distintos no está garantizado; dentro de un pago, el lock de
/// su tarea serializa todas las transiciones.
pub struct PostgresPaymentTaskRepository {
    pool: PgPool,
}

impl PostgresPaymentTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Predicado de elegibilidad: tareas nuevas, o en `processing` abandonadas
/// por un worker caído. `SKIP LOCKED` permite N workers sondeando sin
/// contención entre sí.
const RESERVE_SQL: &str = r#"
SELECT * FROM payment_tasks
WHERE (
        status = 'new'
        OR (status = 'processing' AND locked_at IS NOT NULL AND locked_at < $2)
      )
  AND (next_retry_at IS NULL OR next_retry_at <= $1)
ORDER BY created_at
LIMIT 1
FOR UPDATE SKIP LOCKED
"#;

async fn lock_task(
    tx: &mut SqlxTransaction<'_, Postgres>,
    task_id: TaskId,
) -> Result<Option<PaymentTaskModel>, PaymentError> {
    sqlx::query_as::<_, PaymentTaskModel>(
        r#"SELECT * FROM payment_tasks WHERE id = $1 FOR UPDATE"#,
    )
    .bind(task_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(repo_err)
}

async fn lock_payment(
    tx: &mut SqlxTransaction<'_, Postgres>,
    payment_id: PaymentId,
) -> Result<Option<PaymentModel>, PaymentError> {
    sqlx::query_as::<_, PaymentModel>(r#"SELECT * FROM payments WHERE id = $1 FOR UPDATE"#)
        .bind(payment_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(repo_err)
}

async fn finalize_task(
    tx: &mut SqlxTransaction<'_, Postgres>,
    task_id: TaskId,
    status: TaskStatus,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), PaymentError> {
    sqlx::query(
        r#"
        UPDATE payment_tasks
        SET status = $2, last_error = $3, locked_at = NULL, next_retry_at = NULL, updated_at = $4
        WHERE id = $1
        "#,
    )
    .bind(task_id)
    .bind(status)
    .bind(error)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(repo_err)?;
    Ok(())
}

fn repo_err(e: sqlx::Error) -> PaymentError {
    PaymentError::RepositoryError(e.to_string())
}

#[async_trait]
impl PaymentTaskRepository for PostgresPaymentTaskRepository {
    async fn reserve_next(
        &self,
        now: DateTime<Utc>,
        stuck_before: DateTime<Utc>,
    ) -> Result<Option<ReservedTask>, PaymentError> {
        loop {
            let mut tx = self.pool.begin().await.map_err(repo_err)?;

            let task = sqlx::query_as::<_, PaymentTaskModel>(RESERVE_SQL)
                .bind(now)
                .bind(stuck_before)
                .fetch_optional(&mut *tx)
                .await
                .map_err(repo_err)?;
            let Some(task) = task else {
                return Ok(None);
            };

            let attempts = task.attempts + 1;
            sqlx::query(
                r#"
                UPDATE payment_tasks
                SET status = 'processing', attempts = $2, locked_at = $3,
                    next_retry_at = NULL, updated_at = $3
                WHERE id = $1
                "#,
            )
            .bind(task.id)
            .bind(attempts)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(repo_err)?;

            let Some(payment) = lock_payment(&mut tx, task.payment_id).await? else {
                // Tarea huérfana: se cierra y se sigue buscando trabajo.
                finalize_task(&mut tx, task.id, TaskStatus::Failed, Some("missing_payment"), now)
                    .await?;
                tx.commit().await.map_err(repo_err)?;
                continue;
            };

            match payment.status {
                // Pago ya finalizado por otro camino: la tarea se alinea con
                // el estado terminal y el escaneo continúa.
                PaymentStatus::Success => {
                    finalize_task(&mut tx, task.id, TaskStatus::Done, None, now).await?;
                    tx.commit().await.map_err(repo_err)?;
                    continue;
                }
                PaymentStatus::Failed => {
                    finalize_task(&mut tx, task.id, TaskStatus::Failed, payment.last_error.as_deref(), now)
                        .await?;
                    tx.commit().await.map_err(repo_err)?;
                    continue;
                }
                PaymentStatus::New | PaymentStatus::Processing => {}
            }

            sqlx::query(
                r#"
                UPDATE payments
                SET status = 'processing', attempts = $2, locked_at = $3,
                    next_retry_at = NULL, updated_at = $3
                WHERE id = $1
                "#,
            )
            .bind(payment.id)
            .bind(attempts)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(repo_err)?;

            tx.commit().await.map_err(repo_err)?;

            return Ok(Some(ReservedTask {
                task_id: task.id,
                payment_id: task.payment_id,
                attempts,
            }));
        }
    }

    async fn load_payload(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<ChargePayload>, PaymentError> {
        let payment =
            sqlx::query_as::<_, PaymentModel>(r#"SELECT * FROM payments WHERE id = $1"#)
                .bind(payment_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(repo_err)?;
        let Some(payment) = payment else {
            return Ok(None);
        };

        let transaction = sqlx::query_as::<_, TransactionModel>(
            r#"SELECT * FROM transactions WHERE payment_id = $1"#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(repo_err)?;
        let Some(transaction) = transaction else {
            return Ok(None);
        };

        Ok(Some(ChargePayload {
            payment_id: payment.id,
            user_id: payment.user_id,
            amount: payment.amount,
            commission: payment.commission,
            kind: transaction.kind,
        }))
    }

    async fn apply_success(&self, task_id: TaskId) -> Result<ApplyOutcome, PaymentError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(repo_err)?;

        let Some(task) = lock_task(&mut tx, task_id).await? else {
            return Ok(ApplyOutcome::AlreadyFinal);
        };
        let Some(payment) = lock_payment(&mut tx, task.payment_id).await? else {
            return Ok(ApplyOutcome::AlreadyFinal);
        };

        // Re-aplicar un éxito es un no-op: el balance se muta a lo sumo una
        // vez en la vida del pago.
        if payment.status == PaymentStatus::Success {
            finalize_task(&mut tx, task.id, TaskStatus::Done, None, now).await?;
            tx.commit().await.map_err(repo_err)?;
            return Ok(ApplyOutcome::AlreadyFinal);
        }

        let transaction = sqlx::query_as::<_, TransactionModel>(
            r#"SELECT * FROM transactions WHERE payment_id = $1 FOR UPDATE"#,
        )
        .bind(payment.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(repo_err)?;
        let Some(transaction) = transaction else {
            return Ok(ApplyOutcome::MissingTransaction);
        };

        let user = sqlx::query_as::<_, UserModel>(
            r#"SELECT * FROM users WHERE id = $1 FOR UPDATE"#,
        )
        .bind(payment.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(repo_err)?;
        let Some(user) = user else {
            return Ok(ApplyOutcome::MissingUser);
        };

        let new_balance = match transaction.kind {
            TransactionType::Deposit => user.balance + payment.amount - payment.commission,
            TransactionType::Withdraw => {
                let total = payment.amount + payment.commission;
                // El balance pudo haberse movido entre el intake y este
                // momento; se re-chequea bajo el lock de fila.
                if user.balance < total {
                    return Ok(ApplyOutcome::InsufficientFunds);
                }
                user.balance - total
            }
        };

        sqlx::query(r#"UPDATE users SET balance = $2 WHERE id = $1"#)
            .bind(user.id)
            .bind(new_balance)
            .execute(&mut *tx)
            .await
            .map_err(repo_err)?;

        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'success', last_error = NULL, locked_at = NULL,
                next_retry_at = NULL, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(payment.id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(repo_err)?;

        sqlx::query(r#"UPDATE transactions SET status = 'success' WHERE id = $1"#)
            .bind(transaction.id)
            .execute(&mut *tx)
            .await
            .map_err(repo_err)?;

        finalize_task(&mut tx, task.id, TaskStatus::Done, None, now).await?;

        tx.commit().await.map_err(repo_err)?;
        Ok(ApplyOutcome::Applied)
    }

    async fn schedule_retry(
        &self,
        task_id: TaskId,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(repo_err)?;

        let Some(task) = lock_task(&mut tx, task_id).await? else {
            return Ok(());
        };
        let Some(payment) = lock_payment(&mut tx, task.payment_id).await? else {
            return Ok(());
        };

        sqlx::query(
            r#"
            UPDATE payment_tasks
            SET status = 'new', last_error = $2, next_retry_at = $3,
                locked_at = NULL, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(task.id)
        .bind(error)
        .bind(next_retry_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(repo_err)?;

        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'new', last_error = $2, next_retry_at = $3,
                locked_at = NULL, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(payment.id)
        .bind(error)
        .bind(next_retry_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(repo_err)?;

        tx.commit().await.map_err(repo_err)
    }

    async fn mark_failed(&self, task_id: TaskId, error: &str) -> Result<bool, PaymentError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(repo_err)?;

        let Some(task) = lock_task(&mut tx, task_id).await? else {
            return Ok(false);
        };
        let Some(payment) = lock_payment(&mut tx, task.payment_id).await? else {
            finalize_task(&mut tx, task.id, TaskStatus::Failed, Some(error), now).await?;
            tx.commit().await.map_err(repo_err)?;
            return Ok(false);
        };

        let transaction = sqlx::query_as::<_, TransactionModel>(
            r#"SELECT * FROM transactions WHERE payment_id = $1 FOR UPDATE"#,
        )
        .bind(payment.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(repo_err)?;

        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed', last_error = $2, locked_at = NULL,
                next_retry_at = NULL, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(payment.id)
        .bind(error)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(repo_err)?;

        if let Some(ref t) = transaction {
            sqlx::query(r#"UPDATE transactions SET status = 'failed' WHERE id = $1"#)
                .bind(t.id)
                .execute(&mut *tx)
                .await
                .map_err(repo_err)?;
        }

        finalize_task(&mut tx, task.id, TaskStatus::Failed, Some(error), now).await?;

        // DLQ append-only: una sola fila por pago, el lock del pago
        // serializa este chequeo.
        let existing = sqlx::query(r#"SELECT 1 FROM payment_dlq WHERE payment_id = $1"#)
            .bind(payment.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(repo_err)?;

        let written = if existing.is_none() {
            let payment_type = transaction
                .as_ref()
                .map(|t| t.kind.as_str())
                .unwrap_or("unknown");
            sqlx::query(
                r#"
                INSERT INTO payment_dlq
                    (payment_id, user_id, amount, commission, payment_type, error, attempts)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(payment.id)
            .bind(payment.user_id)
            .bind(payment.amount)
            .bind(payment.commission)
            .bind(payment_type)
            .bind(error)
            .bind(task.attempts)
            .execute(&mut *tx)
            .await
            .map_err(repo_err)?;
            true
        } else {
            false
        };

        tx.commit().await.map_err(repo_err)?;
        Ok(written)
    }
}

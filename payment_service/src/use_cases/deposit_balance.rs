use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::domain::error::PaymentError;
use crate::domain::money;
use crate::domain::repository::{IntakeCommand, IntakeOutcome, IntakeRepository};
use crate::domain::types::UserId;
use crate::metrics::{counters, MetricsRegistry};
use crate::use_cases::{resolve_duplicate, validate_idempotency_key, IntakeReceipt};

/// Caso de uso de intake: depósito asíncrono.
///
/// Valida la solicitud, calcula la comisión y persiste pago + transacción +
/// tarea en una única transacción del repositorio. La respuesta es
/// inmediata (`processing`); el balance se acredita cuando el worker
/// complete el cargo contra el gateway.
pub struct DepositBalanceUseCase {
    intake_repo: Arc<dyn IntakeRepository>,
    fee_rate: Decimal,
    metrics: Arc<MetricsRegistry>,
}

impl DepositBalanceUseCase {
    pub fn new(
        intake_repo: Arc<dyn IntakeRepository>,
        fee_rate: Decimal,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            intake_repo,
            fee_rate,
            metrics,
        }
    }

    pub async fn execute(
        &self,
        user_id: UserId,
        amount: Decimal,
        idempotency_key: Option<String>,
    ) -> Result<IntakeReceipt, PaymentError> {
        money::validate_amount(amount)?;
        validate_idempotency_key(&idempotency_key)?;

        let commission = money::commission_for(amount, self.fee_rate);
        let outcome = self
            .intake_repo
            .create_deposit(IntakeCommand {
                user_id,
                amount,
                commission,
                idempotency_key,
            })
            .await?;

        match outcome {
            IntakeOutcome::Accepted { payment_id } => {
                self.metrics.inc(counters::PAYMENTS_TASK_ENQUEUED);
                info!(%payment_id, %user_id, %amount, "deposit accepted");
                Ok(IntakeReceipt {
                    payment_id,
                    status: crate::domain::entities::PaymentStatus::Processing,
                })
            }
            IntakeOutcome::Duplicate { payment } => {
                resolve_duplicate(payment, amount, &self.metrics)
            }
            // Los depósitos no validan fondos; este brazo no ocurre.
            IntakeOutcome::Rejected { .. } => Err(PaymentError::InsufficientFunds(user_id)),
        }
    }
}

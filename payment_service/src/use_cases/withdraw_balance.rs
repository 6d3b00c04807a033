use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::entities::PaymentStatus;
use crate::domain::error::PaymentError;
use crate::domain::money;
use crate::domain::repository::{IntakeCommand, IntakeOutcome, IntakeRepository};
use crate::domain::types::UserId;
use crate::metrics::{counters, MetricsRegistry};
use crate::use_cases::{resolve_duplicate, validate_idempotency_key, IntakeReceipt};

/// Caso de uso de intake: retiro asíncrono.
///
/// A diferencia del depósito, el repositorio valida fondos bajo el lock de
/// fila del usuario. Un rechazo deja el pago fallido persistido (sin tarea)
/// y se reporta como `InsufficientFunds`; el applier volverá a chequear el
/// balance al momento de aplicar, porque pudo moverse mientras tanto.
pub struct WithdrawBalanceUseCase {
    intake_repo: Arc<dyn IntakeRepository>,
    fee_rate: Decimal,
    metrics: Arc<MetricsRegistry>,
}

impl WithdrawBalanceUseCase {
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
            .create_withdraw(IntakeCommand {
                user_id,
                amount,
                commission,
                idempotency_key,
            })
            .await?;

        match outcome {
            IntakeOutcome::Accepted { payment_id } => {
                self.metrics.inc(counters::PAYMENTS_TASK_ENQUEUED);
                info!(%payment_id, %user_id, %amount, "withdraw accepted");
                Ok(IntakeReceipt {
                    payment_id,
                    status: PaymentStatus::Processing,
                })
            }
            IntakeOutcome::Duplicate { payment } => {
                resolve_duplicate(payment, amount, &self.metrics)
            }
            IntakeOutcome::Rejected { payment_id } => {
                warn!(%payment_id, %user_id, %amount, "withdraw rejected: insufficient funds");
                Err(PaymentError::InsufficientFunds(user_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use std::str::FromStr;

    use crate::domain::types::PaymentId;

    mock! {
        pub IntakeRepositoryImpl {}

        #[async_trait]
        impl IntakeRepository for IntakeRepositoryImpl {
            async fn create_deposit(&self, cmd: IntakeCommand) -> Result<IntakeOutcome, PaymentError>;
            async fn create_withdraw(&self, cmd: IntakeCommand) -> Result<IntakeOutcome, PaymentError>;
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_withdraw_accepted() {
        let mut mock_repo = MockIntakeRepositoryImpl::new();
        let metrics = Arc::new(MetricsRegistry::new());

        mock_repo
            .expect_create_withdraw()
            .withf(|cmd: &IntakeCommand| cmd.commission == dec("1.00"))
            .times(1)
            .returning(|_| {
                Ok(IntakeOutcome::Accepted {
                    payment_id: PaymentId(3),
                })
            });

        let use_case =
            WithdrawBalanceUseCase::new(Arc::new(mock_repo), dec("0.02"), metrics.clone());

        let receipt = use_case
            .execute(UserId(2), dec("50.00"), None)
            .await
            .unwrap();

        assert_eq!(receipt.payment_id, PaymentId(3));
        assert_eq!(
            metrics.snapshot().get(counters::PAYMENTS_TASK_ENQUEUED),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn test_withdraw_insufficient_funds_surfaces_error() {
        let mut mock_repo = MockIntakeRepositoryImpl::new();

        mock_repo
            .expect_create_withdraw()
            .times(1)
            .returning(|_| {
                Ok(IntakeOutcome::Rejected {
                    payment_id: PaymentId(4),
                })
            });

        let use_case = WithdrawBalanceUseCase::new(
            Arc::new(mock_repo),
            dec("0.02"),
            Arc::new(MetricsRegistry::new()),
        );

        let result = use_case.execute(UserId(2), dec("60.00"), None).await;
        assert!(matches!(
            result,
            Err(PaymentError::InsufficientFunds(UserId(2)))
        ));
    }

    #[tokio::test]
    async fn test_withdraw_user_not_found_propagates() {
        let mut mock_repo = MockIntakeRepositoryImpl::new();

        mock_repo
            .expect_create_withdraw()
            .times(1)
            .returning(|cmd| Err(PaymentError::UserNotFound(cmd.user_id)));

        let use_case = WithdrawBalanceUseCase::new(
            Arc::new(mock_repo),
            dec("0.02"),
            Arc::new(MetricsRegistry::new()),
        );

        let result = use_case.execute(UserId(9), dec("10.00"), None).await;
        assert!(matches!(result, Err(PaymentError::UserNotFound(UserId(9)))));
    }
}

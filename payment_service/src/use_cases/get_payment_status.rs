use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::entities::{PaymentStatus, TransactionStatus};
use crate::domain::error::PaymentError;
use crate::domain::repository::PaymentRepository;
use crate::domain::types::{PaymentId, UserId};

/// Vista de estado de un pago para la API.
#[derive(Debug, Clone)]
pub struct PaymentStatusView {
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub commission: Decimal,
    pub status: PaymentStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub transaction_status: Option<TransactionStatus>,
}

pub struct GetPaymentStatusUseCase {
    payment_repo: Arc<dyn PaymentRepository>,
}

impl GetPaymentStatusUseCase {
    pub fn new(payment_repo: Arc<dyn PaymentRepository>) -> Self {
        Self { payment_repo }
    }

    pub async fn execute(&self, payment_id: PaymentId) -> Result<PaymentStatusView, PaymentError> {
        let payment = self
            .payment_repo
            .find_by_id(payment_id)
            .await?
            .ok_or(PaymentError::PaymentNotFound(payment_id))?;

        let transaction = self.payment_repo.find_transaction(payment_id).await?;

        Ok(PaymentStatusView {
            payment_id: payment.id,
            user_id: payment.user_id,
            amount: payment.amount,
            commission: payment.commission,
            status: payment.status,
            attempts: payment.attempts,
            last_error: payment.last_error,
            transaction_status: transaction.map(|t| t.status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::mock;
    use mockall::predicate::*;
    use std::str::FromStr;

    use crate::domain::entities::{Payment, Transaction};

    mock! {
        pub PaymentRepositoryImpl {}

        #[async_trait]
        impl PaymentRepository for PaymentRepositoryImpl {
            async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>, PaymentError>;
            async fn find_transaction(&self, payment_id: PaymentId) -> Result<Option<Transaction>, PaymentError>;
        }
    }

    #[tokio::test]
    async fn test_status_view_includes_transaction_status() {
        let mut mock_repo = MockPaymentRepositoryImpl::new();
        let payment_id = PaymentId(5);

        mock_repo
            .expect_find_by_id()
            .with(eq(payment_id))
            .times(1)
            .returning(|id| {
                Ok(Some(Payment {
                    id,
                    user_id: UserId(1),
                    amount: Decimal::from_str("10.00").unwrap(),
                    commission: Decimal::from_str("0.20").unwrap(),
                    status: PaymentStatus::Success,
                    idempotency_key: None,
                    attempts: 2,
                    last_error: None,
                    next_retry_at: None,
                    locked_at: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                }))
            });

        mock_repo
            .expect_find_transaction()
            .with(eq(payment_id))
            .times(1)
            .returning(|payment_id| {
                Ok(Some(Transaction {
                    id: crate::domain::types::TransactionId(8),
                    user_id: UserId(1),
                    payment_id: Some(payment_id),
                    amount: Decimal::from_str("10.00").unwrap(),
                    commission: Decimal::from_str("0.20").unwrap(),
                    kind: crate::domain::entities::TransactionType::Deposit,
                    status: TransactionStatus::Success,
                    created_at: Utc::now(),
                }))
            });

        let use_case = GetPaymentStatusUseCase::new(Arc::new(mock_repo));
        let view = use_case.execute(payment_id).await.unwrap();

        assert_eq!(view.status, PaymentStatus::Success);
        assert_eq!(view.attempts, 2);
        assert_eq!(view.transaction_status, Some(TransactionStatus::Success));
    }

    #[tokio::test]
    async fn test_status_not_found() {
        let mut mock_repo = MockPaymentRepositoryImpl::new();

        mock_repo
            .expect_find_by_id()
            .times(1)
            .returning(|_| Ok(None));

        let use_case = GetPaymentStatusUseCase::new(Arc::new(mock_repo));
        let result = use_case.execute(PaymentId(404)).await;

        assert!(matches!(
            result,
            Err(PaymentError::PaymentNotFound(PaymentId(404)))
        ));
    }
}

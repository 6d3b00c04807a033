use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::entities::User;
use crate::domain::error::PaymentError;
use crate::domain::repository::UserRepository;

/// Caso de Uso: alta administrativa de un usuario con balance inicial.
pub struct CreateUserUseCase {
    user_repo: Arc<dyn UserRepository>,
}

impl CreateUserUseCase {
    pub fn new(user_repo: Arc<dyn UserRepository>) -> Self {
        Self { user_repo }
    }

    pub async fn execute(&self, balance: Decimal) -> Result<User, PaymentError> {
        if balance < Decimal::ZERO {
            return Err(PaymentError::ValidationError(
                "initial balance must not be negative".to_string(),
            ));
        }
        self.user_repo.create(balance).await
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

    use crate::domain::types::UserId;

    mock! {
        pub UserRepositoryImpl {}

        #[async_trait]
        impl UserRepository for UserRepositoryImpl {
            async fn create(&self, balance: Decimal) -> Result<User, PaymentError>;
            async fn find_by_id(&self, id: UserId) -> Result<Option<User>, PaymentError>;
        }
    }

    #[tokio::test]
    async fn test_create_user_success() {
        let mut mock_repo = MockUserRepositoryImpl::new();
        let balance = Decimal::from_str("25.00").unwrap();

        mock_repo
            .expect_create()
            .with(eq(balance))
            .times(1)
            .returning(|balance| {
                Ok(User {
                    id: UserId(1),
                    balance,
                    created_at: Utc::now(),
                })
            });

        let use_case = CreateUserUseCase::new(Arc::new(mock_repo));
        let result = use_case.execute(balance).await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap().balance, balance);
    }

    #[tokio::test]
    async fn test_create_user_negative_balance() {
        let mock_repo = MockUserRepositoryImpl::new();

        let use_case = CreateUserUseCase::new(Arc::new(mock_repo));
        let result = use_case.execute(Decimal::from_str("-1.00").unwrap()).await;

        assert!(matches!(result, Err(PaymentError::ValidationError(_))));
    }
}

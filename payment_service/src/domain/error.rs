use thiserror::Error;

use crate::domain::types::{PaymentId, UserId};

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("User not found with ID: {0}")]
    UserNotFound(UserId),

    #[error("Payment not found with ID: {0}")]
    PaymentNotFound(PaymentId),

    #[error("Insufficient funds for user: {0}")]
    InsufficientFunds(UserId),

    #[error("Idempotency key already used with a different request: {0}")]
    IdempotencyConflict(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Payment repository error: {0}")]
    RepositoryError(String),
}

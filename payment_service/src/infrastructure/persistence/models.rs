use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

use crate::domain::entities::{
    DlqEntry, Payment, PaymentStatus, PaymentTask, TaskStatus, Transaction, TransactionStatus,
    TransactionType, User,
};
use crate::domain::types::{PaymentId, TaskId, TransactionId, UserId};

#[derive(Debug, FromRow)]
pub struct UserModel {
    pub id: UserId,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<UserModel> for User {
    fn from(m: UserModel) -> Self {
        Self {
            id: m.id,
            balance: m.balance,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PaymentModel {
    pub id: PaymentId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub commission: Decimal,
    pub status: PaymentStatus,
    pub idempotency_key: Option<String>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentModel> for Payment {
    fn from(m: PaymentModel) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            amount: m.amount,
            commission: m.commission,
            status: m.status,
            idempotency_key: m.idempotency_key,
            attempts: m.attempts,
            last_error: m.last_error,
            next_retry_at: m.next_retry_at,
            locked_at: m.locked_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionModel {
    pub id: TransactionId,
    pub user_id: UserId,
    pub payment_id: Option<PaymentId>,
    pub amount: Decimal,
    pub commission: Decimal,
    #[sqlx(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionModel> for Transaction {
    fn from(m: TransactionModel) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            payment_id: m.payment_id,
            amount: m.amount,
            commission: m.commission,
            kind: m.kind,
            status: m.status,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PaymentTaskModel {
    pub id: TaskId,
    pub payment_id: PaymentId,
    pub status: TaskStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentTaskModel> for PaymentTask {
    fn from(m: PaymentTaskModel) -> Self {
        Self {
            id: m.id,
            payment_id: m.payment_id,
            status: m.status,
            attempts: m.attempts,
            last_error: m.last_error,
            next_retry_at: m.next_retry_at,
            locked_at: m.locked_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct DlqModel {
    pub id: i64,
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub commission: Decimal,
    pub payment_type: String,
    pub error: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl From<DlqModel> for DlqEntry {
    fn from(m: DlqModel) -> Self {
        Self {
            id: m.id,
            payment_id: m.payment_id,
            user_id: m.user_id,
            amount: m.amount,
            commission: m.commission,
            payment_type: m.payment_type,
            error: m.error,
            attempts: m.attempts,
            created_at: m.created_at,
        }
    }
}

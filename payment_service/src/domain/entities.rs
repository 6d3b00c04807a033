use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::types::{PaymentId, TaskId, TransactionId, UserId};

/// Estado del ciclo de vida de un pago.
///
/// `new -> processing -> {success | new (reintento) | failed}`.
/// `success` y `failed` son terminales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    New,
    Processing,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::New => "new",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Processing,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Processing => "processing",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdraw,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdraw => "withdraw",
        }
    }
}

/// Estado de la tarea de procesamiento. La tarea es el registro de
/// *scheduling*; el pago es el registro de *negocio*. Ambos se mantienen
/// sincronizados: pago terminal implica tarea terminal (`done`/`failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_task_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    New,
    Processing,
    Done,
    Failed,
}

/// Modelo de Entidad: User.
///
/// Creado por un administrador. El balance solo lo mutan los appliers del
/// worker dentro de una transacción con lock de fila; nunca es negativo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Modelo de Entidad: Payment.
///
/// Registro de negocio de una solicitud de depósito o retiro. La clave
/// `(user_id, idempotency_key)` es única cuando la clave no es nula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
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

/// Modelo de Entidad: Transaction.
///
/// Exactamente una transacción por pago; su estado refleja el desenlace
/// terminal del pago que la origina.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub payment_id: Option<PaymentId>,
    pub amount: Decimal,
    pub commission: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Modelo de Entidad: PaymentTask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTask {
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

/// Fila de la dead-letter queue. Append-only, una por pago fallido terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
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

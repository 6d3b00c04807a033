use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::entities::{DlqEntry, Payment, Transaction, User};
use crate::domain::error::PaymentError;
use crate::domain::types::{PaymentId, TaskId, UserId};

/// Solicitud de intake ya validada: monto y comisión calculados por el caso
/// de uso, lista para persistirse en una sola transacción de base de datos.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeCommand {
    pub user_id: UserId,
    pub amount: Decimal,
    pub commission: Decimal,
    pub idempotency_key: Option<String>,
}

/// Resultado de una operación de intake.
#[derive(Debug, Clone)]
pub enum IntakeOutcome {
    /// Pago, transacción y tarea insertados; hay trabajo asíncrono pendiente.
    Accepted { payment_id: PaymentId },
    /// Ya existía un pago con la misma `(user_id, idempotency_key)`.
    Duplicate { payment: Payment },
    /// Solo retiros: fondos insuficientes. El pago fallido quedó persistido
    /// con `last_error = "insufficient_funds"` y sin tarea asociada.
    Rejected { payment_id: PaymentId },
}

/// Tarea reservada por un worker. `attempts` ya incluye el intento actual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedTask {
    pub task_id: TaskId,
    pub payment_id: PaymentId,
    pub attempts: i32,
}

/// Resultado de aplicar un éxito del gateway sobre el balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Balance mutado y pago/transacción/tarea finalizados en éxito.
    Applied,
    /// El pago ya estaba finalizado; no se tocó el balance (idempotente).
    AlreadyFinal,
    /// No existe transacción para el pago. El caller debe escalar a fallo
    /// terminal.
    MissingTransaction,
    /// No existe el usuario del pago.
    MissingUser,
    /// Re-chequeo bajo lock de fila: el balance ya no alcanza para el retiro.
    InsufficientFunds,
}

// Port: persistencia de usuarios.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, balance: Decimal) -> Result<User, PaymentError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, PaymentError>;
}

// Port: lecturas de pagos y su transacción asociada.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>, PaymentError>;
    async fn find_transaction(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Transaction>, PaymentError>;
}

/// Port: protocolo de intake. Cada método ejecuta UNA transacción de base de
/// datos: lookup de usuario (con `FOR UPDATE` en retiros), pre-chequeo de
/// idempotencia y los inserts de pago, transacción y tarea.
#[async_trait]
pub trait IntakeRepository: Send + Sync {
    async fn create_deposit(&self, cmd: IntakeCommand) -> Result<IntakeOutcome, PaymentError>;
    async fn create_withdraw(&self, cmd: IntakeCommand) -> Result<IntakeOutcome, PaymentError>;
}

/// Port: el motor durable de tareas. Reserva bajo `FOR UPDATE SKIP LOCKED`
/// y appliers de desenlace, cada uno una transacción atómica con locks de
/// fila en orden `payment_tasks -> payments -> transactions -> users`.
#[async_trait]
pub trait PaymentTaskRepository: Send + Sync {
    /// Reserva la tarea elegible más antigua: `new`, o `processing`
    /// abandonada (`locked_at < stuck_before`), con `next_retry_at` vencido.
    /// Incrementa `attempts` y espeja el estado sobre el pago.
    async fn reserve_next(
        &self,
        now: DateTime<Utc>,
        stuck_before: DateTime<Utc>,
    ) -> Result<Option<ReservedTask>, PaymentError>;

    /// Datos del cargo saliente; `None` si falta el pago o su transacción.
    async fn load_payload(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<ChargePayload>, PaymentError>;

    /// Desenlace exitoso: muta el balance exactamente una vez en la vida del
    /// pago y finaliza pago, transacción y tarea.
    async fn apply_success(&self, task_id: TaskId) -> Result<ApplyOutcome, PaymentError>;

    /// Falla transitoria: tarea y pago vuelven a `new` con el mismo
    /// `next_retry_at`; la transacción permanece `processing`.
    async fn schedule_retry(
        &self,
        task_id: TaskId,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), PaymentError>;

    /// Falla terminal: pago `failed`, transacción `failed`, tarea `failed` y
    /// fila en la DLQ (se omite si ya existe). Devuelve si la DLQ se escribió.
    async fn mark_failed(&self, task_id: TaskId, error: &str) -> Result<bool, PaymentError>;
}

// Port: lectura de la dead-letter queue para revisión del operador.
#[async_trait]
pub trait DlqRepository: Send + Sync {
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<DlqEntry>, PaymentError>;
}

pub use crate::domain::gateways::ChargePayload;

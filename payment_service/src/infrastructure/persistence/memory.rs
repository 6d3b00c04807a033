use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::entities::{
    DlqEntry, Payment, PaymentStatus, PaymentTask, TaskStatus, Transaction, TransactionStatus,
    TransactionType, User,
};
use crate::domain::error::PaymentError;
use crate::domain::gateways::ChargePayload;
use crate::domain::repository::{
    ApplyOutcome, DlqRepository, IntakeCommand, IntakeOutcome, IntakeRepository,
    PaymentRepository, PaymentTaskRepository, ReservedTask, UserRepository,
};
use crate::domain::types::{PaymentId, TaskId, TransactionId, UserId};

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    payments: BTreeMap<i64, Payment>,
    transactions: BTreeMap<i64, Transaction>,
    tasks: BTreeMap<i64, PaymentTask>,
    dlq: Vec<DlqEntry>,
    next_user_id: i64,
    next_payment_id: i64,
    next_transaction_id: i64,
    next_task_id: i64,
    next_dlq_id: i64,
}

impl MemoryState {
    fn transaction_for(&self, payment_id: PaymentId) -> Option<Transaction> {
        self.transactions
            .values()
            .find(|t| t.payment_id == Some(payment_id))
            .cloned()
    }
}

/// Implementación en memoria de todos los ports de persistencia.
///
/// Un único mutex reemplaza a los locks de fila: dentro de él cada operación
/// es atómica y serializada, con la misma semántica que la variante SQL.
/// Es el doble de pruebas del motor completo; no requiere base de datos.
#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    state: Mutex<MemoryState>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn intake(
        &self,
        kind: TransactionType,
        cmd: IntakeCommand,
        check_funds: bool,
    ) -> Result<IntakeOutcome, PaymentError> {
        let mut state = self.lock();
        let now = Utc::now();

        let Some(user) = state.users.get(&cmd.user_id.0).cloned() else {
            return Err(PaymentError::UserNotFound(cmd.user_id));
        };

        if let Some(key) = &cmd.idempotency_key {
            let existing = state
                .payments
                .values()
                .find(|p| p.user_id == cmd.user_id && p.idempotency_key.as_deref() == Some(key));
            if let Some(payment) = existing {
                return Ok(IntakeOutcome::Duplicate {
                    payment: payment.clone(),
                });
            }
        }

        let funded = !check_funds || user.balance >= cmd.amount + cmd.commission;

        state.next_payment_id += 1;
        let payment_id = PaymentId(state.next_payment_id);
        state.payments.insert(
            payment_id.0,
            Payment {
                id: payment_id,
                user_id: cmd.user_id,
                amount: cmd.amount,
                commission: cmd.commission,
                status: if funded {
                    PaymentStatus::New
                } else {
                    PaymentStatus::Failed
                },
                idempotency_key: cmd.idempotency_key.clone(),
                attempts: 0,
                last_error: (!funded).then(|| "insufficient_funds".to_string()),
                next_retry_at: None,
                locked_at: None,
                created_at: now,
                updated_at: now,
            },
        );

        state.next_transaction_id += 1;
        let transaction_id = TransactionId(state.next_transaction_id);
        state.transactions.insert(
            transaction_id.0,
            Transaction {
                id: transaction_id,
                user_id: cmd.user_id,
                payment_id: Some(payment_id),
                amount: cmd.amount,
                commission: cmd.commission,
                kind,
                status: if funded {
                    TransactionStatus::Processing
                } else {
                    TransactionStatus::Failed
                },
                created_at: now,
            },
        );

        if funded {
            state.next_task_id += 1;
            let task_id = TaskId(state.next_task_id);
            state.tasks.insert(
                task_id.0,
                PaymentTask {
                    id: task_id,
                    payment_id,
                    status: TaskStatus::New,
                    attempts: 0,
                    last_error: None,
                    next_retry_at: None,
                    locked_at: None,
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(IntakeOutcome::Accepted { payment_id })
        } else {
            Ok(IntakeOutcome::Rejected { payment_id })
        }
    }

    fn write_dlq(state: &mut MemoryState, payment: &Payment, error: &str, attempts: i32) -> bool {
        if state.dlq.iter().any(|d| d.payment_id == payment.id) {
            return false;
        }
        let payment_type = state
            .transaction_for(payment.id)
            .map(|t| t.kind.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        state.next_dlq_id += 1;
        state.dlq.push(DlqEntry {
            id: state.next_dlq_id,
            payment_id: payment.id,
            user_id: payment.user_id,
            amount: payment.amount,
            commission: payment.commission,
            payment_type,
            error: error.to_string(),
            attempts,
            created_at: Utc::now(),
        });
        true
    }
}

#[async_trait]
impl UserRepository for InMemoryPaymentStore {
    async fn create(&self, balance: Decimal) -> Result<User, PaymentError> {
        if balance < Decimal::ZERO {
            return Err(PaymentError::ValidationError(
                "balance must not be negative".to_string(),
            ));
        }
        let mut state = self.lock();
        state.next_user_id += 1;
        let user = User {
            id: UserId(state.next_user_id),
            balance,
            created_at: Utc::now(),
        };
        state.users.insert(user.id.0, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, PaymentError> {
        Ok(self.lock().users.get(&id.0).cloned())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentStore {
    async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>, PaymentError> {
        Ok(self.lock().payments.get(&id.0).cloned())
    }

    async fn find_transaction(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Transaction>, PaymentError> {
        Ok(self.lock().transaction_for(payment_id))
    }
}

#[async_trait]
impl IntakeRepository for InMemoryPaymentStore {
    async fn create_deposit(&self, cmd: IntakeCommand) -> Result<IntakeOutcome, PaymentError> {
        self.intake(TransactionType::Deposit, cmd, false)
    }

    async fn create_withdraw(&self, cmd: IntakeCommand) -> Result<IntakeOutcome, PaymentError> {
        self.intake(TransactionType::Withdraw, cmd, true)
    }
}

#[async_trait]
impl PaymentTaskRepository for InMemoryPaymentStore {
    async fn reserve_next(
        &self,
        now: DateTime<Utc>,
        stuck_before: DateTime<Utc>,
    ) -> Result<Option<ReservedTask>, PaymentError> {
        let mut state = self.lock();

        loop {
            let mut candidates: Vec<_> = state
                .tasks
                .values()
                .filter(|t| {
                    let eligible_status = t.status == TaskStatus::New
                        || (t.status == TaskStatus::Processing
                            && t.locked_at.is_some_and(|locked| locked < stuck_before));
                    let due = t.next_retry_at.map_or(true, |retry| retry <= now);
                    eligible_status && due
                })
                .map(|t| (t.created_at, t.id))
                .collect();
            candidates.sort();

            let Some(&(_, task_id)) = candidates.first() else {
                return Ok(None);
            };

            let payment_id = state.tasks[&task_id.0].payment_id;
            let attempts = state.tasks[&task_id.0].attempts + 1;
            {
                let task = state.tasks.get_mut(&task_id.0).expect("task just selected");
                task.status = TaskStatus::Processing;
                task.attempts = attempts;
                task.locked_at = Some(now);
                task.next_retry_at = None;
                task.updated_at = now;
            }

            let payment_status = state.payments.get(&payment_id.0).map(|p| p.status);
            match payment_status {
                None => {
                    let task = state.tasks.get_mut(&task_id.0).expect("task just selected");
                    task.status = TaskStatus::Failed;
                    task.last_error = Some("missing_payment".to_string());
                    task.locked_at = None;
                    continue;
                }
                Some(PaymentStatus::Success) => {
                    let task = state.tasks.get_mut(&task_id.0).expect("task just selected");
                    task.status = TaskStatus::Done;
                    task.locked_at = None;
                    continue;
                }
                Some(PaymentStatus::Failed) => {
                    let task = state.tasks.get_mut(&task_id.0).expect("task just selected");
                    task.status = TaskStatus::Failed;
                    task.locked_at = None;
                    continue;
                }
                Some(_) => {}
            }

            let payment = state
                .payments
                .get_mut(&payment_id.0)
                .expect("payment checked above");
            payment.status = PaymentStatus::Processing;
            payment.attempts = attempts;
            payment.locked_at = Some(now);
            payment.next_retry_at = None;
            payment.updated_at = now;

            return Ok(Some(ReservedTask {
                task_id,
                payment_id,
                attempts,
            }));
        }
    }

    async fn load_payload(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<ChargePayload>, PaymentError> {
        let state = self.lock();
        let Some(payment) = state.payments.get(&payment_id.0) else {
            return Ok(None);
        };
        let Some(transaction) = state.transaction_for(payment_id) else {
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
        let mut state = self.lock();
        let now = Utc::now();

        let Some(task) = state.tasks.get(&task_id.0).cloned() else {
            return Ok(ApplyOutcome::AlreadyFinal);
        };
        let Some(payment) = state.payments.get(&task.payment_id.0).cloned() else {
            return Ok(ApplyOutcome::AlreadyFinal);
        };

        if payment.status == PaymentStatus::Success {
            let entry = state.tasks.get_mut(&task_id.0).expect("task fetched above");
            entry.status = TaskStatus::Done;
            entry.locked_at = None;
            entry.updated_at = now;
            return Ok(ApplyOutcome::AlreadyFinal);
        }

        let Some(transaction) = state.transaction_for(payment.id) else {
            return Ok(ApplyOutcome::MissingTransaction);
        };
        let Some(user) = state.users.get(&payment.user_id.0).cloned() else {
            return Ok(ApplyOutcome::MissingUser);
        };

        let new_balance = match transaction.kind {
            TransactionType::Deposit => user.balance + payment.amount - payment.commission,
            TransactionType::Withdraw => {
                let total = payment.amount + payment.commission;
                if user.balance < total {
                    return Ok(ApplyOutcome::InsufficientFunds);
                }
                user.balance - total
            }
        };

        state
            .users
            .get_mut(&user.id.0)
            .expect("user fetched above")
            .balance = new_balance;

        let payment_entry = state
            .payments
            .get_mut(&payment.id.0)
            .expect("payment fetched above");
        payment_entry.status = PaymentStatus::Success;
        payment_entry.last_error = None;
        payment_entry.locked_at = None;
        payment_entry.next_retry_at = None;
        payment_entry.updated_at = now;

        state
            .transactions
            .get_mut(&transaction.id.0)
            .expect("transaction fetched above")
            .status = TransactionStatus::Success;

        let task_entry = state.tasks.get_mut(&task_id.0).expect("task fetched above");
        task_entry.status = TaskStatus::Done;
        task_entry.last_error = None;
        task_entry.locked_at = None;
        task_entry.next_retry_at = None;
        task_entry.updated_at = now;

        Ok(ApplyOutcome::Applied)
    }

    async fn schedule_retry(
        &self,
        task_id: TaskId,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        let mut state = self.lock();
        let now = Utc::now();

        let Some(payment_id) = state.tasks.get(&task_id.0).map(|t| t.payment_id) else {
            return Ok(());
        };

        let task = state.tasks.get_mut(&task_id.0).expect("task fetched above");
        task.status = TaskStatus::New;
        task.last_error = Some(error.to_string());
        task.next_retry_at = Some(next_retry_at);
        task.locked_at = None;
        task.updated_at = now;

        if let Some(payment) = state.payments.get_mut(&payment_id.0) {
            payment.status = PaymentStatus::New;
            payment.last_error = Some(error.to_string());
            payment.next_retry_at = Some(next_retry_at);
            payment.locked_at = None;
            payment.updated_at = now;
        }

        Ok(())
    }

    async fn mark_failed(&self, task_id: TaskId, error: &str) -> Result<bool, PaymentError> {
        let mut state = self.lock();
        let now = Utc::now();

        let Some(task) = state.tasks.get(&task_id.0).cloned() else {
            return Ok(false);
        };

        {
            let entry = state.tasks.get_mut(&task_id.0).expect("task fetched above");
            entry.status = TaskStatus::Failed;
            entry.last_error = Some(error.to_string());
            entry.locked_at = None;
            entry.updated_at = now;
        }

        let Some(payment) = state.payments.get(&task.payment_id.0).cloned() else {
            return Ok(false);
        };

        {
            let entry = state
                .payments
                .get_mut(&payment.id.0)
                .expect("payment fetched above");
            entry.status = PaymentStatus::Failed;
            entry.last_error = Some(error.to_string());
            entry.locked_at = None;
            entry.next_retry_at = None;
            entry.updated_at = now;
        }

        if let Some(transaction) = state.transaction_for(payment.id) {
            state
                .transactions
                .get_mut(&transaction.id.0)
                .expect("transaction fetched above")
                .status = TransactionStatus::Failed;
        }

        Ok(Self::write_dlq(&mut state, &payment, error, task.attempts))
    }
}

#[async_trait]
impl DlqRepository for InMemoryPaymentStore {
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<DlqEntry>, PaymentError> {
        let state = self.lock();
        let mut entries = state.dlq.clone();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

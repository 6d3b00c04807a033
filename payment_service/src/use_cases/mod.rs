pub mod create_user;
pub mod deposit_balance;
pub mod get_payment_status;
pub mod process_payment;
pub mod withdraw_balance;

use rust_decimal::Decimal;

use crate::domain::entities::{Payment, PaymentStatus};
use crate::domain::error::PaymentError;
use crate::domain::types::PaymentId;
use crate::metrics::{counters, MetricsRegistry};

/// Resultado del intake: el pago quedó registrado y, salvo duplicados ya
/// finalizados, su procesamiento sigue en curso.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeReceipt {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
}

const MAX_IDEMPOTENCY_KEY_LEN: usize = 64;

fn validate_idempotency_key(key: &Option<String>) -> Result<(), PaymentError> {
    if let Some(key) = key {
        if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(PaymentError::ValidationError(format!(
                "idempotency key must be between 1 and {MAX_IDEMPOTENCY_KEY_LEN} characters"
            )));
        }
    }
    Ok(())
}

/// Resuelve un intake duplicado: misma clave y mismo monto devuelven el pago
/// original; un monto distinto bajo la misma clave es un conflicto.
fn resolve_duplicate(
    payment: Payment,
    amount: Decimal,
    metrics: &MetricsRegistry,
) -> Result<IntakeReceipt, PaymentError> {
    if payment.amount != amount {
        return Err(PaymentError::IdempotencyConflict(
            payment.idempotency_key.unwrap_or_default(),
        ));
    }
    metrics.inc(counters::IDEMPOTENCY_HITS);
    let status = if payment.status == PaymentStatus::New {
        PaymentStatus::Processing
    } else {
        payment.status
    };
    Ok(IntakeReceipt {
        payment_id: payment.id,
        status,
    })
}

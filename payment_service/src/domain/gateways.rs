use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::entities::TransactionType;
use crate::domain::types::{PaymentId, UserId};

/// Payload del cargo saliente hacia el gateway de pagos.
///
/// Los montos viajan como strings numéricos (serde default de
/// `rust_decimal`) para evitar deriva de floats en el wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargePayload {
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub commission: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
}

/// Respuesta clasificada del gateway. El cliente no reintenta; la decisión
/// de reintento es del scheduler externo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub success: bool,
    pub error_code: Option<String>,
    pub retryable: bool,
}

impl GatewayResponse {
    pub fn approved() -> Self {
        Self {
            success: true,
            error_code: None,
            retryable: false,
        }
    }

    /// Falla transitoria: timeout, conexión caída, 5xx o 429.
    pub fn retryable(error_code: impl Into<String>) -> Self {
        Self {
            success: false,
            error_code: Some(error_code.into()),
            retryable: true,
        }
    }

    /// Rechazo definitivo (resto de 4xx).
    pub fn rejected(error_code: impl Into<String>) -> Self {
        Self {
            success: false,
            error_code: Some(error_code.into()),
            retryable: false,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Ejecuta el cargo y clasifica el desenlace. Nunca devuelve error: toda
    /// falla de transporte o HTTP llega clasificada en `GatewayResponse`.
    async fn charge(&self, payload: &ChargePayload) -> GatewayResponse;
}

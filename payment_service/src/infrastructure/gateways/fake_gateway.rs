use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::info;

use crate::domain::gateways::{ChargePayload, GatewayResponse, PaymentGateway};

/// Implementación Fake del gateway para desarrollo y testing.
///
/// Por defecto aprueba todos los cargos. Con `with_script` responde la
/// secuencia dada en orden y vuelve a aprobar cuando se agota, lo que
/// permite simular un gateway inestable (503, 503, 200...) sin red.
pub struct FakePaymentGateway {
    script: Mutex<VecDeque<GatewayResponse>>,
}

impl FakePaymentGateway {
    pub fn approving() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_script(responses: Vec<GatewayResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn charge(&self, payload: &ChargePayload) -> GatewayResponse {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let response = scripted.unwrap_or_else(GatewayResponse::approved);
        info!(
            payment_id = %payload.payment_id,
            amount = %payload.amount,
            kind = payload.kind.as_str(),
            success = response.success,
            "[FakePaymentGateway] charge"
        );
        response
    }
}

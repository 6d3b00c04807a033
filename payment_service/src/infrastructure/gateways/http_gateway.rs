use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::warn;

use crate::domain::gateways::{ChargePayload, GatewayResponse, PaymentGateway};

/// Cliente HTTP del gateway de pagos externo.
///
/// Un POST JSON con timeout configurado; la respuesta se clasifica por
/// código de estado. Acá no hay reintentos: esa decisión pertenece al
/// scheduler del worker.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    url: String,
}

impl HttpPaymentGateway {
    pub fn new(url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

/// Clasificación por código HTTP: 2xx éxito; 429 y 5xx transitorios; el
/// resto de 4xx es rechazo definitivo.
fn classify_status(status: StatusCode) -> GatewayResponse {
    if status.is_success() {
        return GatewayResponse::approved();
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return GatewayResponse::retryable(format!("http_{}", status.as_u16()));
    }
    GatewayResponse::rejected(format!("http_{}", status.as_u16()))
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge(&self, payload: &ChargePayload) -> GatewayResponse {
        let result = self.client.post(&self.url).json(payload).send().await;

        match result {
            // Solo importa el código de estado; el cuerpo se descarta.
            Ok(response) => classify_status(response.status()),
            Err(e) if e.is_timeout() => {
                warn!(payment_id = %payload.payment_id, "gateway request timed out");
                GatewayResponse::retryable("timeout")
            }
            Err(e) => {
                warn!(payment_id = %payload.payment_id, error = %e, "gateway request failed");
                GatewayResponse::retryable("connection_error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;

    use crate::domain::entities::TransactionType;
    use crate::domain::types::{PaymentId, UserId};

    #[rstest]
    #[case(200, true, None, false)]
    #[case(201, true, None, false)]
    #[case(429, false, Some("http_429"), true)]
    #[case(500, false, Some("http_500"), true)]
    #[case(503, false, Some("http_503"), true)]
    #[case(400, false, Some("http_400"), false)]
    #[case(404, false, Some("http_404"), false)]
    #[case(422, false, Some("http_422"), false)]
    fn classifies_status_codes(
        #[case] status: u16,
        #[case] success: bool,
        #[case] error_code: Option<&str>,
        #[case] retryable: bool,
    ) {
        let response = classify_status(StatusCode::from_u16(status).unwrap());
        assert_eq!(response.success, success);
        assert_eq!(response.error_code.as_deref(), error_code);
        assert_eq!(response.retryable, retryable);
    }

    #[test]
    fn payload_serializes_amounts_as_strings() {
        let payload = ChargePayload {
            payment_id: PaymentId(7),
            user_id: UserId(1),
            amount: Decimal::new(10050, 2),
            commission: Decimal::new(201, 2),
            kind: TransactionType::Withdraw,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["payment_id"], 7);
        assert_eq!(json["amount"], "100.50");
        assert_eq!(json["commission"], "2.01");
        assert_eq!(json["type"], "withdraw");
    }
}

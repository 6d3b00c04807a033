use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use utoipa::ToSchema;

/// Gateway simulado para desarrollo: permite correr el flujo completo sin un
/// gateway real apuntando `PAYMENT_GATEWAY_URL` a este endpoint. Responde
/// con una distribución de fallas fija: 10% timeout simulado, 25% error 502.
#[derive(Clone)]
pub struct MockGatewayState {
    client_timeout: Duration,
}

pub fn routes(client_timeout: Duration) -> Router {
    Router::new()
        .route("/mock-gateway/pay", post(mock_pay))
        .with_state(MockGatewayState { client_timeout })
}

#[derive(Deserialize, ToSchema)]
pub struct MockChargeRequest {
    pub payment_id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub commission: Decimal,
    #[serde(rename = "type")]
    pub kind: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/mock-gateway/pay",
    request_body = MockChargeRequest,
    responses(
        (status = 200, description = "Cargo aprobado (o timeout simulado)"),
        (status = 502, description = "Error simulado del gateway")
    )
)]
pub async fn mock_pay(
    axum::extract::State(state): axum::extract::State<MockGatewayState>,
    Json(_payload): Json<MockChargeRequest>,
) -> Response {
    let roll: f64 = rand::thread_rng().gen();

    // 10%: dormimos más que el timeout del cliente para forzar su expiración.
    if roll < 0.10 {
        tokio::time::sleep(state.client_timeout + Duration::from_millis(500)).await;
        return Json(json!({"status": "timeout"})).into_response();
    }

    // 25%: error transitorio.
    if roll < 0.35 {
        return (
            StatusCode::BAD_GATEWAY,
            Json(json!({"status": "error", "message": "gateway_error"})),
        )
            .into_response();
    }

    Json(json!({"status": "ok"})).into_response()
}

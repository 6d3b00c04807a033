use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::error::PaymentError;

// Error unificado de la API: traduce errores de dominio a HTTP.
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.0 {
            PaymentError::UserNotFound(_) => {
                (StatusCode::NOT_FOUND, "user_not_found", self.0.to_string())
            }
            PaymentError::PaymentNotFound(_) => (
                StatusCode::NOT_FOUND,
                "payment_not_found",
                self.0.to_string(),
            ),
            PaymentError::InsufficientFunds(_) => (
                StatusCode::BAD_REQUEST,
                "insufficient_funds",
                self.0.to_string(),
            ),
            PaymentError::IdempotencyConflict(_) => (
                StatusCode::CONFLICT,
                "idempotency_conflict",
                self.0.to_string(),
            ),
            PaymentError::ValidationError(_) => {
                (StatusCode::BAD_REQUEST, "bad_request", self.0.to_string())
            }
            PaymentError::RepositoryError(ref e) => {
                // El detalle interno va al log, no al cliente.
                tracing::error!("database repository error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "db_unavailable",
                    "Database temporarily unavailable".to_string(),
                )
            }
        };

        let body = Json(json!({
            "status": "error",
            "error": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::api::error::ApiError;
use crate::domain::entities::DlqEntry;
use crate::domain::error::PaymentError;
use crate::domain::repository::DlqRepository;
use crate::domain::types::{PaymentId, UserId};
use crate::metrics::{counters, MetricsRegistry};
use crate::use_cases::{
    create_user::CreateUserUseCase, deposit_balance::DepositBalanceUseCase,
    get_payment_status::GetPaymentStatusUseCase, withdraw_balance::WithdrawBalanceUseCase,
    IntakeReceipt,
};

// Estado compartido de la aplicación
pub struct AppState {
    pub create_user_use_case: CreateUserUseCase,
    pub deposit_use_case: DepositBalanceUseCase,
    pub withdraw_use_case: WithdrawBalanceUseCase,
    pub payment_status_use_case: GetPaymentStatusUseCase,
    pub dlq_repo: Arc<dyn DlqRepository>,
    pub metrics: Arc<MetricsRegistry>,
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/users", post(create_user))
        .route("/payments/deposit", post(payments_deposit))
        .route("/payments/withdraw", post(payments_withdraw))
        .route("/payments/{id}", get(payment_status))
        .route("/dlq", get(list_dlq))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

/// Rutas de monitoreo con acceso directo al pool (probe de base de datos).
pub fn monitoring_routes(pool: PgPool) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(pool)
}

// DTO de entrada para crear usuario
#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub balance: Decimal,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub balance: Decimal,
}

#[derive(Deserialize, ToSchema)]
pub struct DepositRequest {
    pub user_id: i64,
    pub deposit: Decimal,
}

#[derive(Deserialize, ToSchema)]
pub struct WithdrawRequest {
    pub user_id: i64,
    pub amount: Decimal,
}

// Respuesta del intake: el monto vuelve bajo el nombre de la operación.
#[derive(Serialize, ToSchema)]
pub struct PaymentCreateResponse {
    pub payment_id: i64,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdraw: Option<Decimal>,
    pub status: String,
}

impl PaymentCreateResponse {
    fn deposit(receipt: IntakeReceipt, user_id: i64, amount: Decimal) -> Self {
        Self {
            payment_id: receipt.payment_id.0,
            user_id,
            deposit: Some(amount),
            withdraw: None,
            status: receipt.status.as_str().to_string(),
        }
    }

    fn withdraw(receipt: IntakeReceipt, user_id: i64, amount: Decimal) -> Self {
        Self {
            payment_id: receipt.payment_id.0,
            user_id,
            deposit: None,
            withdraw: Some(amount),
            status: receipt.status.as_str().to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub payment_id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub commission: Decimal,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub transaction_status: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct DlqQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct DlqEntryResponse {
    pub id: i64,
    pub payment_id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub commission: Decimal,
    pub payment_type: String,
    pub error: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl From<DlqEntry> for DlqEntryResponse {
    fn from(entry: DlqEntry) -> Self {
        Self {
            id: entry.id,
            payment_id: entry.payment_id.0,
            user_id: entry.user_id.0,
            amount: entry.amount,
            commission: entry.commission,
            payment_type: entry.payment_type,
            error: entry.error,
            attempts: entry.attempts,
            created_at: entry.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    match headers.get("Idempotency-Key") {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.to_string()))
            .map_err(|_| {
                ApiError(PaymentError::ValidationError(
                    "Idempotency-Key header must be valid UTF-8".to_string(),
                ))
            }),
    }
}

// Handler: Alta administrativa de usuario
// POST /api/v1/users
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "Usuario creado", body = UserResponse),
        (status = 400, description = "Balance inválido")
    )
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.create_user_use_case.execute(payload.balance).await?;
    Ok(Json(UserResponse {
        id: user.id.0,
        balance: user.balance,
    }))
}

// Handler: Depósito asíncrono
// POST /api/v1/payments/deposit
#[utoipa::path(
    post,
    path = "/api/v1/payments/deposit",
    request_body = DepositRequest,
    responses(
        (status = 200, description = "Pago aceptado, procesamiento en curso", body = PaymentCreateResponse),
        (status = 404, description = "Usuario inexistente"),
        (status = 409, description = "Clave de idempotencia en conflicto")
    )
)]
pub async fn payments_deposit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<DepositRequest>,
) -> Result<Json<PaymentCreateResponse>, ApiError> {
    state.metrics.inc(counters::PAYMENTS_DEPOSIT_REQUESTS);
    let key = idempotency_key(&headers)?;
    info!(
        user_id = payload.user_id,
        amount = %payload.deposit,
        idempotent = key.is_some(),
        "deposit request"
    );

    let receipt = state
        .deposit_use_case
        .execute(UserId(payload.user_id), payload.deposit, key)
        .await?;

    Ok(Json(PaymentCreateResponse::deposit(
        receipt,
        payload.user_id,
        payload.deposit,
    )))
}

// Handler: Retiro asíncrono
// POST /api/v1/payments/withdraw
#[utoipa::path(
    post,
    path = "/api/v1/payments/withdraw",
    request_body = WithdrawRequest,
    responses(
        (status = 200, description = "Pago aceptado, procesamiento en curso", body = PaymentCreateResponse),
        (status = 400, description = "Fondos insuficientes"),
        (status = 404, description = "Usuario inexistente"),
        (status = 409, description = "Clave de idempotencia en conflicto")
    )
)]
pub async fn payments_withdraw(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<WithdrawRequest>,
) -> Result<Json<PaymentCreateResponse>, ApiError> {
    state.metrics.inc(counters::PAYMENTS_WITHDRAW_REQUESTS);
    let key = idempotency_key(&headers)?;
    info!(
        user_id = payload.user_id,
        amount = %payload.amount,
        idempotent = key.is_some(),
        "withdraw request"
    );

    let receipt = state
        .withdraw_use_case
        .execute(UserId(payload.user_id), payload.amount, key)
        .await?;

    Ok(Json(PaymentCreateResponse::withdraw(
        receipt,
        payload.user_id,
        payload.amount,
    )))
}

// Handler: Estado de un pago
// GET /api/v1/payments/{id}
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    params(("id" = i64, Path, description = "ID del pago")),
    responses(
        (status = 200, description = "Estado actual del pago", body = PaymentStatusResponse),
        (status = 404, description = "Pago inexistente")
    )
)]
pub async fn payment_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let view = state
        .payment_status_use_case
        .execute(PaymentId(id))
        .await?;

    Ok(Json(PaymentStatusResponse {
        payment_id: view.payment_id.0,
        user_id: view.user_id.0,
        amount: view.amount,
        commission: view.commission,
        status: view.status.as_str().to_string(),
        attempts: view.attempts,
        last_error: view.last_error,
        transaction_status: view.transaction_status.map(|s| s.as_str().to_string()),
    }))
}

// Handler: Dead-letter queue paginada
// GET /api/v1/dlq
#[utoipa::path(
    get,
    path = "/api/v1/dlq",
    params(DlqQuery),
    responses((status = 200, description = "Pagos con falla terminal", body = [DlqEntryResponse]))
)]
pub async fn list_dlq(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DlqQuery>,
) -> Result<Json<Vec<DlqEntryResponse>>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    let entries = state.dlq_repo.list(limit, offset).await?;
    Ok(Json(entries.into_iter().map(|e| e.into()).collect()))
}

// Handler: Snapshot de contadores del proceso
// GET /api/v1/metrics
#[utoipa::path(
    get,
    path = "/api/v1/metrics",
    responses((status = 200, description = "Contadores acumulados"))
)]
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, u64>> {
    Json(state.metrics.snapshot())
}

// Handler: Health-check con probe de base de datos
// GET /api/v1/health
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Estado del servicio", body = HealthResponse))
)]
pub async fn health_check(State(pool): State<PgPool>) -> Json<HealthResponse> {
    let db_ok = sqlx::query("SELECT 1").execute(&pool).await.is_ok();
    let status = if db_ok { "ok" } else { "degraded" };
    info!(status, db_ok, "health check");

    Json(HealthResponse {
        status: status.to_string(),
        database: if db_ok { "ok" } else { "unavailable" }.to_string(),
    })
}

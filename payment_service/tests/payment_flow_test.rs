use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use payment_service::api::http_routes::{
    list_dlq, payment_status, payments_deposit, payments_withdraw, AppState, DepositRequest,
    DlqQuery, WithdrawRequest,
};
use payment_service::domain::entities::{Payment, PaymentStatus, TransactionStatus};
use payment_service::domain::error::PaymentError;
use payment_service::domain::gateways::GatewayResponse;
use payment_service::domain::repository::{
    ApplyOutcome, DlqRepository, IntakeCommand, IntakeOutcome, IntakeRepository,
    PaymentRepository, PaymentTaskRepository, UserRepository,
};
use payment_service::domain::retry::RetryPolicy;
use payment_service::domain::types::{PaymentId, UserId};
use payment_service::infrastructure::gateways::fake_gateway::FakePaymentGateway;
use payment_service::infrastructure::persistence::memory::InMemoryPaymentStore;
use payment_service::metrics::{counters, MetricsRegistry};
use payment_service::use_cases::create_user::CreateUserUseCase;
use payment_service::use_cases::deposit_balance::DepositBalanceUseCase;
use payment_service::use_cases::get_payment_status::GetPaymentStatusUseCase;
use payment_service::use_cases::process_payment::{ProcessPaymentUseCase, WorkerTick};
use payment_service::use_cases::withdraw_balance::WithdrawBalanceUseCase;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

struct TestHarness {
    store: Arc<InMemoryPaymentStore>,
    metrics: Arc<MetricsRegistry>,
    deposit: DepositBalanceUseCase,
    withdraw: WithdrawBalanceUseCase,
    processor: ProcessPaymentUseCase,
}

/// Harness completo sin base de datos: store en memoria + gateway guionado.
/// El backoff es cero para que los reintentos sean elegibles de inmediato.
fn harness(script: Vec<GatewayResponse>, max_attempts: i32) -> TestHarness {
    let store = Arc::new(InMemoryPaymentStore::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let gateway = Arc::new(FakePaymentGateway::with_script(script));
    let fee_rate = dec("0.02");
    let policy = RetryPolicy {
        max_attempts,
        backoff_base: Duration::ZERO,
        backoff_max: Duration::ZERO,
        jitter: Duration::ZERO,
    };

    TestHarness {
        deposit: DepositBalanceUseCase::new(store.clone(), fee_rate, metrics.clone()),
        withdraw: WithdrawBalanceUseCase::new(store.clone(), fee_rate, metrics.clone()),
        processor: ProcessPaymentUseCase::new(
            store.clone(),
            gateway,
            policy,
            Duration::from_secs(30),
            metrics.clone(),
        ),
        store,
        metrics,
    }
}

async fn new_user(store: &InMemoryPaymentStore, balance: &str) -> UserId {
    UserRepository::create(store, dec(balance)).await.unwrap().id
}

async fn balance_of(store: &InMemoryPaymentStore, id: UserId) -> Decimal {
    UserRepository::find_by_id(store, id)
        .await
        .unwrap()
        .unwrap()
        .balance
}

async fn payment_of(store: &InMemoryPaymentStore, id: PaymentId) -> Payment {
    PaymentRepository::find_by_id(store, id)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn happy_deposit_credits_net_amount() {
    let h = harness(vec![GatewayResponse::approved()], 3);
    let user_id = new_user(&h.store, "0.00").await;

    let receipt = h.deposit.execute(user_id, dec("100.00"), None).await.unwrap();
    assert_eq!(receipt.status, PaymentStatus::Processing);

    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Completed);

    assert_eq!(balance_of(&h.store, user_id).await, dec("98.00"));

    let payment = payment_of(&h.store, receipt.payment_id).await;
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.commission, dec("2.00"));
    assert_eq!(payment.last_error, None);

    let transaction = h
        .store
        .find_transaction(receipt.payment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Success);

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.get(counters::PAYMENTS_SUCCESS), Some(&1));
    assert_eq!(snapshot.get(counters::PAYMENTS_TASK_ENQUEUED), Some(&1));
}

#[tokio::test]
async fn withdraw_insufficient_at_intake_persists_failed_payment() {
    let h = harness(vec![], 3);
    let user_id = new_user(&h.store, "50.00").await;

    let result = h.withdraw.execute(user_id, dec("60.00"), None).await;
    assert!(matches!(result, Err(PaymentError::InsufficientFunds(_))));

    // El pago fallido queda registrado, sin tarea: el worker no ve trabajo.
    let outcome = h
        .store
        .create_withdraw(IntakeCommand {
            user_id,
            amount: dec("70.00"),
            commission: dec("1.40"),
            idempotency_key: None,
        })
        .await
        .unwrap();
    let IntakeOutcome::Rejected { payment_id } = outcome else {
        panic!("expected Rejected outcome");
    };
    let payment = payment_of(&h.store, payment_id).await;
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.last_error.as_deref(), Some("insufficient_funds"));

    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Idle);
    assert_eq!(balance_of(&h.store, user_id).await, dec("50.00"));
}

#[tokio::test]
async fn retryable_failure_then_success() {
    let h = harness(
        vec![
            GatewayResponse::retryable("http_503"),
            GatewayResponse::approved(),
        ],
        3,
    );
    let user_id = new_user(&h.store, "0.00").await;

    let receipt = h.deposit.execute(user_id, dec("10.00"), None).await.unwrap();

    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Retried);
    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Completed);

    assert_eq!(balance_of(&h.store, user_id).await, dec("9.80"));

    let payment = payment_of(&h.store, receipt.payment_id).await;
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.attempts, 2);

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.get(counters::PAYMENTS_RETRIED), Some(&1));
    assert_eq!(snapshot.get(counters::GATEWAY_ERRORS), Some(&1));
}

#[tokio::test]
async fn exhausted_retries_land_in_dlq() {
    let h = harness(
        vec![
            GatewayResponse::retryable("http_503"),
            GatewayResponse::retryable("http_503"),
            GatewayResponse::retryable("http_503"),
        ],
        3,
    );
    let user_id = new_user(&h.store, "0.00").await;

    let receipt = h.deposit.execute(user_id, dec("50.00"), None).await.unwrap();

    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Retried);
    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Retried);
    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Failed);

    let payment = payment_of(&h.store, receipt.payment_id).await;
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.attempts, 3);
    assert_eq!(balance_of(&h.store, user_id).await, dec("0.00"));

    let dlq = h.store.list(50, 0).await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].payment_id, receipt.payment_id);
    assert_eq!(dlq[0].payment_type, "deposit");
    assert_eq!(dlq[0].attempts, 3);

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.get(counters::PAYMENTS_FAILED), Some(&1));
    assert_eq!(snapshot.get(counters::DLQ_WRITTEN), Some(&1));

    // Sin tareas restantes: la falla es terminal.
    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Idle);
}

#[tokio::test]
async fn duplicate_idempotency_key_returns_same_payment() {
    let h = harness(vec![GatewayResponse::approved()], 3);
    let user_id = new_user(&h.store, "0.00").await;
    let key = Some("abc".to_string());

    let first = h
        .deposit
        .execute(user_id, dec("5.00"), key.clone())
        .await
        .unwrap();
    let second = h
        .deposit
        .execute(user_id, dec("5.00"), key.clone())
        .await
        .unwrap();
    assert_eq!(first.payment_id, second.payment_id);

    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Completed);
    // Una sola tarea encolada: el duplicado no generó trabajo extra.
    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Idle);
    assert_eq!(balance_of(&h.store, user_id).await, dec("4.90"));

    assert_eq!(
        h.metrics.snapshot().get(counters::IDEMPOTENCY_HITS),
        Some(&1)
    );

    // Misma clave con otro monto: conflicto.
    let conflict = h.deposit.execute(user_id, dec("9.00"), key).await;
    assert!(matches!(
        conflict,
        Err(PaymentError::IdempotencyConflict(_))
    ));
}

#[tokio::test]
async fn stuck_task_is_recovered_by_another_worker() {
    let h = harness(vec![], 3);
    let user_id = new_user(&h.store, "0.00").await;
    h.deposit.execute(user_id, dec("20.00"), None).await.unwrap();

    // Worker A reserva en t0 y muere sin aplicar desenlace.
    let t0 = Utc::now();
    let first = h
        .store
        .reserve_next(t0, t0 - ChronoDuration::seconds(30))
        .await
        .unwrap()
        .expect("task should be reservable");
    assert_eq!(first.attempts, 1);

    // Antes del timeout de processing nadie la puede reservar.
    let t1 = t0 + ChronoDuration::seconds(10);
    let too_early = h
        .store
        .reserve_next(t1, t1 - ChronoDuration::seconds(30))
        .await
        .unwrap();
    assert!(too_early.is_none());

    // Pasado el timeout, worker B la recupera con attempts incrementado.
    let t2 = t0 + ChronoDuration::seconds(31);
    let recovered = h
        .store
        .reserve_next(t2, t2 - ChronoDuration::seconds(30))
        .await
        .unwrap()
        .expect("stuck task should be reservable again");
    assert_eq!(recovered.task_id, first.task_id);
    assert_eq!(recovered.attempts, 2);

    assert_eq!(
        h.store.apply_success(recovered.task_id).await.unwrap(),
        ApplyOutcome::Applied
    );
    assert_eq!(balance_of(&h.store, user_id).await, dec("19.60"));
}

#[tokio::test]
async fn withdraw_exact_balance_drains_to_zero() {
    let h = harness(vec![GatewayResponse::approved()], 3);
    // 50.00 + 2% de comisión = 51.00 exactos.
    let user_id = new_user(&h.store, "51.00").await;

    let receipt = h
        .withdraw
        .execute(user_id, dec("50.00"), None)
        .await
        .unwrap();

    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Completed);
    assert_eq!(balance_of(&h.store, user_id).await, dec("0.00"));
    assert_eq!(
        payment_of(&h.store, receipt.payment_id).await.status,
        PaymentStatus::Success
    );
}

#[tokio::test]
async fn withdraw_one_cent_short_is_rejected() {
    let h = harness(vec![], 3);
    let user_id = new_user(&h.store, "50.99").await;

    let result = h.withdraw.execute(user_id, dec("50.00"), None).await;
    assert!(matches!(result, Err(PaymentError::InsufficientFunds(_))));
    assert_eq!(balance_of(&h.store, user_id).await, dec("50.99"));
}

#[tokio::test]
async fn applier_rechecks_balance_under_row_lock() {
    // Dos retiros aceptados contra el mismo balance: el primero en
    // procesarse gana; el segundo cae al re-chequeo del applier.
    let h = harness(
        vec![GatewayResponse::approved(), GatewayResponse::approved()],
        3,
    );
    let user_id = new_user(&h.store, "100.00").await;

    let first = h
        .withdraw
        .execute(user_id, dec("60.00"), None)
        .await
        .unwrap();
    let second = h
        .withdraw
        .execute(user_id, dec("60.00"), None)
        .await
        .unwrap();

    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Completed);
    assert_eq!(balance_of(&h.store, user_id).await, dec("38.80"));

    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Failed);
    assert_eq!(balance_of(&h.store, user_id).await, dec("38.80"));

    assert_eq!(
        payment_of(&h.store, first.payment_id).await.status,
        PaymentStatus::Success
    );
    let failed = payment_of(&h.store, second.payment_id).await;
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("insufficient_funds"));

    let dlq = h.store.list(50, 0).await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].error, "insufficient_funds");
}

#[tokio::test]
async fn apply_success_is_idempotent() {
    let h = harness(vec![GatewayResponse::approved()], 3);
    let user_id = new_user(&h.store, "0.00").await;
    h.deposit.execute(user_id, dec("100.00"), None).await.unwrap();

    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Completed);
    assert_eq!(balance_of(&h.store, user_id).await, dec("98.00"));

    // Re-aplicar el mismo éxito no vuelve a mutar el balance.
    let task_id = payment_service::domain::types::TaskId(1);
    assert_eq!(
        h.store.apply_success(task_id).await.unwrap(),
        ApplyOutcome::AlreadyFinal
    );
    assert_eq!(balance_of(&h.store, user_id).await, dec("98.00"));
}

// ---------------------------------------------------------------------------
// Handlers HTTP llamados directamente, al estilo de un request real.
// ---------------------------------------------------------------------------

fn app_state(store: Arc<InMemoryPaymentStore>, metrics: Arc<MetricsRegistry>) -> Arc<AppState> {
    let fee_rate = dec("0.02");
    Arc::new(AppState {
        create_user_use_case: CreateUserUseCase::new(store.clone()),
        deposit_use_case: DepositBalanceUseCase::new(store.clone(), fee_rate, metrics.clone()),
        withdraw_use_case: WithdrawBalanceUseCase::new(store.clone(), fee_rate, metrics.clone()),
        payment_status_use_case: GetPaymentStatusUseCase::new(store.clone()),
        dlq_repo: store,
        metrics,
    })
}

#[tokio::test]
async fn deposit_endpoint_returns_processing_payment() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let user_id = new_user(&store, "0.00").await;
    let state = app_state(store, metrics.clone());

    let result = payments_deposit(
        State(state),
        HeaderMap::new(),
        Json(DepositRequest {
            user_id: user_id.0,
            deposit: dec("100.00"),
        }),
    )
    .await;

    let Json(body) = result.unwrap_or_else(|_| panic!("deposit request should succeed"));
    assert_eq!(body.payment_id, 1);
    assert_eq!(body.user_id, user_id.0);
    assert_eq!(body.deposit, Some(dec("100.00")));
    assert_eq!(body.withdraw, None);
    assert_eq!(body.status, "processing");
    assert_eq!(
        metrics.snapshot().get(counters::PAYMENTS_DEPOSIT_REQUESTS),
        Some(&1)
    );
}

#[tokio::test]
async fn withdraw_endpoint_maps_insufficient_funds_to_400() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let user_id = new_user(&store, "10.00").await;
    let state = app_state(store, Arc::new(MetricsRegistry::new()));

    let result = payments_withdraw(
        State(state),
        HeaderMap::new(),
        Json(WithdrawRequest {
            user_id: user_id.0,
            amount: dec("60.00"),
        }),
    )
    .await;

    let err = result.err().expect("withdraw should be rejected");
    assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deposit_endpoint_unknown_user_is_404() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let state = app_state(store, Arc::new(MetricsRegistry::new()));

    let result = payments_deposit(
        State(state),
        HeaderMap::new(),
        Json(DepositRequest {
            user_id: 999,
            deposit: dec("5.00"),
        }),
    )
    .await;

    let err = result.err().expect("unknown user should fail");
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn payment_status_endpoint_reports_transaction_state() {
    let h = harness(vec![GatewayResponse::approved()], 3);
    let user_id = new_user(&h.store, "0.00").await;
    let receipt = h.deposit.execute(user_id, dec("10.00"), None).await.unwrap();
    h.processor.run_once().await.unwrap();

    let state = app_state(h.store.clone(), h.metrics.clone());
    let result = payment_status(State(state.clone()), Path(receipt.payment_id.0)).await;

    let Json(body) = result.unwrap_or_else(|_| panic!("payment should exist"));
    assert_eq!(body.status, "success");
    assert_eq!(body.transaction_status.as_deref(), Some("success"));
    assert_eq!(body.commission, dec("0.20"));

    let missing = payment_status(State(state), Path(12345)).await;
    let err = missing.err().expect("missing payment should 404");
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dlq_endpoint_lists_terminal_failures() {
    let h = harness(vec![GatewayResponse::rejected("http_400")], 3);
    let user_id = new_user(&h.store, "0.00").await;
    h.deposit.execute(user_id, dec("30.00"), None).await.unwrap();
    assert_eq!(h.processor.run_once().await.unwrap(), WorkerTick::Failed);

    let state = app_state(h.store.clone(), h.metrics.clone());
    let result = list_dlq(
        State(state),
        Query(DlqQuery {
            limit: None,
            offset: None,
        }),
    )
    .await;

    let Json(entries) = result.unwrap_or_else(|_| panic!("dlq listing should succeed"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].error, "http_400");
    assert_eq!(entries[0].payment_type, "deposit");
}

use axum::Router;
use dotenvy::dotenv;
use payment_service::{
    api::{
        http_routes::{monitoring_routes, routes, AppState},
        mock_gateway,
    },
    config::Settings,
    infrastructure::{
        gateways::http_gateway::HttpPaymentGateway,
        persistence::{
            dlq_repository::PostgresDlqRepository, intake_repository::PostgresIntakeRepository,
            payment_repository::PostgresPaymentRepository,
            task_repository::PostgresPaymentTaskRepository,
            user_repository::PostgresUserRepository,
        },
    },
    jobs::worker::PaymentWorker,
    metrics::MetricsRegistry,
    use_cases::{
        create_user::CreateUserUseCase, deposit_balance::DepositBalanceUseCase,
        get_payment_status::GetPaymentStatusUseCase, process_payment::ProcessPaymentUseCase,
        withdraw_balance::WithdrawBalanceUseCase,
    },
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        payment_service::api::http_routes::create_user,
        payment_service::api::http_routes::payments_deposit,
        payment_service::api::http_routes::payments_withdraw,
        payment_service::api::http_routes::payment_status,
        payment_service::api::http_routes::list_dlq,
        payment_service::api::http_routes::get_metrics,
        payment_service::api::http_routes::health_check,
        payment_service::api::mock_gateway::mock_pay
    ),
    components(schemas(
        payment_service::api::http_routes::CreateUserRequest,
        payment_service::api::http_routes::UserResponse,
        payment_service::api::http_routes::DepositRequest,
        payment_service::api::http_routes::WithdrawRequest,
        payment_service::api::http_routes::PaymentCreateResponse,
        payment_service::api::http_routes::PaymentStatusResponse,
        payment_service::api::http_routes::DlqEntryResponse,
        payment_service::api::http_routes::HealthResponse,
        payment_service::api::mock_gateway::MockChargeRequest
    ))
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Cargar variables de entorno
    dotenv().ok();

    // 2. Configuración
    let settings = Settings::from_env()?;

    // 3. Configurar Logging/Tracing
    let level: tracing::Level = settings.log_level.parse().unwrap_or(tracing::Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting Payment Service...");

    // 4. Configurar Conexión a Base de Datos
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;

    info!("Connected to Database");

    // 5. Instanciar Dependencias (Infraestructura)
    let user_repo = Arc::new(PostgresUserRepository::new(pool.clone()));
    let payment_repo = Arc::new(PostgresPaymentRepository::new(pool.clone()));
    let intake_repo = Arc::new(PostgresIntakeRepository::new(pool.clone()));
    let task_repo = Arc::new(PostgresPaymentTaskRepository::new(pool.clone()));
    let dlq_repo = Arc::new(PostgresDlqRepository::new(pool.clone()));
    let gateway = Arc::new(HttpPaymentGateway::new(
        settings.gateway_url.clone(),
        settings.gateway_timeout,
    )?);
    let metrics = Arc::new(MetricsRegistry::new());

    // 6. Instanciar Casos de Uso
    let create_user_use_case = CreateUserUseCase::new(user_repo.clone());
    let deposit_use_case =
        DepositBalanceUseCase::new(intake_repo.clone(), settings.fee_rate, metrics.clone());
    let withdraw_use_case =
        WithdrawBalanceUseCase::new(intake_repo.clone(), settings.fee_rate, metrics.clone());
    let payment_status_use_case = GetPaymentStatusUseCase::new(payment_repo.clone());
    let processor = Arc::new(ProcessPaymentUseCase::new(
        task_repo.clone(),
        gateway.clone(),
        settings.retry.clone(),
        settings.processing_timeout,
        metrics.clone(),
    ));

    // 7. Iniciar el pool de workers con señal de stop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker_handles = Vec::new();
    for worker_id in 0..settings.worker_concurrency.max(1) {
        let worker = PaymentWorker::new(worker_id, processor.clone(), settings.poll_interval);
        worker_handles.push(tokio::spawn(worker.run(shutdown_rx.clone())));
    }
    info!(
        workers = settings.worker_concurrency.max(1),
        "payment worker pool started"
    );

    // 8. Configurar Estado de la App Axum
    let app_state = Arc::new(AppState {
        create_user_use_case,
        deposit_use_case,
        withdraw_use_case,
        payment_status_use_case,
        dlq_repo,
        metrics,
    });

    // 9. Configurar Rutas y Servidor
    let app = Router::new()
        .nest(
            "/api/v1",
            routes(app_state)
                .merge(monitoring_routes(pool.clone()))
                .merge(mock_gateway::routes(settings.gateway_timeout)),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let addr = format!("{}:{}", settings.host, settings.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // 10. Los workers terminan su iteración en curso antes de salir
    for handle in worker_handles {
        let _ = handle.await;
    }

    Ok(())
}

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::domain::error::PaymentError;
use crate::domain::gateways::PaymentGateway;
use crate::domain::repository::{ApplyOutcome, PaymentTaskRepository, ReservedTask};
use crate::domain::retry::RetryPolicy;
use crate::metrics::{counters, MetricsRegistry};

/// Desenlace de un ciclo del worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerTick {
    /// No había tarea elegible.
    Idle,
    /// Pago finalizado en éxito (o ya estaba finalizado).
    Completed,
    /// Falla transitoria reprogramada con backoff.
    Retried,
    /// Falla terminal: pago fallido y DLQ.
    Failed,
}

/// Caso de uso central del worker: un ciclo reserva-cargo-desenlace.
///
/// Reserva la siguiente tarea vencida, arma el payload, invoca el gateway y
/// despacha el resultado a los appliers del repositorio. Toda transición
/// queda commiteada como estado en la base; acá solo viven la decisión de
/// reintento y los contadores.
pub struct ProcessPaymentUseCase {
    task_repo: Arc<dyn PaymentTaskRepository>,
    gateway: Arc<dyn PaymentGateway>,
    retry_policy: RetryPolicy,
    processing_timeout: chrono::Duration,
    metrics: Arc<MetricsRegistry>,
}

impl ProcessPaymentUseCase {
    pub fn new(
        task_repo: Arc<dyn PaymentTaskRepository>,
        gateway: Arc<dyn PaymentGateway>,
        retry_policy: RetryPolicy,
        processing_timeout: Duration,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let processing_timeout = chrono::Duration::from_std(processing_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        Self {
            task_repo,
            gateway,
            retry_policy,
            processing_timeout,
            metrics,
        }
    }

    pub async fn run_once(&self) -> Result<WorkerTick, PaymentError> {
        let now = Utc::now();
        let stuck_before = now - self.processing_timeout;

        let Some(task) = self.task_repo.reserve_next(now, stuck_before).await? else {
            return Ok(WorkerTick::Idle);
        };
        self.metrics.inc(counters::PAYMENTS_PROCESSING_STARTED);

        let Some(payload) = self.task_repo.load_payload(task.payment_id).await? else {
            return self.fail(&task, "missing_transaction").await;
        };

        let response = self.gateway.charge(&payload).await;

        if response.success {
            self.metrics.inc(counters::GATEWAY_SUCCESS);
            return match self.task_repo.apply_success(task.task_id).await? {
                ApplyOutcome::Applied => {
                    self.metrics.inc(counters::PAYMENTS_SUCCESS);
                    info!(payment_id = %task.payment_id, attempts = task.attempts, "payment success");
                    Ok(WorkerTick::Completed)
                }
                ApplyOutcome::AlreadyFinal => Ok(WorkerTick::Completed),
                ApplyOutcome::MissingTransaction => self.fail(&task, "missing_transaction").await,
                ApplyOutcome::MissingUser => self.fail(&task, "missing_user").await,
                ApplyOutcome::InsufficientFunds => self.fail(&task, "insufficient_funds").await,
            };
        }

        let error = response
            .error_code
            .unwrap_or_else(|| "gateway_error".to_string());

        if response.retryable {
            if error == "timeout" {
                self.metrics.inc(counters::GATEWAY_TIMEOUTS);
            } else {
                self.metrics.inc(counters::GATEWAY_ERRORS);
            }

            if self.retry_policy.attempts_exhausted(task.attempts) {
                return self.fail(&task, &error).await;
            }

            let delay = self.retry_policy.delay_for(task.attempts);
            let next_retry_at = Utc::now() + delay;
            self.task_repo
                .schedule_retry(task.task_id, &error, next_retry_at)
                .await?;
            self.metrics.inc(counters::PAYMENTS_RETRIED);
            warn!(
                payment_id = %task.payment_id,
                attempts = task.attempts,
                error,
                delay_ms = delay.num_milliseconds(),
                "payment retry scheduled"
            );
            return Ok(WorkerTick::Retried);
        }

        self.metrics.inc(counters::GATEWAY_NON_RETRYABLE_ERRORS);
        self.fail(&task, &error).await
    }

    async fn fail(&self, task: &ReservedTask, error: &str) -> Result<WorkerTick, PaymentError> {
        let dlq_written = self.task_repo.mark_failed(task.task_id, error).await?;
        self.metrics.inc(counters::PAYMENTS_FAILED);
        if dlq_written {
            self.metrics.inc(counters::DLQ_WRITTEN);
        }
        error!(
            payment_id = %task.payment_id,
            attempts = task.attempts,
            error,
            "payment failed"
        );
        Ok(WorkerTick::Failed)
    }
}

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::use_cases::process_payment::{ProcessPaymentUseCase, WorkerTick};

/// Worker de pagos: un loop cooperativo de larga vida.
///
/// Cada iteración delega en `ProcessPaymentUseCase::run_once`. Sin trabajo
/// elegible duerme `poll_interval`; ante un error de base de datos loguea y
/// reintenta en el siguiente ciclo (la tarea queda reservable, o la
/// recupera el timeout de stuck). La señal de stop se honra al terminar la
/// iteración en curso.
pub struct PaymentWorker {
    id: usize,
    processor: Arc<ProcessPaymentUseCase>,
    poll_interval: Duration,
}

impl PaymentWorker {
    pub fn new(id: usize, processor: Arc<ProcessPaymentUseCase>, poll_interval: Duration) -> Self {
        Self {
            id,
            processor,
            poll_interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker = self.id, "payment worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.processor.run_once().await {
                Ok(WorkerTick::Idle) => {
                    if Self::sleep_or_stop(self.poll_interval, &mut shutdown).await {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(worker = self.id, error = %e, "worker cycle failed");
                    if Self::sleep_or_stop(self.poll_interval, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(worker = self.id, "payment worker stopped");
    }

    /// Devuelve `true` si llegó la señal de stop durante la espera.
    async fn sleep_or_stop(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(interval) => false,
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        }
    }
}

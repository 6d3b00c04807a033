use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Contadores agregados de todo el proceso.
///
/// Un solo mutex alcanza: los incrementos son de baja frecuencia comparados
/// con el I/O de base de datos y gateway que los rodea.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, delta: u64) {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *counters.entry(name.to_string()).or_insert(0) += delta;
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Nombres de los contadores publicados en `/metrics`.
pub mod counters {
    pub const PAYMENTS_DEPOSIT_REQUESTS: &str = "payments_deposit_requests_total";
    pub const PAYMENTS_WITHDRAW_REQUESTS: &str = "payments_withdraw_requests_total";
    pub const PAYMENTS_TASK_ENQUEUED: &str = "payments_task_enqueued_total";
    pub const IDEMPOTENCY_HITS: &str = "idempotency_hits_total";
    pub const PAYMENTS_PROCESSING_STARTED: &str = "payments_processing_started_total";
    pub const GATEWAY_SUCCESS: &str = "gateway_success_total";
    pub const GATEWAY_ERRORS: &str = "gateway_errors_total";
    pub const GATEWAY_TIMEOUTS: &str = "gateway_timeouts_total";
    pub const GATEWAY_NON_RETRYABLE_ERRORS: &str = "gateway_non_retryable_errors_total";
    pub const PAYMENTS_SUCCESS: &str = "payments_success_total";
    pub const PAYMENTS_RETRIED: &str = "payments_retried_total";
    pub const PAYMENTS_FAILED: &str = "payments_failed_total";
    pub const DLQ_WRITTEN: &str = "dlq_written_total";
}

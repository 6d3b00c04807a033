use rand::Rng;
use std::time::Duration;

/// Política de reintentos del gateway: backoff exponencial con tope y
/// jitter uniforme.
///
/// `delay(n) = min(base * 2^(n-1), max_backoff) + U(0, jitter)`.
///
/// La reprogramación es una escritura en base de datos (`next_retry_at`),
/// no un timer en memoria, así que sobrevive reinicios del proceso.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Retardo antes del siguiente intento, dado el número de intentos ya
    /// consumidos (`attempt >= 1`).
    pub fn delay_for(&self, attempt: i32) -> chrono::Duration {
        let exponent = (attempt - 1).max(0);
        let exponential = self.backoff_base.as_secs_f64() * 2f64.powi(exponent);
        let capped = exponential.min(self.backoff_max.as_secs_f64());

        let jitter_max = self.jitter.as_secs_f64();
        let jitter = if jitter_max > 0.0 {
            rand::thread_rng().gen_range(0.0..jitter_max)
        } else {
            0.0
        };

        chrono::Duration::milliseconds(((capped + jitter) * 1000.0).round() as i64)
    }

    /// El contador de intentos solo crece; al alcanzar `max_attempts` la
    /// falla se vuelve terminal.
    pub fn attempts_exhausted(&self, attempts: i32) -> bool {
        attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn no_jitter(base_s: u64, max_s: u64, max_attempts: i32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_base: Duration::from_secs(base_s),
            backoff_max: Duration::from_secs(max_s),
            jitter: Duration::ZERO,
        }
    }

    #[rstest]
    #[case(1, 1_000)]
    #[case(2, 2_000)]
    #[case(3, 4_000)]
    #[case(5, 16_000)]
    fn backoff_doubles_per_attempt(#[case] attempt: i32, #[case] expected_ms: i64) {
        let policy = no_jitter(1, 30, 3);
        assert_eq!(policy.delay_for(attempt).num_milliseconds(), expected_ms);
    }

    #[test]
    fn backoff_is_capped_at_max() {
        let policy = no_jitter(1, 30, 3);
        // Attempt 10 would be 512s uncapped.
        assert_eq!(policy.delay_for(10).num_milliseconds(), 30_000);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            jitter: Duration::from_millis(500),
        };
        for _ in 0..100 {
            let delay = policy.delay_for(1).num_milliseconds();
            assert!((1_000..1_500).contains(&delay), "delay out of range: {delay}");
        }
    }

    #[test]
    fn single_attempt_policy_exhausts_immediately() {
        let policy = no_jitter(1, 30, 1);
        assert!(policy.attempts_exhausted(1));
    }

    #[test]
    fn attempts_below_max_are_not_exhausted() {
        let policy = no_jitter(1, 30, 3);
        assert!(!policy.attempts_exhausted(2));
        assert!(policy.attempts_exhausted(3));
        assert!(policy.attempts_exhausted(4));
    }
}
